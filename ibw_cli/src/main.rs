use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ibw_core::format::IGOR_EPOCH_OFFSET;
use ibw_core::note::generate;
use ibw_core::{NoteMode, ReadOptions, TypedArray};
use ibw_packed::{
    extract_path, extract_wave, find_wave, load, scan_path, ArchiveNode, Folder, ScanOptions,
    WaveLocation,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "igor",
    about = "Inspect, dump and unpack Igor binary waves (.ibw) and packed experiments (.pxp)",
    version
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header and array summary of a wave
    ///
    /// PATH may name a wave inside a packed experiment: `exp.pxp:folder:wave`.
    Info {
        path: String,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write wave values as tab-separated text, one row per index of dim 0
    Dump {
        path: String,
        /// Destination file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the parsed wave note
    Notes {
        path: String,
        /// Also close note blocks on blank lines
        #[arg(long)]
        strict: bool,
        /// Print the note map as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the folders and waves of a packed experiment
    List {
        archive: PathBuf,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract every wave of a packed experiment into .ibw files
    Unpack {
        archive: PathBuf,
        /// Destination directory (default: archive name without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy one wave out of a packed experiment
    Extract {
        /// `exp.pxp:folder:wave`
        wave: String,
        /// Destination .ibw file
        #[arg(short, long)]
        output: PathBuf,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Igor timestamp as Unix seconds; zero means unset.
fn unix_time(igor: u32) -> Option<i64> {
    (igor != 0).then(|| igor as i64 - IGOR_EPOCH_OFFSET)
}

fn load_wave(path: &str, opts: &ReadOptions) -> anyhow::Result<TypedArray> {
    let wave = load(path, opts).with_context(|| format!("reading wave {:?}", path))?;
    tracing::debug!(
        path,
        name = %wave.name,
        element_type = wave.element_type.name(),
        shape = ?wave.shape,
        "loaded wave"
    );
    Ok(wave)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
struct WaveSummary<'a> {
    name: &'a str,
    version: Option<i16>,
    byte_order: Option<&'static str>,
    element_type: &'static str,
    shape: &'a [usize],
    units: &'a str,
    axes: &'a [ibw_core::AxisScale],
    formula: Option<&'a str>,
    created_unix: Option<i64>,
    modified_unix: Option<i64>,
    full_scale: Option<(f64, f64)>,
    note_blocks: usize,
    note_strays: usize,
}

impl<'a> WaveSummary<'a> {
    fn new(a: &'a TypedArray) -> Self {
        let src = a.source.as_ref();
        Self {
            name: &a.name,
            version: src.map(|s| s.version.number()),
            byte_order: src.map(|s| s.byte_order.name()),
            element_type: a.element_type.name(),
            shape: &a.shape,
            units: &a.units,
            axes: &a.axes,
            formula: src.map(|s| s.formula.as_str()).filter(|f| !f.is_empty()),
            created_unix: src.and_then(|s| unix_time(s.creation_date)),
            modified_unix: src.and_then(|s| unix_time(s.mod_date)),
            full_scale: src.and_then(|s| s.full_scale),
            note_blocks: a.info.blocks.len(),
            note_strays: a.info.strays.len(),
        }
    }
}

/// One row per index of dim 0; the remaining dims are flattened into columns.
fn write_table<W: Write>(a: &TypedArray, out: &mut W) -> io::Result<()> {
    let rows = a.shape.first().copied().unwrap_or(0);
    if rows == 0 {
        return Ok(());
    }
    let cols = a.len() / rows;
    let values = a.components_f64();
    let complex = a.element_type.is_complex();
    for row in 0..rows {
        let mut line = String::new();
        for col in 0..cols {
            if col > 0 {
                line.push('\t');
            }
            let flat = row + rows * col;
            if complex {
                line.push_str(&format!("{}{:+}i", values[2 * flat], values[2 * flat + 1]));
            } else {
                line.push_str(&values[flat].to_string());
            }
        }
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn print_folder(folder: &Folder, indent: usize) {
    for child in &folder.children {
        let pad = "  ".repeat(indent);
        match child {
            ArchiveNode::Folder(f) => {
                println!("{}{}/", pad, f.name);
                print_folder(f, indent + 1);
            }
            ArchiveNode::Wave(w) => {
                let version = w
                    .version
                    .map(|v| format!("v{}", v.number()))
                    .unwrap_or_else(|| "?".into());
                let points = w.points.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
                let mut line = format!(
                    "{}{:<24} {:>4} {:>10} pts  @{:<10} {}",
                    pad,
                    w.name,
                    version,
                    points,
                    w.offset,
                    human_bytes(w.size)
                );
                if w.truncated {
                    line.push_str("  [truncated]");
                }
                if let Some(err) = &w.error {
                    line.push_str(&format!("  [{:?}: {}]", err.kind, err.message));
                }
                println!("{}", line);
            }
        }
    }
}

fn default_unpack_dir(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "unpacked".into());
    archive.with_file_name(stem)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_info(path: &str, json: bool) -> anyhow::Result<()> {
    let wave = load_wave(path, &ReadOptions::default())?;
    let summary = WaveSummary::new(&wave);
    if json {
        return print_json(&summary);
    }

    println!("=== Wave: {} ===", path);
    println!();
    println!("  name           : {}", summary.name);
    if let (Some(version), Some(order)) = (summary.version, summary.byte_order) {
        println!("  format version : {}", version);
        println!("  byte order     : {}", order);
    }
    println!("  element type   : {}", summary.element_type);
    println!("  shape          : {:?}", summary.shape);
    println!("  points         : {}", wave.len());
    if !summary.units.is_empty() {
        println!("  units          : {}", summary.units);
    }
    for (dim, axis) in wave.axes.iter().enumerate() {
        println!(
            "  axis {}         : delta={} offset={} units={:?}",
            dim, axis.delta, axis.offset, axis.units
        );
    }
    if let Some((top, bottom)) = summary.full_scale {
        println!("  full scale     : {} .. {}", bottom, top);
    }
    if let Some(t) = summary.created_unix {
        println!("  created (unix) : {}", t);
    }
    if let Some(t) = summary.modified_unix {
        println!("  modified (unix): {}", t);
    }
    if let Some(formula) = summary.formula {
        println!("  formula        : {}", formula);
    }
    println!(
        "  note           : {} block(s), {} stray line(s)",
        summary.note_blocks, summary.note_strays
    );
    Ok(())
}

fn run_dump(path: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let wave = load_wave(path, &ReadOptions::with_note_mode(NoteMode::Skip))?;
    match output {
        Some(file) => {
            let f = File::create(&file)
                .with_context(|| format!("creating output file {:?}", file))?;
            let mut dst = BufWriter::new(f);
            write_table(&wave, &mut dst)?;
            dst.flush()?;
            tracing::info!(file = %file.display(), values = wave.len(), "table written");
            eprintln!("  wrote {} values to {:?}", wave.len(), file);
        }
        None => {
            let stdout = io::stdout();
            let mut dst = BufWriter::new(stdout.lock());
            write_table(&wave, &mut dst)?;
            dst.flush()?;
        }
    }
    Ok(())
}

fn run_notes(path: &str, strict: bool, json: bool) -> anyhow::Result<()> {
    let mode = if strict { NoteMode::Strict } else { NoteMode::Simple };
    let wave = load_wave(path, &ReadOptions::with_note_mode(mode))?;
    if json {
        return print_json(&wave.info);
    }
    print!("{}", generate(&wave.info));
    Ok(())
}

fn run_list(archive: PathBuf, json: bool) -> anyhow::Result<()> {
    let tree = scan_path(&archive, &ScanOptions::default())
        .with_context(|| format!("scanning archive {:?}", archive))?;
    tracing::info!(
        archive = %archive.display(),
        folders = tree.root.folder_count(),
        waves = tree.root.wave_count(),
        "scanned"
    );
    if json {
        return print_json(&tree);
    }

    println!("=== Packed experiment: {:?} ===", archive);
    println!();
    println!("  byte order : {}", tree.byte_order.name());
    println!("  size       : {}", human_bytes(tree.len));
    println!("  folders    : {}", tree.root.folder_count());
    println!("  waves      : {}", tree.root.wave_count());
    println!();
    print_folder(&tree.root, 1);
    Ok(())
}

fn run_unpack(archive: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let dest = output.unwrap_or_else(|| default_unpack_dir(&archive));
    tracing::info!(archive = %archive.display(), dest = %dest.display(), "unpacking");
    let manifest = extract_path(&archive, &dest, &ScanOptions::default())
        .with_context(|| format!("unpacking {:?} into {:?}", archive, dest))?;

    for w in &manifest.written {
        println!(
            "{:016x}  {:>10}  {}  -> {}",
            w.xxh3,
            human_bytes(w.size),
            w.igor_path,
            w.file.display()
        );
    }
    for s in &manifest.skipped {
        tracing::warn!(wave = %s.igor_path, kind = ?s.reason.kind, "skipped");
        println!("skipped  {}: {}", s.igor_path, s.reason.message);
    }
    eprintln!();
    eprintln!("  written     : {}", manifest.written.len());
    eprintln!("  skipped     : {}", manifest.skipped.len());
    eprintln!("  folders     : {}", manifest.folders);
    eprintln!("  destination : {}", dest.display());
    Ok(())
}

fn run_extract(wave: &str, output: PathBuf) -> anyhow::Result<()> {
    let location = WaveLocation::parse(wave);
    if !location.is_in_archive() {
        anyhow::bail!(
            "{:?} does not name a wave inside an archive (expected file.pxp:folder:wave)",
            wave
        );
    }
    let tree = scan_path(&location.file, &ScanOptions::default())
        .with_context(|| format!("scanning archive {:?}", location.file))?;
    let node = find_wave(&tree, location.igor_path.as_slice())?;
    tracing::debug!(wave = %node.name, offset = node.offset, size = node.size, "located");
    if let Some(err) = &node.error {
        anyhow::bail!("wave {:?} did not decode: {}", node.name, err.message);
    }
    let file = File::open(&location.file)
        .with_context(|| format!("opening archive {:?}", location.file))?;
    let mut src = BufReader::new(file);
    let extracted = extract_wave(&mut src, node, &output)?;
    tracing::info!(wave = %node.name, file = %output.display(), "extracted");
    eprintln!(
        "  wrote {} ({}) to {:?}, xxh3 {:016x}",
        node.name,
        human_bytes(extracted.size),
        output,
        extracted.xxh3
    );
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Info { path, json } => run_info(&path, json),
        Commands::Dump { path, output } => run_dump(&path, output),
        Commands::Notes { path, strict, json } => run_notes(&path, strict, json),
        Commands::List { archive, json } => run_list(archive, json),
        Commands::Unpack { archive, output } => run_unpack(archive, output),
        Commands::Extract { wave, output } => run_extract(&wave, output),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_unix_time_treats_zero_as_unset() {
        assert_eq!(unix_time(0), None);
        assert_eq!(unix_time(IGOR_EPOCH_OFFSET as u32), Some(0));
    }

    #[test]
    fn test_default_unpack_dir_sits_next_to_the_archive() {
        assert_eq!(
            default_unpack_dir(Path::new("/data/run7.pxp")),
            PathBuf::from("/data/run7")
        );
    }

    #[test]
    fn test_write_table_puts_dim0_in_rows() {
        let a = TypedArray::from_vec(vec![2, 3], vec![1i32, 2, 3, 4, 5, 6]).unwrap();
        let mut out = Vec::new();
        write_table(&a, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\t3\t5\n2\t4\t6\n");
    }
}
