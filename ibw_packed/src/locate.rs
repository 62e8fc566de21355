use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{is_separator, Path, PathBuf};

use ibw_core::error::{IgorError, Result};
use ibw_core::{read_from, read_path, ReadOptions, TypedArray};

use crate::scanner::{scan, PackedTree, ScanOptions};
use crate::tree::{igor_path, WaveRef, PATH_SEPARATOR};

/// A wave named by a filesystem path, optionally followed by an in-archive
/// path: `experiment.pxp:folder:wave`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveLocation {
    pub file: PathBuf,
    /// Folder names followed by the wave name; empty for a plain wave file.
    pub igor_path: Vec<String>,
}

impl WaveLocation {
    /// Split `composite` into file and in-archive path.
    ///
    /// A `composite` naming an existing file is taken as is. Otherwise only its
    /// last path component is split on `:`, so directories (and drive letters)
    /// keep their colons. Empty segments are dropped.
    pub fn parse(composite: &str) -> Self {
        if Path::new(composite).exists() {
            return Self {
                file: PathBuf::from(composite),
                igor_path: Vec::new(),
            };
        }
        let base_start = composite.rfind(is_separator).map(|i| i + 1).unwrap_or(0);
        let (dir, base) = composite.split_at(base_start);
        let mut parts = base.split(PATH_SEPARATOR);
        let file_name = parts.next().unwrap_or_default();
        let igor_path = parts.filter(|p| !p.is_empty()).map(str::to_string).collect();
        Self {
            file: PathBuf::from(format!("{dir}{file_name}")),
            igor_path,
        }
    }

    pub fn is_in_archive(&self) -> bool {
        !self.igor_path.is_empty()
    }
}

/// The wave at `path` inside `tree`.
pub fn find_wave<'t, S: AsRef<str>>(tree: &'t PackedTree, path: &[S]) -> Result<&'t WaveRef> {
    let node = tree
        .find(path)
        .ok_or_else(|| IgorError::NotFound(format!("no node '{}' in archive", igor_path(path))))?;
    node.as_wave().ok_or_else(|| {
        IgorError::NotFound(format!("'{}' is a folder, not a wave", igor_path(path)))
    })
}

/// Decode the wave stored at `wave` inside an archive stream.
pub fn read_wave<R: Read + Seek>(
    src: &mut R,
    wave: &WaveRef,
    opts: &ReadOptions,
) -> Result<TypedArray> {
    src.seek(SeekFrom::Start(wave.offset))?;
    let mut record = src.by_ref().take(wave.size);
    read_from(&mut record, opts)
}

/// Read the wave named by `composite` (see [`WaveLocation::parse`]).
pub fn load(composite: &str, opts: &ReadOptions) -> Result<TypedArray> {
    let location = WaveLocation::parse(composite);
    if !location.is_in_archive() {
        return read_path(&location.file, opts);
    }
    let file = &location.file;
    let run = || -> Result<TypedArray> {
        let mut src = BufReader::new(File::open(file)?);
        let tree = scan(&mut src, &ScanOptions::default())?;
        let wave = find_wave(&tree, location.igor_path.as_slice())?;
        tracing::debug!(
            archive = %file.display(),
            wave = %igor_path(&location.igor_path),
            offset = wave.offset,
            "loading wave from archive"
        );
        let mut array = read_wave(&mut src, wave, opts)?;
        if let Some(source) = array.source.as_mut() {
            source.path = Some(file.clone());
        }
        Ok(array)
    };
    run().map_err(|e| e.at_path(file))
}
