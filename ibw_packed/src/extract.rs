use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ibw_core::error::{IgorError, Result};
use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

use crate::scanner::{scan, PackedTree, ScanOptions};
use crate::tree::{join_path, ArchiveNode, Folder, NodeError, WaveRef};

/// Bytes copied per read while carving a wave.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// File extension of carved waves.
pub const WAVE_EXTENSION: &str = "ibw";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedWave {
    /// In-archive path, `folder:sub:wave`.
    pub igor_path: String,
    pub file: PathBuf,
    pub size: u64,
    /// xxh3-64 of the carved bytes.
    pub xxh3: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedWave {
    pub igor_path: String,
    pub reason: NodeError,
}

/// Manifest of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub written: Vec<ExtractedWave>,
    pub skipped: Vec<SkippedWave>,
    /// Directories created for archive folders.
    pub folders: usize,
}

/// Carve every wave of `tree` out of `src` into `dest`, mirroring the folder
/// structure as directories.
///
/// Waves are copied byte for byte; nothing is re-validated. Waves that failed
/// to scan, run past the end of the archive or fail to copy are listed in
/// [`Extraction::skipped`] and do not stop their siblings.
pub fn extract<R: Read + Seek>(src: &mut R, tree: &PackedTree, dest: &Path) -> Result<Extraction> {
    fs::create_dir_all(dest).map_err(|e| IgorError::from(e).at_path(dest))?;
    let mut out = Extraction::default();
    extract_folder(src, &tree.root, dest, "", &mut out)?;
    tracing::info!(
        written = out.written.len(),
        skipped = out.skipped.len(),
        folders = out.folders,
        dest = %dest.display(),
        "extraction finished"
    );
    Ok(out)
}

/// Scan the archive at `archive` and extract it into `dest`.
pub fn extract_path(
    archive: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    opts: &ScanOptions,
) -> Result<Extraction> {
    let archive = archive.as_ref();
    let file = File::open(archive).map_err(|e| IgorError::from(e).at_path(archive))?;
    let mut src = BufReader::new(file);
    let tree = scan(&mut src, opts).map_err(|e| e.at_path(archive))?;
    extract(&mut src, &tree, dest.as_ref())
}

fn extract_folder<R: Read + Seek>(
    src: &mut R,
    folder: &Folder,
    dir: &Path,
    prefix: &str,
    out: &mut Extraction,
) -> Result<()> {
    // sanitised names already taken in `dir`, folders and waves apart
    let mut dirs = HashSet::new();
    let mut files = HashSet::new();
    for child in &folder.children {
        let igor_path = join_path(prefix, child.name());
        match child {
            ArchiveNode::Folder(sub) => {
                let sub_dir = dir.join(unique_component(&sub.name, &mut dirs));
                fs::create_dir_all(&sub_dir).map_err(|e| IgorError::from(e).at_path(&sub_dir))?;
                out.folders += 1;
                extract_folder(src, sub, &sub_dir, &igor_path, out)?;
            }
            ArchiveNode::Wave(wave) => {
                let stem = unique_component(&wave.name, &mut files);
                let file = dir.join(format!("{stem}.{WAVE_EXTENSION}"));
                match carve(src, wave, &file) {
                    Ok(extracted) => {
                        tracing::debug!(wave = %igor_path, file = %file.display(), "extracted");
                        out.written.push(ExtractedWave {
                            igor_path,
                            ..extracted
                        });
                    }
                    Err(e) => {
                        tracing::warn!(wave = %igor_path, error = %e, "skipping wave");
                        out.skipped.push(SkippedWave {
                            igor_path,
                            reason: NodeError::from(&e),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn carve<R: Read + Seek>(src: &mut R, wave: &WaveRef, file: &Path) -> Result<ExtractedWave> {
    if let Some(err) = &wave.error {
        return Err(IgorError::format(format!("wave header did not decode: {}", err.message)));
    }
    if wave.truncated {
        return Err(IgorError::ShortRead {
            what: "wave record",
            expected: wave.size as usize,
            got: 0,
        });
    }
    extract_wave(src, wave, file)
}

/// Copy one wave record from `src` to `file`.
pub fn extract_wave<R: Read + Seek>(
    src: &mut R,
    wave: &WaveRef,
    file: &Path,
) -> Result<ExtractedWave> {
    let mut run = || -> Result<ExtractedWave> {
        src.seek(SeekFrom::Start(wave.offset))?;
        let mut dst = BufWriter::new(File::create(file)?);
        let mut hasher = Xxh3::new();
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut remaining = wave.size;
        while remaining > 0 {
            let want = remaining.min(COPY_CHUNK_SIZE as u64) as usize;
            let n = src.read(&mut buf[..want])?;
            if n == 0 {
                return Err(IgorError::ShortRead {
                    what: "wave record",
                    expected: wave.size as usize,
                    got: (wave.size - remaining) as usize,
                });
            }
            hasher.update(&buf[..n]);
            dst.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        dst.flush()?;
        Ok(ExtractedWave {
            igor_path: wave.name.clone(),
            file: file.to_path_buf(),
            size: wave.size,
            xxh3: hasher.digest(),
        })
    };
    run().map_err(|e| e.at_path(file))
}

/// Turn an archive-provided name into a single, harmless path component.
pub fn safe_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if matches!(cleaned.trim(), "" | "." | "..") {
        "_".to_string()
    } else {
        cleaned
    }
}

/// [`safe_component`] of `name`, suffixed `_1`, `_2`, ... when a sibling
/// already sanitised to the same component.
fn unique_component(name: &str, taken: &mut HashSet<String>) -> String {
    let base = safe_component(name);
    let mut candidate = base.clone();
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    if candidate != base {
        tracing::warn!(name, file = %candidate, "sanitised name collides with a sibling");
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_names_get_a_suffix() {
        let mut taken = HashSet::new();
        assert_eq!(unique_component("a/b", &mut taken), "a_b");
        assert_eq!(unique_component("a_b", &mut taken), "a_b_1");
        assert_eq!(unique_component("a:b", &mut taken), "a_b_2");
        assert_eq!(unique_component("c", &mut taken), "c");
    }

    #[test]
    fn names_become_single_components() {
        assert_eq!(safe_component("wave0"), "wave0");
        assert_eq!(safe_component("../etc/passwd"), ".._etc_passwd");
        assert_eq!(safe_component(".."), "_");
        assert_eq!(safe_component(""), "_");
        assert_eq!(safe_component("a:b\\c"), "a_b_c");
        assert_eq!(safe_component("tab\there"), "tab_here");
    }
}
