use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use ibw_core::endian::read_fully;
use ibw_core::error::{IgorError, Result};
use ibw_core::{read_headers, ByteOrder};
use serde::Serialize;

use crate::record::{detect_record_order, RecordHeader, RecordKind, RECORD_HEADER_SIZE};
use crate::tree::{ArchiveNode, Folder, NodeError, WaveRef};

/// Default limit on folder nesting.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Longest folder name read from a folder record.
const MAX_FOLDER_NAME: u64 = 256;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Record byte order; detected from the first record when `None`.
    pub byte_order: Option<ByteOrder>,
    /// Deeper folder nesting is a format error.
    pub max_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            byte_order: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Result of scanning a packed experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackedTree {
    pub byte_order: ByteOrder,
    /// Size of the scanned stream in bytes.
    pub len: u64,
    pub root: Folder,
}

impl PackedTree {
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&ArchiveNode> {
        self.root.find(path)
    }

    pub fn waves(&self) -> Vec<(String, &WaveRef)> {
        self.root.waves()
    }
}

/// Scan the record stream of a packed experiment into a folder tree.
///
/// Only wave headers are decoded; wave data is located, never read. A wave
/// whose header fails to decode becomes a node carrying a [`NodeError`] and
/// scanning continues with the next record. Errors in the record stream itself
/// (a negative record size, nesting beyond `max_depth`, I/O failures) end the
/// scan.
///
/// Offsets in the tree are absolute stream positions.
pub fn scan<R: Read + Seek>(r: &mut R, opts: &ScanOptions) -> Result<PackedTree> {
    let start = r.stream_position()?;
    let len = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(start))?;

    let mut scanner = Scanner {
        r,
        opts,
        order: opts.byte_order,
        len,
        records: 0,
        waves: 0,
    };
    let mut root = Folder::new("");
    scanner.scan_folder(&mut root, 0)?;

    let byte_order = scanner.order.unwrap_or_else(ByteOrder::native);
    tracing::debug!(
        records = scanner.records,
        waves = root.wave_count(),
        folders = root.folder_count(),
        byte_order = byte_order.name(),
        "scanned packed file"
    );
    Ok(PackedTree {
        byte_order,
        len,
        root,
    })
}

/// Scan the packed experiment at `path`.
pub fn scan_path(path: impl AsRef<Path>, opts: &ScanOptions) -> Result<PackedTree> {
    let path = path.as_ref();
    let run = || -> Result<PackedTree> {
        let mut file = BufReader::new(File::open(path)?);
        scan(&mut file, opts)
    };
    run().map_err(|e| e.at_path(path))
}

struct Scanner<'a, R> {
    r: &'a mut R,
    opts: &'a ScanOptions,
    order: Option<ByteOrder>,
    len: u64,
    records: usize,
    waves: usize,
}

impl<R: Read + Seek> Scanner<'_, R> {
    /// Next record header, or `None` at the end of the stream.
    fn next_header(&mut self) -> Result<Option<RecordHeader>> {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        match read_fully(self.r, &mut buf, "record header") {
            Ok(()) => {}
            Err(err @ IgorError::ShortRead { .. }) if self.records == 0 => return Err(err),
            Err(IgorError::ShortRead { got, .. }) => {
                if got > 0 {
                    tracing::warn!(bytes = got, "ignoring truncated record header at end of file");
                }
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
        let order = *self.order.get_or_insert_with(|| detect_record_order(&buf));
        self.records += 1;
        Ok(Some(RecordHeader::decode(&buf, order)))
    }

    fn scan_folder(&mut self, folder: &mut Folder, depth: usize) -> Result<()> {
        loop {
            let Some(header) = self.next_header()? else {
                if depth > 0 {
                    tracing::warn!(folder = %folder.name, "folder has no end marker");
                }
                return Ok(());
            };
            let size = header.data_len()?;
            let start = self.r.stream_position()?;
            let end = start + size;
            let kind = header.kind();
            tracing::debug!(?kind, offset = start, size, depth, "record");

            match kind {
                RecordKind::DataFolderStart => {
                    let name = self.folder_name(size)?;
                    self.r.seek(SeekFrom::Start(end))?;
                    if depth + 1 > self.opts.max_depth {
                        return Err(IgorError::format(format!(
                            "folders nested deeper than {} levels",
                            self.opts.max_depth
                        )));
                    }
                    tracing::debug!(folder = %name, depth = depth + 1, "entering folder");
                    let mut child = Folder::new(name);
                    self.scan_folder(&mut child, depth + 1)?;
                    folder.insert(ArchiveNode::Folder(child));
                }
                RecordKind::DataFolderEnd => {
                    self.r.seek(SeekFrom::Start(end))?;
                    return Ok(());
                }
                RecordKind::Wave => {
                    let wave = self.wave(start, size);
                    folder.insert(ArchiveNode::Wave(wave));
                    self.r.seek(SeekFrom::Start(end))?;
                }
                _ => {
                    self.r.seek(SeekFrom::Start(end))?;
                }
            }
        }
    }

    fn folder_name(&mut self, size: u64) -> Result<String> {
        let mut raw = Vec::new();
        self.r.by_ref().take(size.min(MAX_FOLDER_NAME)).read_to_end(&mut raw)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Locate the wave record at `start`, decoding only its headers.
    fn wave(&mut self, start: u64, size: u64) -> WaveRef {
        let index = self.waves;
        self.waves += 1;

        let mut wave = WaveRef {
            name: String::new(),
            offset: start,
            size,
            version: None,
            points: None,
            truncated: start + size > self.len,
            error: None,
        };

        // bounded, so an undersized record cannot pull in the next one
        let mut record = self.r.by_ref().take(size);
        match read_headers(&mut record) {
            Ok(headers) => {
                wave.name = headers.name();
                wave.version = Some(headers.version());
                wave.points = usize::try_from(headers.wave.npnts()).ok();
            }
            Err(e) => {
                tracing::warn!(offset = start, size, error = %e, "undecodable wave record");
                wave.error = Some(NodeError::from(&e));
            }
        }
        if wave.name.is_empty() {
            wave.name = format!("wave{index}");
        }
        if wave.truncated {
            tracing::warn!(
                wave = %wave.name,
                offset = start,
                size,
                len = self.len,
                "wave record runs past end of file"
            );
        }
        tracing::debug!(wave = %wave.name, offset = start, size, "wave");
        wave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(kind: RecordKind, data: &[u8], order: ByteOrder) -> Vec<u8> {
        let mut out = RecordHeader::new(kind, data.len() as i32).encode(order).to_vec();
        out.extend_from_slice(data);
        out
    }

    fn folder_start(name: &str, order: ByteOrder) -> Vec<u8> {
        let mut data = [0u8; 32];
        data[..name.len()].copy_from_slice(name.as_bytes());
        record(RecordKind::DataFolderStart, &data, order)
    }

    #[test]
    fn empty_stream_is_a_short_read() {
        let err = scan(&mut Cursor::new(Vec::new()), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, IgorError::ShortRead { got: 0, .. }));
        let err = scan(&mut Cursor::new(vec![1u8, 0, 0]), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, IgorError::ShortRead { got: 3, .. }));
    }

    #[test]
    fn partial_trailing_header_ends_the_scan() {
        let order = ByteOrder::Little;
        let mut bytes = folder_start("only", order);
        bytes.extend(record(RecordKind::DataFolderEnd, &[], order));
        bytes.extend([7u8; 5]);

        let tree = scan(&mut Cursor::new(bytes), &ScanOptions::default()).unwrap();
        assert_eq!(tree.root.folder_count(), 1);
        assert!(tree.find(&["only"]).is_some());
    }

    #[test]
    fn folders_nest_and_skip_other_records() {
        let order = ByteOrder::Big;
        let mut bytes = record(RecordKind::History, b"print 1", order);
        bytes.extend(folder_start("outer", order));
        bytes.extend(record(RecordKind::Reserved(40), &[9; 17], order));
        bytes.extend(folder_start("inner", order));
        bytes.extend(record(RecordKind::DataFolderEnd, &[], order));
        bytes.extend(record(RecordKind::DataFolderEnd, &[], order));
        bytes.extend(record(RecordKind::Procedure, b"Macro x()", order));

        let tree = scan(&mut Cursor::new(bytes), &ScanOptions::default()).unwrap();
        assert_eq!(tree.byte_order, ByteOrder::Big);
        assert_eq!(tree.root.folder_count(), 2);
        assert!(tree.find(&["outer", "inner"]).unwrap().as_folder().unwrap().is_empty());
    }

    #[test]
    fn top_level_folder_end_stops_the_scan() {
        let order = ByteOrder::Little;
        let mut bytes = record(RecordKind::DataFolderEnd, &[], order);
        bytes.extend(folder_start("after", order));
        let tree = scan(&mut Cursor::new(bytes), &ScanOptions::default()).unwrap();
        assert!(tree.root.is_empty());
    }

    #[test]
    fn undecodable_wave_is_isolated() {
        let order = ByteOrder::Little;
        let mut bytes = record(RecordKind::Wave, b"definitely not a wave header", order);
        bytes.extend(folder_start("next", order));
        let tree = scan(&mut Cursor::new(bytes), &ScanOptions::default()).unwrap();
        let wave = tree.root.get("wave0").unwrap().as_wave().unwrap();
        assert_eq!(wave.offset, 8);
        assert!(wave.error.is_some());
        assert!(tree.root.get("next").is_some());
    }

    #[test]
    fn depth_limit_is_enforced() {
        let order = ByteOrder::Little;
        let mut bytes = Vec::new();
        for i in 0..4 {
            bytes.extend(folder_start(&format!("f{i}"), order));
        }
        let opts = ScanOptions {
            max_depth: 3,
            ..ScanOptions::default()
        };
        let err = scan(&mut Cursor::new(bytes.clone()), &opts).unwrap_err();
        assert_eq!(err.kind(), ibw_core::ErrorKind::Format);
        // without end markers the folders still close at end of file
        let tree = scan(&mut Cursor::new(bytes), &ScanOptions::default()).unwrap();
        assert!(tree.find(&["f0", "f1", "f2", "f3"]).is_some());
    }

    #[test]
    fn negative_record_size_ends_the_scan() {
        let mut bytes = RecordHeader::new(RecordKind::History, -4)
            .encode(ByteOrder::Little)
            .to_vec();
        bytes.extend_from_slice(&[0; 8]);
        let err = scan(&mut Cursor::new(bytes), &ScanOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ibw_core::ErrorKind::Format);
    }
}
