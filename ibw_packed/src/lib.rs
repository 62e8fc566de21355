//! Igor packed experiments (`.pxp`, `.pxt`): a record stream that nests
//! data folders and embeds binary waves.
//!
//! [`scan`] builds the folder/wave tree without reading wave data,
//! [`extract`] carves the waves into `.ibw` files and [`load`] reads a single
//! wave named by a composite `file.pxp:folder:wave` path.

pub mod extract;
pub mod locate;
pub mod record;
pub mod scanner;
pub mod tree;

pub use extract::{extract, extract_path, extract_wave, ExtractedWave, Extraction, SkippedWave};
pub use locate::{find_wave, load, read_wave, WaveLocation};
pub use record::{RecordHeader, RecordKind, RECORD_HEADER_SIZE};
pub use scanner::{scan, scan_path, PackedTree, ScanOptions};
pub use tree::{ArchiveNode, Folder, NodeError, WaveRef};
