//! Igor Binary Wave (IBW) files, versions 1, 2, 3 and 5.
//!
//! [`read_path`] / [`read_from`] decode a wave into a [`TypedArray`];
//! [`write_path`] / [`write_to`] encode one as a version 5 file.

pub mod array;
pub mod checksum;
pub mod endian;
pub mod error;
pub mod format;
pub mod header;
pub mod note;
pub mod reader;
pub mod writer;

pub use array::{AxisScale, Complex, Element, SourceInfo, TypedArray};
pub use endian::ByteOrder;
pub use error::{ErrorKind, IgorError, Result};
pub use format::{ElementType, FormatVersion, MAX_DIMS};
pub use header::{read_headers, WaveHeaders};
pub use note::{NoteMap, NoteMode, NoteScalar, NoteValue};
pub use reader::{read_from, read_path, ReadOptions};
pub use writer::{write_path, write_to, WriteOptions};
