//! Packed-file record headers.
//!
//! A packed experiment is a flat sequence of records, each introduced by
//! ```text
//! recordType: u16   record kind, top bit = superseded flag
//! version:    i16   kind-dependent
//! dataSize:   i32   bytes of record data that follow
//! ```

use ibw_core::error::{IgorError, Result};
use ibw_core::ByteOrder;
use serde::Serialize;

/// Size of one record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Set on records that a later record replaces. Ignored when scanning.
pub const SUPERSEDED_FLAG: u16 = 0x8000;

/// Mask selecting the record kind from `recordType`.
pub const RECORD_TYPE_MASK: u16 = 0x7FFF;

/// Kinds at or above this id are private to Igor and must be skipped.
pub const FIRST_RESERVED_KIND: u16 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    Unused,
    /// System numeric variables.
    Variables,
    /// History text.
    History,
    Wave,
    /// Recreation procedures.
    Recreation,
    /// Main procedure window text.
    Procedure,
    Unused2,
    GetHistory,
    /// A procedure file or notebook in packed form.
    PackedFile,
    DataFolderStart,
    DataFolderEnd,
    /// Anything Igor does not document; skipped.
    Reserved(u16),
}

impl RecordKind {
    pub fn from_id(id: u16) -> Self {
        match id & RECORD_TYPE_MASK {
            0 => RecordKind::Unused,
            1 => RecordKind::Variables,
            2 => RecordKind::History,
            3 => RecordKind::Wave,
            4 => RecordKind::Recreation,
            5 => RecordKind::Procedure,
            6 => RecordKind::Unused2,
            7 => RecordKind::GetHistory,
            8 => RecordKind::PackedFile,
            9 => RecordKind::DataFolderStart,
            10 => RecordKind::DataFolderEnd,
            other => RecordKind::Reserved(other),
        }
    }

    pub fn id(self) -> u16 {
        match self {
            RecordKind::Unused => 0,
            RecordKind::Variables => 1,
            RecordKind::History => 2,
            RecordKind::Wave => 3,
            RecordKind::Recreation => 4,
            RecordKind::Procedure => 5,
            RecordKind::Unused2 => 6,
            RecordKind::GetHistory => 7,
            RecordKind::PackedFile => 8,
            RecordKind::DataFolderStart => 9,
            RecordKind::DataFolderEnd => 10,
            RecordKind::Reserved(id) => id & RECORD_TYPE_MASK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Raw record type including the superseded flag.
    pub record_type: u16,
    pub version: i16,
    pub data_size: i32,
}

impl RecordHeader {
    pub fn new(kind: RecordKind, data_size: i32) -> Self {
        Self {
            record_type: kind.id(),
            version: 0,
            data_size,
        }
    }

    pub fn kind(&self) -> RecordKind {
        RecordKind::from_id(self.record_type)
    }

    pub fn is_superseded(&self) -> bool {
        self.record_type & SUPERSEDED_FLAG != 0
    }

    /// Length of the record data; negative sizes are a format error.
    pub fn data_len(&self) -> Result<u64> {
        u64::try_from(self.data_size)
            .map_err(|_| IgorError::format(format!("record with negative size {}", self.data_size)))
    }

    pub fn decode(buf: &[u8; RECORD_HEADER_SIZE], order: ByteOrder) -> Self {
        Self {
            record_type: order.read_u16(buf, 0),
            version: order.read_i16(buf, 2),
            data_size: order.read_i32(buf, 4),
        }
    }

    pub fn encode(&self, order: ByteOrder) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        order.write_u16(&mut buf, 0, self.record_type);
        order.write_i16(&mut buf, 2, self.version);
        order.write_i32(&mut buf, 4, self.data_size);
        buf
    }
}

/// Byte order of a packed file, guessed from its first record header.
///
/// Record kinds are small numbers. A kind that only looks small after
/// swapping means the file comes from a machine of the other byte order.
pub fn detect_record_order(first: &[u8; RECORD_HEADER_SIZE]) -> ByteOrder {
    let native = ByteOrder::native();
    let as_native = native.read_u16(first, 0) & RECORD_TYPE_MASK;
    let as_swapped = native.swapped().read_u16(first, 0) & RECORD_TYPE_MASK;
    if as_native > 0xFF && as_swapped <= 0xFF {
        native.swapped()
    } else {
        native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superseded_flag_does_not_change_the_kind() {
        let h = RecordHeader {
            record_type: SUPERSEDED_FLAG | 3,
            version: 0,
            data_size: 10,
        };
        assert_eq!(h.kind(), RecordKind::Wave);
        assert!(h.is_superseded());
        assert!(!RecordHeader::new(RecordKind::Wave, 1).is_superseded());
    }

    #[test]
    fn ids_map_both_ways() {
        for id in 0..FIRST_RESERVED_KIND {
            assert_eq!(RecordKind::from_id(id).id(), id);
        }
        assert_eq!(RecordKind::from_id(11), RecordKind::Reserved(11));
        assert_eq!(RecordKind::from_id(0x7ABC), RecordKind::Reserved(0x7ABC));
    }

    #[test]
    fn detects_foreign_order_from_first_record() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            for kind in [RecordKind::Variables, RecordKind::Wave, RecordKind::Reserved(20)] {
                let buf = RecordHeader::new(kind, 300).encode(order);
                assert_eq!(detect_record_order(&buf), order, "{kind:?}");
                let back = RecordHeader::decode(&buf, order);
                assert_eq!(back.kind(), kind);
                assert_eq!(back.data_size, 300);
            }
            let superseded = RecordHeader {
                record_type: SUPERSEDED_FLAG | 9,
                version: 1,
                data_size: 32,
            };
            assert_eq!(detect_record_order(&superseded.encode(order)), order);
        }
    }

    #[test]
    fn negative_sizes_are_rejected() {
        assert!(RecordHeader::new(RecordKind::History, -1).data_len().is_err());
        assert_eq!(RecordHeader::new(RecordKind::History, 5).data_len().unwrap(), 5);
    }
}
