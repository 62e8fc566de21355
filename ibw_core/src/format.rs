use serde::Serialize;

use crate::error::{IgorError, Result};

/// Maximum number of wave dimensions.
pub const MAX_DIMS: usize = 4;

/// Maximum wave name length in version 1–3 files, without the trailing null.
pub const MAX_WAVE_NAME2: usize = 18;

/// Maximum wave name length in version 5 files, without the trailing null.
pub const MAX_WAVE_NAME5: usize = 31;

/// Maximum length of the fixed-size unit fields, without the trailing null.
pub const MAX_UNIT_CHARS: usize = 3;

// ── Structure sizes (2-byte packed, 4-byte pointers) ───────────────────────

pub const BIN_HEADER1_SIZE: usize = 8;
pub const BIN_HEADER2_SIZE: usize = 16;
pub const BIN_HEADER3_SIZE: usize = 20;
pub const BIN_HEADER5_SIZE: usize = 64;

/// `WaveHeader2` including its 16-byte `wData` field.
pub const WAVE_HEADER2_SIZE: usize = 126;
/// `WaveHeader5` including its 4-byte `wData` field.
pub const WAVE_HEADER5_SIZE: usize = 324;

/// Size of the `wData` field that ends each wave header. These bytes are the
/// first bytes of the wave data.
pub const TAIL_SIZE_V2: usize = 16;
pub const TAIL_SIZE_V5: usize = 4;

/// Padding that follows the wave data in version 2 and 3 files.
pub const DATA_PADDING_V2: usize = 16;

/// Seconds between the Igor epoch (1904-01-01) and the Unix epoch.
pub const IGOR_EPOCH_OFFSET: i64 = 2_082_844_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FormatVersion {
    V1,
    V2,
    V3,
    V5,
}

impl FormatVersion {
    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            1 => Some(FormatVersion::V1),
            2 => Some(FormatVersion::V2),
            3 => Some(FormatVersion::V3),
            5 => Some(FormatVersion::V5),
            _ => None,
        }
    }

    pub fn number(self) -> i16 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
            FormatVersion::V5 => 5,
        }
    }

    pub fn layout(self) -> Layout {
        let (bin_size, wave_size, tail_size) = match self {
            FormatVersion::V1 => (BIN_HEADER1_SIZE, WAVE_HEADER2_SIZE, TAIL_SIZE_V2),
            FormatVersion::V2 => (BIN_HEADER2_SIZE, WAVE_HEADER2_SIZE, TAIL_SIZE_V2),
            FormatVersion::V3 => (BIN_HEADER3_SIZE, WAVE_HEADER2_SIZE, TAIL_SIZE_V2),
            FormatVersion::V5 => (BIN_HEADER5_SIZE, WAVE_HEADER5_SIZE, TAIL_SIZE_V5),
        };
        let checksum_span = match self {
            // version 5 excludes the wData field
            FormatVersion::V5 => bin_size + wave_size - TAIL_SIZE_V5,
            _ => bin_size + wave_size,
        };
        Layout {
            version: self,
            bin_size,
            wave_size,
            tail_size,
            checksum_span,
        }
    }
}

/// Byte geometry of one version's header pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub version: FormatVersion,
    /// Size of the container (`BinHeader`) structure.
    pub bin_size: usize,
    /// Size of the wave header structure, including its trailing `wData`.
    pub wave_size: usize,
    /// Bytes of wave data that overlap the end of the wave header.
    pub tail_size: usize,
    /// Bytes from the start of the file covered by the checksum.
    pub checksum_span: usize,
}

impl Layout {
    /// Both headers, as read from the stream in one go.
    pub fn header_size(&self) -> usize {
        self.bin_size + self.wave_size
    }

    /// The part of `wfmSize` that is wave header rather than data.
    pub fn wfm_overhead(&self) -> usize {
        match self.version {
            FormatVersion::V5 => self.wave_size - self.tail_size,
            _ => self.wave_size,
        }
    }
}

// ── Element types ──────────────────────────────────────────────────────────

/// Type code of a text wave.
pub const NT_TEXT: i16 = 0;
/// Complex flag bit.
pub const NT_CMPLX: i16 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementType {
    Float32,
    Float64,
    Complex64,
    Complex128,
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    ComplexInt8,
    ComplexInt16,
    ComplexInt32,
    ComplexUInt8,
    ComplexUInt16,
    ComplexUInt32,
}

/// Wave type codes and the element type each stores.
///
/// Reverse lookups take the first match, so the canonical code of every type
/// precedes any alias. Code 1 (bare complex flag) is accepted on read as
/// complex double.
pub const TYPE_TABLE: &[(i16, ElementType)] = &[
    (0x02, ElementType::Float32),
    (0x03, ElementType::Complex64),
    (0x04, ElementType::Float64),
    (0x05, ElementType::Complex128),
    (0x08, ElementType::Int8),
    (0x09, ElementType::ComplexInt8),
    (0x10, ElementType::Int16),
    (0x11, ElementType::ComplexInt16),
    (0x20, ElementType::Int32),
    (0x21, ElementType::ComplexInt32),
    (0x48, ElementType::UInt8),
    (0x49, ElementType::ComplexUInt8),
    (0x50, ElementType::UInt16),
    (0x51, ElementType::ComplexUInt16),
    (0x60, ElementType::UInt32),
    (0x61, ElementType::ComplexUInt32),
    (NT_CMPLX, ElementType::Complex128),
];

impl ElementType {
    /// Decode a wave header type code.
    pub fn from_code(code: i16) -> Result<Self> {
        if code == NT_TEXT {
            return Err(IgorError::TextWave);
        }
        TYPE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, t)| *t)
            .ok_or(IgorError::UnsupportedType(code))
    }

    /// Reverse lookup in [`TYPE_TABLE`].
    pub fn code(self) -> Option<i16> {
        TYPE_TABLE.iter().find(|(_, t)| *t == self).map(|(c, _)| *c)
    }

    /// Size in bytes of one scalar component.
    pub fn component_size(self) -> usize {
        use ElementType::*;
        match self {
            Int8 | UInt8 | ComplexInt8 | ComplexUInt8 => 1,
            Int16 | UInt16 | ComplexInt16 | ComplexUInt16 => 2,
            Float32 | Int32 | UInt32 | Complex64 | ComplexInt32 | ComplexUInt32 => 4,
            Float64 | Complex128 => 8,
        }
    }

    /// Type of one scalar component; real types map to themselves.
    pub fn component(self) -> ElementType {
        use ElementType::*;
        match self {
            Complex64 => Float32,
            Complex128 => Float64,
            ComplexInt8 => Int8,
            ComplexInt16 => Int16,
            ComplexInt32 => Int32,
            ComplexUInt8 => UInt8,
            ComplexUInt16 => UInt16,
            ComplexUInt32 => UInt32,
            real => real,
        }
    }

    pub fn is_complex(self) -> bool {
        use ElementType::*;
        matches!(
            self,
            Complex64
                | Complex128
                | ComplexInt8
                | ComplexInt16
                | ComplexInt32
                | ComplexUInt8
                | ComplexUInt16
                | ComplexUInt32
        )
    }

    /// Size in bytes of one element.
    pub fn size(self) -> usize {
        if self.is_complex() {
            2 * self.component_size()
        } else {
            self.component_size()
        }
    }

    pub fn name(self) -> &'static str {
        use ElementType::*;
        match self {
            Float32 => "float32",
            Float64 => "float64",
            Complex64 => "complex64",
            Complex128 => "complex128",
            Int8 => "int8",
            Int16 => "int16",
            Int32 => "int32",
            UInt8 => "uint8",
            UInt16 => "uint16",
            UInt32 => "uint32",
            ComplexInt8 => "complex-int8",
            ComplexInt16 => "complex-int16",
            ComplexInt32 => "complex-int32",
            ComplexUInt8 => "complex-uint8",
            ComplexUInt16 => "complex-uint16",
            ComplexUInt32 => "complex-uint32",
        }
    }
}

/// Decode a fixed-width, null-padded text field.
pub fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encode `s` into a fixed-width, null-padded field, keeping at least one
/// trailing null.
pub fn to_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N.saturating_sub(1));
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn layouts_match_tn003() {
        let v5 = FormatVersion::V5.layout();
        assert_eq!(v5.checksum_span, 384);
        assert_eq!(v5.wfm_overhead(), 320);
        let v2 = FormatVersion::V2.layout();
        assert_eq!(v2.checksum_span, 142);
        assert_eq!(v2.wfm_overhead(), 126);
        assert_eq!(FormatVersion::V1.layout().header_size(), 134);
        assert_eq!(FormatVersion::V3.layout().header_size(), 146);
    }

    #[test]
    fn every_type_round_trips_through_its_code() {
        for (_, t) in TYPE_TABLE {
            let code = t.code().unwrap();
            assert_eq!(ElementType::from_code(code).unwrap(), *t);
        }
        assert_eq!(ElementType::Complex128.code(), Some(0x05));
        assert_eq!(ElementType::from_code(1).unwrap(), ElementType::Complex128);
    }

    #[test]
    fn text_and_unknown_codes_fail() {
        assert_eq!(ElementType::from_code(0).unwrap_err().kind(), ErrorKind::NotImplemented);
        assert_eq!(ElementType::from_code(0x40).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn element_sizes() {
        assert_eq!(ElementType::Float64.size(), 8);
        assert_eq!(ElementType::Complex64.size(), 8);
        assert_eq!(ElementType::ComplexUInt16.size(), 4);
        assert_eq!(ElementType::Int8.size(), 1);
    }

    #[test]
    fn fixed_fields_truncate_and_pad() {
        let f: [u8; 4] = to_fixed("meV");
        assert_eq!(&f, b"meV\0");
        let f: [u8; 4] = to_fixed("degrees");
        assert_eq!(&f, b"deg\0");
        assert_eq!(fixed_str(&f), "deg");
        assert_eq!(fixed_str(b"abc"), "abc");
    }
}
