//! Byte-order handling.
//!
//! Every multi-byte field in an Igor file is stored in the byte order of the
//! machine that wrote it. The order is discovered once per file from the
//! version field and then threaded through every structure decoder, which
//! only ever calls the order-aware primitives defined here.

use std::io::{ErrorKind as IoErrorKind, Read};

use byteorder::{BigEndian, ByteOrder as RawOrder, LittleEndian};
use serde::Serialize;

use crate::error::{IgorError, Result};
use crate::format::FormatVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ByteOrder {
    Little,
    Big,
}

macro_rules! primitive {
    ($read:ident, $write:ident, $ty:ty, $size:expr) => {
        pub fn $read(self, buf: &[u8], offset: usize) -> $ty {
            let b = &buf[offset..offset + $size];
            match self {
                ByteOrder::Little => LittleEndian::$read(b),
                ByteOrder::Big => BigEndian::$read(b),
            }
        }

        pub fn $write(self, buf: &mut [u8], offset: usize, value: $ty) {
            let b = &mut buf[offset..offset + $size];
            match self {
                ByteOrder::Little => LittleEndian::$write(b, value),
                ByteOrder::Big => BigEndian::$write(b, value),
            }
        }
    };
}

impl ByteOrder {
    /// Byte order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub const fn swapped(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Little => "little-endian",
            ByteOrder::Big => "big-endian",
        }
    }

    primitive!(read_i16, write_i16, i16, 2);
    primitive!(read_u16, write_u16, u16, 2);
    primitive!(read_i32, write_i32, i32, 4);
    primitive!(read_u32, write_u32, u32, 4);
    primitive!(read_f32, write_f32, f32, 4);
    primitive!(read_f64, write_f64, f64, 8);
}

/// Infer the format version and byte order from the first two bytes of a
/// wave file.
///
/// The version is a small number, so its low-order byte is never zero when
/// read in the writer's order. A zero low byte under the native order means
/// the file comes from a machine of the opposite order.
pub fn detect_version(field: [u8; 2]) -> Result<(FormatVersion, ByteOrder)> {
    let native = ByteOrder::native();
    let raw = native.read_i16(&field, 0);
    let order = if raw & 0xFF == 0 {
        native.swapped()
    } else {
        native
    };
    let version = order.read_i16(&field, 0);
    let version = FormatVersion::from_raw(version).ok_or(IgorError::UnsupportedVersion(version))?;
    Ok((version, order))
}

/// Convert a buffer of fixed-width components from `from` order to the host
/// order in place. `width` is the size of one scalar component (a complex
/// element is two components).
pub fn normalize_components(data: &mut [u8], width: usize, from: ByteOrder) {
    if width > 1 && !from.is_native() {
        for chunk in data.chunks_exact_mut(width) {
            chunk.reverse();
        }
    }
}

/// Fill `buf` completely or fail with [`IgorError::ShortRead`].
pub fn read_fully<R: Read + ?Sized>(r: &mut R, buf: &mut [u8], what: &'static str) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled < buf.len() {
        return Err(IgorError::ShortRead {
            what,
            expected: buf.len(),
            got: filled,
        });
    }
    Ok(())
}

/// Sequential field decoder over a fixed-size header buffer.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Self { buf, pos: 0, order }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn i16(&mut self) -> i16 {
        let v = self.order.read_i16(self.buf, self.pos);
        self.pos += 2;
        v
    }

    pub fn u16(&mut self) -> u16 {
        let v = self.order.read_u16(self.buf, self.pos);
        self.pos += 2;
        v
    }

    pub fn i32(&mut self) -> i32 {
        let v = self.order.read_i32(self.buf, self.pos);
        self.pos += 4;
        v
    }

    pub fn u32(&mut self) -> u32 {
        let v = self.order.read_u32(self.buf, self.pos);
        self.pos += 4;
        v
    }

    pub fn f64(&mut self) -> f64 {
        let v = self.order.read_f64(self.buf, self.pos);
        self.pos += 8;
        v
    }

    pub fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

/// Sequential field encoder; the counterpart of [`FieldReader`].
pub struct FieldWriter {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl FieldWriter {
    pub fn with_capacity(capacity: usize, order: ByteOrder) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            order,
        }
    }

    fn grow(&mut self, n: usize) -> usize {
        let at = self.buf.len();
        self.buf.resize(at + n, 0);
        at
    }

    pub fn i16(&mut self, v: i16) {
        let at = self.grow(2);
        self.order.write_i16(&mut self.buf, at, v);
    }

    pub fn u16(&mut self, v: u16) {
        let at = self.grow(2);
        self.order.write_u16(&mut self.buf, at, v);
    }

    pub fn i32(&mut self, v: i32) {
        let at = self.grow(4);
        self.order.write_i32(&mut self.buf, at, v);
    }

    pub fn u32(&mut self, v: u32) {
        let at = self.grow(4);
        self.order.write_u32(&mut self.buf, at, v);
    }

    pub fn f64(&mut self, v: f64) {
        let at = self.grow(8);
        self.order.write_f64(&mut self.buf, at, v);
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn zeros(&mut self, n: usize) {
        self.grow(n);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn detects_both_orders() {
        let (v, order) = detect_version(5i16.to_le_bytes()).unwrap();
        assert_eq!(v, FormatVersion::V5);
        assert_eq!(order, ByteOrder::Little);

        let (v, order) = detect_version(2i16.to_be_bytes()).unwrap();
        assert_eq!(v, FormatVersion::V2);
        assert_eq!(order, ByteOrder::Big);
    }

    #[test]
    fn rejects_unknown_versions() {
        for raw in [0i16, 4, 6, 0x0101] {
            let err = detect_version(raw.to_le_bytes()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "version {raw}");
        }
    }

    #[test]
    fn normalize_swaps_only_foreign_order() {
        let mut data = vec![1u8, 2, 3, 4];
        normalize_components(&mut data, 2, ByteOrder::native());
        assert_eq!(data, [1, 2, 3, 4]);
        normalize_components(&mut data, 2, ByteOrder::native().swapped());
        assert_eq!(data, [2, 1, 4, 3]);
    }

    #[test]
    fn read_fully_reports_short_reads() {
        let mut src: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];
        match read_fully(&mut src, &mut buf, "version field") {
            Err(IgorError::ShortRead { expected, got, .. }) => {
                assert_eq!((expected, got), (8, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn field_writer_and_reader_agree() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut w = FieldWriter::with_capacity(16, order);
            w.i16(-3);
            w.u32(0xDEAD_BEEF);
            w.f64(2.5);
            let buf = w.into_inner();
            let mut r = FieldReader::new(&buf, order);
            assert_eq!(r.i16(), -3);
            assert_eq!(r.u32(), 0xDEAD_BEEF);
            assert_eq!(r.f64(), 2.5);
            assert_eq!(r.position(), 14);
        }
    }
}
