//! Igor header checksum.
//!
//! The checksum is the sum of the header bytes read as signed 16-bit words,
//! accumulated the way a 32-bit C `int` would accumulate it and then
//! truncated to a signed `short`. A valid file sums to zero over its
//! checksum span; a writer stores the negated sum in the header.

use crate::endian::ByteOrder;

/// Fold a wide accumulator into the signed 32-bit range (C `int` rollover).
fn fold32(acc: i64) -> i32 {
    acc as u32 as i32
}

/// Fold a 32-bit sum into a signed 16-bit checksum.
fn fold16(sum: i32) -> i16 {
    (sum & 0xFFFF) as u16 as i16
}

/// Checksum over the first `num_bytes` of `buf`, continuing from `seed`.
///
/// A trailing odd byte is ignored, as is anything beyond `buf.len()`.
pub fn checksum(buf: &[u8], order: ByteOrder, seed: i32, num_bytes: usize) -> i16 {
    let span = &buf[..num_bytes.min(buf.len())];
    let mut acc = seed as i64;
    for word in span.chunks_exact(2) {
        acc += order.read_i16(word, 0) as i64;
        acc = fold32(acc) as i64;
    }
    fold16(fold32(acc))
}

/// Value to store in a header's checksum field so that the span sums to zero.
/// The field itself must be zero in `buf` when this is computed.
pub fn seal(buf: &[u8], order: ByteOrder, num_bytes: usize) -> i16 {
    checksum(buf, order, 0, num_bytes).wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[i16], order: ByteOrder) -> Vec<u8> {
        let mut buf = vec![0u8; values.len() * 2];
        for (i, v) in values.iter().enumerate() {
            order.write_i16(&mut buf, i * 2, *v);
        }
        buf
    }

    #[test]
    fn small_sums_are_exact() {
        let buf = words(&[1, 2, 3, -10], ByteOrder::Little);
        assert_eq!(checksum(&buf, ByteOrder::Little, 0, buf.len()), -4);
        assert_eq!(checksum(&buf, ByteOrder::Little, 4, buf.len()), 0);
    }

    #[test]
    fn wraps_into_sixteen_bits() {
        // 3 * 30000 = 90000 = 0x15F90 -> low word 0x5F90
        let buf = words(&[30000, 30000, 30000], ByteOrder::Big);
        assert_eq!(checksum(&buf, ByteOrder::Big, 0, buf.len()), 0x5F90);

        // 2 * 32767 = 65534 = 0xFFFE -> -2 as a short
        let buf = words(&[i16::MAX, i16::MAX], ByteOrder::Little);
        assert_eq!(checksum(&buf, ByteOrder::Little, 0, buf.len()), -2);
    }

    #[test]
    fn emulates_int_rollover_for_large_sums() {
        // A seed near i32::MAX forces the 32-bit fold before truncation.
        let buf = words(&[i16::MAX; 4], ByteOrder::Little);
        let expected = (i32::MAX).wrapping_add(4 * i16::MAX as i32) as i16;
        assert_eq!(checksum(&buf, ByteOrder::Little, i32::MAX, buf.len()), expected);
    }

    #[test]
    fn trailing_odd_byte_is_ignored() {
        let mut buf = words(&[7, 8], ByteOrder::Little);
        buf.push(0xFF);
        assert_eq!(checksum(&buf, ByteOrder::Little, 0, buf.len()), 15);
    }

    #[test]
    fn byte_order_changes_the_words() {
        let buf = [0x01, 0x00];
        assert_eq!(checksum(&buf, ByteOrder::Little, 0, 2), 1);
        assert_eq!(checksum(&buf, ByteOrder::Big, 0, 2), 256);
    }

    #[test]
    fn seal_zeroes_the_span() {
        for values in [&[1i16, 2, 3][..], &[i16::MIN, i16::MIN][..], &[-1, -1, -1][..]] {
            let mut buf = words(values, ByteOrder::Big);
            buf.extend_from_slice(&[0, 0]);
            let seal = seal(&buf, ByteOrder::Big, buf.len());
            let at = buf.len() - 2;
            ByteOrder::Big.write_i16(&mut buf, at, seal);
            assert_eq!(checksum(&buf, ByteOrder::Big, 0, buf.len()), 0);
        }
    }
}
