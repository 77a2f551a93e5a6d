//! Conversions between 8-bit data and the 7-bit clean bytes Firmata SysEx
//! messages are made of.

use alloc::vec::Vec;

/// Pack 8-bit data into 7-bit clean bytes.
///
/// Every run of 7 input bytes becomes 8 output bytes: each input byte
/// contributes its low bits to one output byte and carries its remaining
/// high bits into the next. A trailing partial carry is flushed as a final
/// byte. No output byte has its most significant bit set.
pub fn pack_8_to_7(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(data.len() + data.len() / 7 + 1);
    let mut carry = 0u8;
    let mut shift = 0u32;
    for &byte in data {
        if shift == 0 {
            packed.push(byte & 0x7f);
            carry = byte >> 7;
            shift = 1;
        } else {
            packed.push(((byte << shift) & 0x7f) | carry);
            if shift == 6 {
                // seventh byte of the run, the carry fills a whole byte
                packed.push(byte >> 1);
                shift = 0;
            } else {
                shift += 1;
                carry = byte >> (8 - shift);
            }
        }
    }
    if shift > 0 {
        packed.push(carry);
    }
    packed
}

/// Unpack 7-bit clean bytes produced by [`pack_8_to_7`].
///
/// Output bytes are assembled from consecutive pairs of input bytes.
/// Input is consumed in runs of 8 bytes yielding 7 output bytes, the pair
/// straddling two runs is skipped. A lone trailing byte that cannot form a
/// pair is ignored.
pub fn unpack_7_to_8(packed: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(packed.len() * 7 / 8);
    let mut shift = 0u32;
    let mut idx = 0;
    while idx + 1 < packed.len() {
        if idx % 8 == 7 {
            idx += 1;
            continue;
        }
        data.push((packed[idx] >> shift) | (packed[idx + 1] << (7 - shift)));
        shift = if shift == 6 { 0 } else { shift + 1 };
        idx += 1;
    }
    data
}

/// Split a byte into its low 7 bits and its remaining high bit.
#[inline]
pub const fn to_14bit(value: u8) -> [u8; 2] {
    [value & 0x7f, (value >> 7) & 0x7f]
}

/// Join two 7-bit clean bytes back into a byte, dropping anything above
/// bit 7.
#[inline]
pub const fn from_14bit(low: u8, high: u8) -> u8 {
    (low & 0x7f) | ((high & 0x7f) << 7)
}

/// Split the low 21 bits of `value` into three 7-bit clean bytes, least
/// significant first.
#[inline]
pub const fn to_21bit(value: u32) -> [u8; 3] {
    [
        (value & 0x7f) as u8,
        ((value >> 7) & 0x7f) as u8,
        ((value >> 14) & 0x7f) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rand::Rng;

    #[test]
    fn single_byte_carries_high_bit() {
        assert_eq!(pack_8_to_7(&[0xff]), vec![0x7f, 0x01]);
        assert_eq!(unpack_7_to_8(&[0x7f, 0x01]), vec![0xff]);
    }

    #[test]
    fn empty_input() {
        assert!(pack_8_to_7(&[]).is_empty());
        assert!(unpack_7_to_8(&[]).is_empty());
    }

    #[test]
    fn seven_bytes_fill_eight() {
        let packed = pack_8_to_7(&[0xff; 7]);
        assert_eq!(packed, vec![0x7f; 8]);
        assert_eq!(unpack_7_to_8(&packed), vec![0xff; 7]);
    }

    #[test]
    fn read_reply_layout() {
        // correlation id followed by a 9 byte scratchpad
        let data = [
            0x34, 0x12, 0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x1c,
        ];
        let packed = pack_8_to_7(&data);
        assert_eq!(packed.len(), 13);
        assert_eq!(unpack_7_to_8(&packed), data.to_vec());
    }

    #[test]
    fn packed_bytes_are_seven_bit_clean() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let len = rng.random_range(0..64);
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            assert!(pack_8_to_7(&data).iter().all(|b| b & 0x80 == 0));
        }
    }

    #[test]
    fn round_trip_random_buffers() {
        let mut rng = rand::rng();
        for _ in 0..500 {
            let len = rng.random_range(0..100);
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            assert_eq!(unpack_7_to_8(&pack_8_to_7(&data)), data, "len {len}");
        }
    }

    #[test]
    fn round_trip_across_run_boundaries() {
        // two full ROM codes cross the second 8 byte run
        let data: Vec<u8> = (0..=255u8).rev().take(24).collect();
        assert_eq!(unpack_7_to_8(&pack_8_to_7(&data)), data);
    }

    #[test]
    fn lone_trailing_byte_is_ignored() {
        assert!(unpack_7_to_8(&[0x55]).is_empty());
        let mut packed = pack_8_to_7(&[0xaa; 7]);
        packed.push(0x7f);
        assert_eq!(unpack_7_to_8(&packed), vec![0xaa; 7]);
    }

    #[test]
    fn fixed_width_helpers() {
        assert_eq!(to_14bit(0x00), [0x00, 0x00]);
        assert_eq!(to_14bit(0x7f), [0x7f, 0x00]);
        assert_eq!(to_14bit(0xc5), [0x45, 0x01]);
        for v in 0..=255u8 {
            let [lo, hi] = to_14bit(v);
            assert_eq!(from_14bit(lo, hi), v);
        }
        // stray high bits are dropped rather than rejected
        assert_eq!(from_14bit(0xff, 0xff), 0xff);
        assert_eq!(from_14bit(0x80, 0x00), 0x00);

        assert_eq!(to_21bit(0), [0, 0, 0]);
        assert_eq!(to_21bit(0x1f_ffff), [0x7f, 0x7f, 0x7f]);
        assert_eq!(to_21bit(1000), [0x68, 0x07, 0x00]);
        assert_eq!(to_21bit(0x20_0001), [0x01, 0x00, 0x00]);
    }
}
