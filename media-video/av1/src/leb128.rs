//! Unsigned LEB128 as used for `obu_size` and the AV1 RTP element lengths
//!
//! Each byte carries 7 bits of the value, least significant group first.
//! The most significant bit of a byte is set when more bytes follow.

use bytes::BufMut;
use smallvec::SmallVec;

/// Maximum number of bytes needed to encode a `u64`
pub const MAX_LEB128_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Leb128Error {
    #[error("buffer ended inside a leb128 value")]
    Truncated,
    #[error("leb128 value exceeds 64 bits")]
    Overflow,
}

/// Number of bytes [`write_leb128`] writes for `value`
pub fn leb128_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Read a leb128 value from the start of `bytes`, returning the value and the number of bytes read
pub fn read_leb128(bytes: &[u8]) -> Result<(u64, usize), Leb128Error> {
    let mut value = 0u64;

    for (i, leb128_byte) in bytes.iter().take(MAX_LEB128_LEN).enumerate() {
        let group = u64::from(leb128_byte & 0x7F);
        let shift = i * 7;

        // the tenth byte may only contribute the 64th bit
        if shift == 63 && group > 1 {
            return Err(Leb128Error::Overflow);
        }

        value |= group << shift;

        if leb128_byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if bytes.len() >= MAX_LEB128_LEN {
        Err(Leb128Error::Overflow)
    } else {
        Err(Leb128Error::Truncated)
    }
}

/// Decode a leb128 value, ignoring any bytes following it
pub fn decode_leb128(bytes: &[u8]) -> Result<u64, Leb128Error> {
    read_leb128(bytes).map(|(value, _)| value)
}

pub fn write_leb128(mut buf: impl BufMut, value: u64) {
    buf.put_slice(&encode_leb128(value));
}

/// Encode `value` into its minimal leb128 representation
pub fn encode_leb128(mut value: u64) -> SmallVec<[u8; MAX_LEB128_LEN]> {
    let mut buf = SmallVec::new();

    while {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        let more_bytes = value != 0;

        byte |= (more_bytes as u8) << 7;
        buf.push(byte);

        more_bytes
    } {}

    buf
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn write_and_parse_the_world() {
        fn write_and_parse(num: u64) {
            let buf = encode_leb128(num);

            assert_eq!(buf.len(), leb128_size(num));
            assert_eq!(read_leb128(&buf).unwrap(), (num, buf.len()));
        }

        for i in (0..u64::from(u32::MAX)).step_by(100_003) {
            write_and_parse(i);
        }

        write_and_parse(u64::MAX);
    }

    #[test]
    fn size_boundaries() {
        assert_eq!(encode_leb128(0).len(), 1);
        assert_eq!(encode_leb128(127).len(), 1);
        assert_eq!(encode_leb128(128).len(), 2);
        assert_eq!(encode_leb128(16383).len(), 2);
        assert_eq!(encode_leb128(16384).len(), 3);
        assert_eq!(encode_leb128(2097151).len(), 3);
        assert_eq!(encode_leb128(2097152).len(), 4);
        assert_eq!(encode_leb128(u64::MAX).len(), MAX_LEB128_LEN);
    }

    #[test]
    fn known_encoding() {
        assert_eq!(&encode_leb128(999999)[..], &[0xBF, 0x84, 0x3D]);
        assert_eq!(decode_leb128(&[0xBF, 0x84, 0x3D]), Ok(999999));
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        assert_eq!(read_leb128(&[0x05, 0xFF, 0xFF]), Ok((5, 1)));
        assert_eq!(read_leb128(&[0x80, 0x01, 0x07]), Ok((128, 2)));
    }

    #[test]
    fn truncated() {
        assert_eq!(read_leb128(&[0xFF]), Err(Leb128Error::Truncated));
        assert_eq!(read_leb128(&[0x80, 0x80]), Err(Leb128Error::Truncated));
        assert_eq!(read_leb128(&[]), Err(Leb128Error::Truncated));
    }

    #[test]
    fn overflow() {
        assert_eq!(read_leb128(&[0xFF; 11]), Err(Leb128Error::Overflow));

        let mut too_large = [0xFF; 10];
        too_large[9] = 0x02;
        assert_eq!(read_leb128(&too_large), Err(Leb128Error::Overflow));
    }

    proptest! {
        #[test]
        fn roundtrip_u32(value in any::<u32>()) {
            let value = u64::from(value);
            prop_assert_eq!(decode_leb128(&encode_leb128(value)), Ok(value));
        }
    }
}
