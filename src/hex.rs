//! Hex (base16) encode/decode helpers.
//!
//! Kept in-crate rather than pulled in from `crates.io`, matching the
//! dependency-free `hex` utility crate this workspace otherwise reaches for.
//! Unlike that crate's lowercase-only decoder, [`decode_to_slice`] accepts
//! mixed-case input, since upstream (ITA JWT claims, hex-encoded
//! measurements in env vars) makes no case guarantee.

use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    BadOutputLength,
    InvalidCharacter,
    OddInputLength,
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadOutputLength => {
                "output buffer length != half input length"
            }
            Self::InvalidCharacter => "input contains non-hex character",
            Self::OddInputLength => "input string length must be even",
        };
        write!(f, "hex decode error: {s}")
    }
}

/// Encode `bytes` as a lowercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = vec![0u8; bytes.len() * 2];
    for (src, dst) in bytes.iter().zip(out.chunks_exact_mut(2)) {
        dst[0] = encode_nibble(src >> 4);
        dst[1] = encode_nibble(src & 0x0f);
    }
    // SAFETY: hex characters ([0-9a-f]*) are always valid UTF-8.
    unsafe { String::from_utf8_unchecked(out) }
}

/// Decode a hex string (either case, mixed case allowed) into a fixed-size
/// array. Returns [`DecodeError::BadOutputLength`] if `hex` doesn't decode to
/// exactly `N` bytes.
pub fn decode_array<const N: usize>(hex: &str) -> Result<[u8; N], DecodeError> {
    let mut out = [0u8; N];
    decode_to_slice(hex, &mut out)?;
    Ok(out)
}

/// Decode a hex string into an owned `Vec<u8>`.
pub fn decode(hex: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddInputLength);
    }
    let mut out = vec![0u8; bytes.len() / 2];
    decode_to_slice_inner(bytes, &mut out)?;
    Ok(out)
}

/// Decode a hex string into a caller-provided output buffer. The buffer's
/// length must equal exactly half the input string's length.
pub fn decode_to_slice(hex: &str, out: &mut [u8]) -> Result<(), DecodeError> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddInputLength);
    }
    decode_to_slice_inner(bytes, out)
}

fn decode_to_slice_inner(
    hex_bytes: &[u8],
    out: &mut [u8],
) -> Result<(), DecodeError> {
    if hex_bytes.len() / 2 != out.len() {
        return Err(DecodeError::BadOutputLength);
    }
    let mut bad = 0u16;
    for (pair, out_byte) in hex_bytes.chunks_exact(2).zip(out.iter_mut()) {
        let hi = decode_nibble(pair[0]);
        let lo = decode_nibble(pair[1]);
        bad |= hi | lo;
        *out_byte = ((hi << 4) | lo) as u8;
    }
    if bad > 0x0f {
        Err(DecodeError::InvalidCharacter)
    } else {
        Ok(())
    }
}

#[inline(always)]
const fn encode_nibble(nib: u8) -> u8 {
    match nib {
        0..=9 => b'0' + nib,
        10..=15 => b'a' + (nib - 10),
        _ => unreachable!(),
    }
}

/// Decode a single hex digit (either case). Returns a value `> 0x0f` on an
/// invalid character so callers can OR several together and test once.
#[inline(always)]
const fn decode_nibble(src: u8) -> u16 {
    match src {
        b'0'..=b'9' => (src - b'0') as u16,
        b'a'..=b'f' => (src - b'a' + 10) as u16,
        b'A'..=b'F' => (src - b'A' + 10) as u16,
        _ => 0xff,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!("", encode(&[]));
        assert_eq!(
            "01348900abff",
            encode(&[0x01, 0x34, 0x89, 0x00, 0xab, 0xff])
        );
    }

    #[test]
    fn test_decode_mixed_case() {
        let expected = [0x01, 0x34, 0x89, 0x00, 0xab, 0xff];
        assert_eq!(expected.as_slice(), decode("01348900abff").unwrap());
        assert_eq!(expected.as_slice(), decode("01348900ABFF").unwrap());
        assert_eq!(expected.as_slice(), decode("01348900AbFf").unwrap());
    }

    #[test]
    fn test_decode_array() {
        let arr: [u8; 3] = decode_array("0a0b0c").unwrap();
        assert_eq!(arr, [0x0a, 0x0b, 0x0c]);
        assert_eq!(
            decode_array::<3>("0a0b"),
            Err(DecodeError::OddInputLength)
        );
        assert_eq!(
            decode_array::<4>("0a0b0c"),
            Err(DecodeError::BadOutputLength)
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode("abc"), Err(DecodeError::OddInputLength));
        assert_eq!(decode("zz"), Err(DecodeError::InvalidCharacter));
    }

    #[cfg(feature = "test-utils")]
    #[test]
    fn test_roundtrip() {
        use proptest::prelude::*;
        proptest!(|(bytes: Vec<u8>)| {
            let decoded = decode(&encode(&bytes)).unwrap();
            prop_assert_eq!(bytes.as_slice(), decoded.as_slice());
        });
    }
}
