//! Base64url (no padding) and standard-base64 helpers.
//!
//! JWT segments and the `quote`/`runtime_data` request fields use unpadded
//! base64url (`+` -> `-`, `/` -> `_`, `=` dropped). The `x5c` field inside a
//! JWK, by contrast, is standard padded base64 per RFC 7517 — mixing the two
//! up is the single easiest bug to write in this module, so the two engines
//! are kept as separate named functions rather than a shared one with a
//! boolean flag.

use base64::{engine::general_purpose, Engine as _};

#[derive(Debug, thiserror::Error)]
#[error("invalid base64 encoding")]
pub struct DecodeError;

/// Encode `bytes` as unpadded base64url.
pub fn encode_url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode an unpadded (or padded) base64url string.
pub fn decode_url(s: &str) -> Result<Vec<u8>, DecodeError> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|_| DecodeError)
}

/// Decode a standard (RFC 4648, padded) base64 string, as used by the `x5c`
/// field of a JWK (RFC 7517).
pub fn decode_standard(s: &str) -> Result<Vec<u8>, DecodeError> {
    general_purpose::STANDARD
        .decode(s)
        .map_err(|_| DecodeError)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_url_roundtrip() {
        for len_mod in 0..4 {
            let bytes: Vec<u8> = (0..(8 + len_mod) as u8).collect();
            let encoded = encode_url(&bytes);
            assert!(!encoded.contains('+'));
            assert!(!encoded.contains('/'));
            assert!(!encoded.contains('='));
            assert_eq!(bytes, decode_url(&encoded).unwrap());
        }
    }

    #[cfg(feature = "test-utils")]
    #[test]
    fn test_url_roundtrip_proptest() {
        use proptest::prelude::*;
        proptest!(|(bytes: Vec<u8>)| {
            let encoded = encode_url(&bytes);
            prop_assert_eq!(bytes, decode_url(&encoded).unwrap());
        });
    }
}
