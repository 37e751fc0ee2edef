use crate::error::{RiskError, Result};

/// Decode a hex string (with optional `0x` prefix) to bytes.
///
/// # Errors
///
/// Returns `RiskError::InvalidAddress` if the hex string is invalid.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped)
        .map_err(|e| RiskError::InvalidAddress(format!("invalid hex string {value:?}: {e}")))
}

/// Current wall-clock time in Unix seconds.
pub fn now_unix_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_with_0x_prefix() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_hex("0xff").unwrap(), vec![255]);
    }

    #[test]
    fn test_decode_hex_without_prefix() {
        assert_eq!(decode_hex("abcd").unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn test_decode_hex_uppercase() {
        assert_eq!(decode_hex("0xABCD").unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn test_decode_hex_invalid_returns_err() {
        let err = decode_hex("0xGG").unwrap_err();
        assert!(matches!(err, RiskError::InvalidAddress(_)));
    }

    #[test]
    fn test_decode_hex_odd_length_returns_err() {
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn test_now_is_after_2024() {
        // 2024-01-01T00:00:00Z
        assert!(now_unix_secs() > 1_704_067_200);
    }
}
