use crate::error::{AbError, Result};

/// Parse a fixed-length hex string into an `N`-byte array (user key IV, etc).
pub fn parse_hex_array<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| AbError::MalformedHeader(format!("invalid hex: {e}")))?;
    if bytes.len() != N {
        return Err(AbError::MalformedHeader(format!(
            "expected {N} bytes ({} hex chars), got {}",
            N * 2,
            bytes.len()
        )));
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Parse a variable-length hex string into a byte vector (user salt,
/// checksum salt — conventionally 64 bytes but not fixed by the format).
pub fn parse_hex_vec(hex_str: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str.trim()).map_err(|e| AbError::MalformedHeader(format!("invalid hex: {e}")))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
