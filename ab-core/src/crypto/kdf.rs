//! PBKDF2-HMAC-SHA1 key derivation and the master-key salted checksum.
//!
//! The checksum algorithm Android's own backup agent uses is not fully
//! documented anywhere public; two candidate encodings of the master key
//! bytes into a PBKDF2 "password" are tried on read (see
//! [`master_key_checksum_candidates`]), and the doubling variant is written
//! by default (spec §9 open question).

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use zeroize::Zeroize;

/// `PBKDF2-HMAC-SHA1(passphrase, salt, iterations, dkLen)`.
pub fn derive_user_key(passphrase: &str, salt: &[u8], iterations: u32, dk_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; dk_len];
    pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), salt, iterations, &mut out);
    out
}

/// Re-encode each byte of `master_key` as though it were a Unicode code
/// point 0..=255 and UTF-8-encode it. Bytes `< 0x80` pass through unchanged;
/// bytes `>= 0x80` expand to a two-byte UTF-8 sequence. This is the
/// "doubling" variant Android's `Utf8` conversion of a raw byte buffer
/// produces.
fn double_high_bit_bytes(master_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(master_key.len() * 2);
    for &b in master_key {
        if b < 0x80 {
            out.push(b);
        } else {
            out.push(0xC0 | (b >> 6));
            out.push(0x80 | (b & 0x3F));
        }
    }
    out
}

/// The two plausible PBKDF2 "password" encodings of the master key for
/// checksum verification, in the order they should be tried. Each entry is
/// `(label, password_bytes)`.
pub fn master_key_checksum_candidates(master_key: &[u8]) -> [(&'static str, Vec<u8>); 2] {
    [
        ("doubled", double_high_bit_bytes(master_key)),
        ("raw", master_key.to_vec()),
    ]
}

/// Compute the master-key checksum for one password encoding.
/// `dk_len` is `len(master_key)` per spec §4.1; the stored checksum field is
/// 16 bytes, so callers compare against `checksum[..16]`.
pub fn master_key_checksum(password_bytes: &[u8], checksum_salt: &[u8], iterations: u32, dk_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; dk_len];
    pbkdf2_hmac::<Sha1>(password_bytes, checksum_salt, iterations, &mut out);
    out
}

/// Check a stored checksum against both candidate encodings. Returns the
/// label of the matching variant, if any.
pub fn verify_master_key_checksum(
    master_key: &[u8],
    checksum_salt: &[u8],
    iterations: u32,
    stored: &[u8],
) -> Option<&'static str> {
    for (label, password_bytes) in master_key_checksum_candidates(master_key) {
        let candidate = master_key_checksum(&password_bytes, checksum_salt, iterations, master_key.len());
        if candidate.len() >= stored.len() && &candidate[..stored.len()] == stored {
            return Some(label);
        }
    }
    None
}

/// Compute the checksum to embed when writing a fresh encrypted envelope:
/// the doubling variant, per spec §9's default.
pub fn write_master_key_checksum(master_key: &[u8], checksum_salt: &[u8], iterations: u32, stored_len: usize) -> Vec<u8> {
    let mut password_bytes = double_high_bit_bytes(master_key);
    let full = master_key_checksum(&password_bytes, checksum_salt, iterations, master_key.len());
    password_bytes.zeroize();
    full[..stored_len.min(full.len())].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_is_identity_below_0x80() {
        let input = [0x00u8, 0x41, 0x7f];
        assert_eq!(double_high_bit_bytes(&input), vec![0x00, 0x41, 0x7f]);
    }

    #[test]
    fn doubling_expands_high_bit_bytes() {
        let input = [0x80u8, 0xff];
        let out = double_high_bit_bytes(&input);
        assert_eq!(out, vec![0xC0, 0x80, 0xC3, 0xBF]);
    }

    #[test]
    fn derive_user_key_is_deterministic() {
        let a = derive_user_key("secret", b"salt-bytes", 1000, 32);
        let b = derive_user_key("secret", b"salt-bytes", 1000, 32);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn checksum_roundtrip_doubled_variant() {
        let master_key = vec![0xAAu8; 32];
        let salt = b"checksum-salt";
        let stored = write_master_key_checksum(&master_key, salt, 1000, 16);
        assert_eq!(
            verify_master_key_checksum(&master_key, salt, 1000, &stored),
            Some("doubled")
        );
    }

    #[test]
    fn checksum_mismatch_returns_none() {
        let master_key = vec![0xAAu8; 32];
        let salt = b"checksum-salt";
        let bogus = vec![0u8; 16];
        assert_eq!(verify_master_key_checksum(&master_key, salt, 1000, &bogus), None);
    }
}
