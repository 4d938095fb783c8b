//! The textual Android Backup header: magic line, version, compression
//! flag, encryption algorithm, and (when encrypted) four hex-encoded
//! fields. See spec §4.1 for the exact grammar.

use std::io::{BufRead, Write};

use crate::crypto::hex;
use crate::error::{AbError, Result};

pub const MAGIC: &str = "ANDROID BACKUP";
pub const MIN_VERSION: i64 = 1;
pub const MAX_VERSION: i64 = 5;

/// Encryption-related header fields, present only when the header's
/// encryption line reads `AES-256`.
#[derive(Debug, Clone)]
pub struct EncryptedHeaderFields {
    pub user_salt: Vec<u8>,
    pub checksum_salt: Vec<u8>,
    pub iterations: u32,
    pub user_key_iv: [u8; 16],
    pub master_key_blob: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RawHeader {
    pub version: i64,
    pub compressed: bool,
    pub encrypted: Option<EncryptedHeaderFields>,
}

fn read_line<R: BufRead>(r: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = r.read_line(&mut line)?;
    if n == 0 {
        return Err(AbError::MalformedHeader("unexpected end of header".into()));
    }
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

pub fn read_header<R: BufRead>(r: &mut R) -> Result<RawHeader> {
    let magic = read_line(r)?;
    if magic != MAGIC {
        return Err(AbError::BadMagic { found: magic });
    }

    let version_line = read_line(r)?;
    let version: i64 = version_line
        .parse()
        .map_err(|_| AbError::MalformedHeader(format!("non-numeric version: {version_line:?}")))?;
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(AbError::UnsupportedVersion { version });
    }

    let compression_line = read_line(r)?;
    let compressed = match compression_line.as_str() {
        "0" => false,
        "1" => true,
        other => return Err(AbError::MalformedHeader(format!("bad compression flag: {other:?}"))),
    };

    let algo_line = read_line(r)?;
    let encrypted = match algo_line.as_str() {
        "none" => None,
        "AES-256" => {
            let user_salt = hex::parse_hex_vec(&read_line(r)?)?;
            let checksum_salt = hex::parse_hex_vec(&read_line(r)?)?;
            let iterations_line = read_line(r)?;
            let iterations: u32 = iterations_line
                .parse()
                .map_err(|_| AbError::MalformedHeader(format!("non-numeric iteration count: {iterations_line:?}")))?;
            let user_key_iv = hex::parse_hex_array::<16>(&read_line(r)?)?;
            let master_key_blob = hex::parse_hex_vec(&read_line(r)?)?;
            Some(EncryptedHeaderFields {
                user_salt,
                checksum_salt,
                iterations,
                user_key_iv,
                master_key_blob,
            })
        }
        other => return Err(AbError::MalformedHeader(format!("bad encryption algorithm: {other:?}"))),
    };

    Ok(RawHeader {
        version,
        compressed,
        encrypted,
    })
}

pub fn write_header<W: Write>(w: &mut W, header: &RawHeader) -> Result<()> {
    writeln!(w, "{MAGIC}")?;
    writeln!(w, "{}", header.version)?;
    writeln!(w, "{}", if header.compressed { 1 } else { 0 })?;
    match &header.encrypted {
        None => {
            writeln!(w, "none")?;
        }
        Some(fields) => {
            writeln!(w, "AES-256")?;
            writeln!(w, "{}", hex::encode_hex(&fields.user_salt))?;
            writeln!(w, "{}", hex::encode_hex(&fields.checksum_salt))?;
            writeln!(w, "{}", fields.iterations)?;
            writeln!(w, "{}", hex::encode_hex(&fields.user_key_iv))?;
            writeln!(w, "{}", hex::encode_hex(&fields.master_key_blob))?;
        }
    }
    Ok(())
}
