//! POSIX ustar header layout and the decoded entry view. Every entry is
//! kept as raw bytes plus a small decoded view (spec §9 "PAX metadata") so
//! verbatim re-emission is the default and cannot drift.

use crate::error::{AbError, Result};

pub const BLOCK_LEN: usize = 512;

const NAME: std::ops::Range<usize> = 0..100;
const MODE: std::ops::Range<usize> = 100..108;
const UID: std::ops::Range<usize> = 108..116;
const GID: std::ops::Range<usize> = 116..124;
const SIZE: std::ops::Range<usize> = 124..136;
const MTIME: std::ops::Range<usize> = 136..148;
const CHKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: std::ops::Range<usize> = 157..257;
const UNAME: std::ops::Range<usize> = 265..297;
const GNAME: std::ops::Range<usize> = 297..329;
const PREFIX: std::ops::Range<usize> = 345..500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFlag {
    Regular,
    Link,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    Contiguous,
    PaxExtended,
    PaxGlobal,
    LongName,
    LongLink,
    Other(u8),
}

impl TypeFlag {
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'0' | 0 => Self::Regular,
            b'1' => Self::Link,
            b'2' => Self::Symlink,
            b'3' => Self::CharDevice,
            b'4' => Self::BlockDevice,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b'7' => Self::Contiguous,
            b'x' => Self::PaxExtended,
            b'g' => Self::PaxGlobal,
            b'L' => Self::LongName,
            b'K' => Self::LongLink,
            other => Self::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::Link => b'1',
            Self::Symlink => b'2',
            Self::CharDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Contiguous => b'7',
            Self::PaxExtended => b'x',
            Self::PaxGlobal => b'g',
            Self::LongName => b'L',
            Self::LongLink => b'K',
            Self::Other(b) => b,
        }
    }

    pub fn is_pax(self) -> bool {
        matches!(self, Self::PaxExtended | Self::PaxGlobal)
    }
}

/// Parse a fixed-width numeric field: either classic NUL/space-terminated
/// octal ASCII, or GNU base-256 (high bit set in the first byte).
pub fn parse_numeric_field(field: &[u8]) -> Result<u64> {
    if let Some(&first) = field.first() {
        if first & 0x80 != 0 {
            let mut value: u64 = (first & 0x7f) as u64;
            for &b in &field[1..] {
                value = (value << 8) | b as u64;
            }
            return Ok(value);
        }
    }
    let s = field
        .iter()
        .take_while(|&&b| b != 0)
        .copied()
        .collect::<Vec<u8>>();
    let s = std::str::from_utf8(&s)
        .map_err(|_| AbError::MalformedHeader("non-UTF8 numeric tar field".into()))?
        .trim();
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 8).map_err(|_| AbError::MalformedHeader(format!("bad octal field: {s:?}")))
}

pub fn format_octal_field(value: u64, width: usize) -> Vec<u8> {
    let s = format!("{:0>width$o}\0", value, width = width - 1);
    let mut out = s.into_bytes();
    out.truncate(width);
    out
}

fn field_str(block: &[u8; BLOCK_LEN], range: std::ops::Range<usize>) -> String {
    let bytes = &block[range];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// The checksum field is treated as eight ASCII spaces while summing.
pub fn compute_checksum(block: &[u8; BLOCK_LEN]) -> u64 {
    let mut sum: u64 = 0;
    for (i, &b) in block.iter().enumerate() {
        if CHKSUM.contains(&i) {
            sum += b' ' as u64;
        } else {
            sum += b as u64;
        }
    }
    sum
}

pub fn verify_checksum(block: &[u8; BLOCK_LEN], offset: u64) -> Result<()> {
    let stored = parse_numeric_field(&block[CHKSUM])?;
    let computed = compute_checksum(block);
    if stored != computed {
        return Err(AbError::TarChecksumError { offset });
    }
    Ok(())
}

pub fn is_zero_block(block: &[u8; BLOCK_LEN]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Ustar `name`/`prefix` concatenation, before any PAX override is applied.
pub fn ustar_name(block: &[u8; BLOCK_LEN]) -> String {
    let prefix = field_str(block, PREFIX);
    let name = field_str(block, NAME);
    if prefix.is_empty() { name } else { format!("{prefix}/{name}") }
}

pub fn header_typeflag(block: &[u8; BLOCK_LEN]) -> TypeFlag {
    TypeFlag::from_byte(block[TYPEFLAG])
}

pub fn header_size(block: &[u8; BLOCK_LEN]) -> Result<u64> {
    parse_numeric_field(&block[SIZE])
}

pub fn header_mode(block: &[u8; BLOCK_LEN]) -> Result<u64> {
    parse_numeric_field(&block[MODE])
}

pub fn header_uid(block: &[u8; BLOCK_LEN]) -> Result<u64> {
    parse_numeric_field(&block[UID])
}

pub fn header_gid(block: &[u8; BLOCK_LEN]) -> Result<u64> {
    parse_numeric_field(&block[GID])
}

pub fn header_mtime(block: &[u8; BLOCK_LEN]) -> Result<u64> {
    parse_numeric_field(&block[MTIME])
}

pub fn header_linkname(block: &[u8; BLOCK_LEN]) -> String {
    field_str(block, LINKNAME)
}

pub fn header_uname(block: &[u8; BLOCK_LEN]) -> String {
    field_str(block, UNAME)
}

pub fn header_gname(block: &[u8; BLOCK_LEN]) -> String {
    field_str(block, GNAME)
}

/// Round a byte length up to the next multiple of 512.
pub fn round_up_block(len: u64) -> u64 {
    len.div_ceil(BLOCK_LEN as u64) * BLOCK_LEN as u64
}

/// Parse the `LEN key=value\n`-formatted records of a PAX extended-header
/// payload. `LEN` is the record's total length in bytes, itself included.
pub fn parse_pax_payload(payload: &[u8]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        // Trailing NUL padding after the last record.
        if rest.iter().all(|&b| b == 0) {
            break;
        }
        let space_pos = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| AbError::MalformedHeader("malformed PAX record: no length prefix".into()))?;
        let len_str = std::str::from_utf8(&rest[..space_pos])
            .map_err(|_| AbError::MalformedHeader("non-UTF8 PAX record length".into()))?;
        let record_len: usize = len_str
            .parse()
            .map_err(|_| AbError::MalformedHeader(format!("bad PAX record length: {len_str:?}")))?;
        if record_len == 0 || record_len > rest.len() {
            return Err(AbError::MalformedHeader("PAX record length out of range".into()));
        }
        let record = &rest[..record_len];
        let body = &record[space_pos + 1..record_len.saturating_sub(1)];
        let eq_pos = body
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| AbError::MalformedHeader("malformed PAX record: no '='".into()))?;
        let key = String::from_utf8_lossy(&body[..eq_pos]).into_owned();
        let value = String::from_utf8_lossy(&body[eq_pos + 1..]).into_owned();
        out.push((key, value));
        rest = &rest[record_len..];
    }
    Ok(out)
}

pub fn format_pax_payload(entries: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in entries {
        // `len key=value\n` where `len` includes its own decimal digits,
        // the space, key, '=', value, '\n'. Solve by growing the length
        // guess until it's self-consistent (the standard fixed-point trick).
        let body_len = key.len() + value.len() + 2; // '=' + '\n'
        let mut len = body_len + 1;
        loop {
            let digits = len.to_string().len();
            let candidate = digits + 1 + body_len;
            if candidate == len {
                break;
            }
            len = candidate;
        }
        out.extend_from_slice(format!("{len} {key}={value}\n").as_bytes());
    }
    out
}

#[derive(Debug, Clone)]
pub struct DecodedEntry {
    pub name: String,
    pub typeflag: TypeFlag,
    pub size: u64,
    pub pax_keys: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct PaxBlock {
    pub raw_header: [u8; BLOCK_LEN],
    pub raw_payload: Vec<u8>,
    pub is_global: bool,
}

/// One logical tar entry: zero or more preceding PAX extended-header
/// blocks, the main ustar header, and the file payload (size rounded up to
/// 512 bytes, padding included). Emittable verbatim from its raw fields
/// alone.
#[derive(Debug, Clone)]
pub struct TarRecord {
    pub pax_blocks: Vec<PaxBlock>,
    pub raw_header: [u8; BLOCK_LEN],
    pub file_payload: Vec<u8>,
    pub decoded: DecodedEntry,
}

impl TarRecord {
    /// Total byte length of this record as it appears on the wire.
    pub fn wire_len(&self) -> u64 {
        let pax_len: u64 = self
            .pax_blocks
            .iter()
            .map(|b| BLOCK_LEN as u64 + b.raw_payload.len() as u64)
            .sum();
        pax_len + BLOCK_LEN as u64 + self.file_payload.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_roundtrip() {
        let field = format_octal_field(0o755, 8);
        assert_eq!(parse_numeric_field(&field).unwrap(), 0o755);
    }

    #[test]
    fn pax_payload_roundtrip() {
        let entries = vec![
            ("path".to_string(), "apps/com.example/_manifest".to_string()),
            ("size".to_string(), "1234567890".to_string()),
        ];
        let payload = format_pax_payload(&entries);
        let parsed = parse_pax_payload(&payload).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn checksum_detects_corruption() {
        let mut block = [0u8; BLOCK_LEN];
        block[..4].copy_from_slice(b"name");
        let checksum = compute_checksum(&block);
        let field = format_octal_field(checksum, 8);
        block[CHKSUM].copy_from_slice(&field);
        verify_checksum(&block, 0).unwrap();

        block[0] = b'X';
        assert!(verify_checksum(&block, 0).is_err());
    }

    #[test]
    fn round_up_block_boundaries() {
        assert_eq!(round_up_block(0), 0);
        assert_eq!(round_up_block(1), 512);
        assert_eq!(round_up_block(512), 512);
        assert_eq!(round_up_block(513), 1024);
    }
}
