//! Streaming tar reader: emits a lazy, finite, non-restartable sequence of
//! [`TarRecord`]s. Unknown fields are preserved byte-for-byte.

use std::io::Read;

use super::entry::{
    self, BLOCK_LEN, DecodedEntry, PaxBlock, TarRecord, TypeFlag, header_size, header_typeflag, is_zero_block,
    parse_pax_payload, round_up_block, ustar_name, verify_checksum,
};
use crate::error::{AbError, Result};

/// 1 MiB cap on a single PAX extended-header payload (spec §5 resource
/// bounds).
const MAX_PAX_PAYLOAD: u64 = 1024 * 1024;

pub struct TarReader<R: Read> {
    inner: R,
    offset: u64,
    exhausted: bool,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0, exhausted: false }
    }

    fn read_block(&mut self) -> Result<Option<[u8; BLOCK_LEN]>> {
        let mut block = [0u8; BLOCK_LEN];
        let mut filled = 0;
        while filled < BLOCK_LEN {
            let n = self.inner.read(&mut block[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled != BLOCK_LEN {
            return Err(AbError::TruncatedBody);
        }
        self.offset += BLOCK_LEN as u64;
        Ok(Some(block))
    }

    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(AbError::TruncatedBody);
            }
            filled += n;
        }
        self.offset += len as u64;
        Ok(buf)
    }

    fn merge_pax_keys(blocks: &[PaxBlock]) -> Result<Vec<(String, String)>> {
        let mut merged: Vec<(String, String)> = Vec::new();
        for block in blocks {
            let parsed = parse_pax_payload(&block.raw_payload)?;
            for (k, v) in parsed {
                if let Some(existing) = merged.iter_mut().find(|(ek, _)| *ek == k) {
                    existing.1 = v;
                } else {
                    merged.push((k, v));
                }
            }
        }
        Ok(merged)
    }

    /// Read the next logical record, or `None` at the two-zero-block
    /// terminator or a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<TarRecord>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut pax_blocks: Vec<PaxBlock> = Vec::new();

        loop {
            let header_offset = self.offset;
            let block = match self.read_block()? {
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Some(b) => b,
            };

            if is_zero_block(&block) {
                // Confirm the second terminator block; tolerate a clean EOF
                // in its place.
                let _ = self.read_block()?;
                self.exhausted = true;
                return Ok(None);
            }

            verify_checksum(&block, header_offset)?;
            let typeflag = header_typeflag(&block);

            if typeflag.is_pax() {
                let declared_size = header_size(&block)?;
                let payload_len = round_up_block(declared_size);
                if payload_len > MAX_PAX_PAYLOAD {
                    return Err(AbError::PaxHeaderTooLarge { size: declared_size });
                }
                let raw_payload = self.read_exact_bytes(payload_len as usize)?;
                pax_blocks.push(PaxBlock {
                    raw_header: block,
                    raw_payload,
                    is_global: matches!(typeflag, TypeFlag::PaxGlobal),
                });
                continue;
            }

            let pax_keys = Self::merge_pax_keys(&pax_blocks)?;
            let name = pax_keys
                .iter()
                .find(|(k, _)| k == "path")
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| ustar_name(&block));
            let size = match pax_keys.iter().find(|(k, _)| k == "size") {
                Some((_, v)) => v
                    .parse()
                    .map_err(|_| AbError::MalformedHeader(format!("bad PAX size override: {v:?}")))?,
                None => header_size(&block)?,
            };

            let payload_len = if matches!(typeflag, TypeFlag::Regular | TypeFlag::Contiguous) {
                round_up_block(size)
            } else {
                0
            };
            let file_payload = self.read_exact_bytes(payload_len as usize)?;

            return Ok(Some(TarRecord {
                pax_blocks,
                raw_header: block,
                file_payload,
                decoded: DecodedEntry { name, typeflag, size, pax_keys },
            }));
        }
    }
}

impl<R: Read> Iterator for TarReader<R> {
    type Item = Result<TarRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::entry::{format_octal_field, format_pax_payload};
    use crate::tar::writer::TarWriter;

    fn make_plain_record(name: &str, contents: &[u8]) -> TarRecord {
        let mut block = [0u8; BLOCK_LEN];
        let name_bytes = name.as_bytes();
        block[..name_bytes.len().min(100)].copy_from_slice(&name_bytes[..name_bytes.len().min(100)]);
        block[100..108].copy_from_slice(&format_octal_field(0o644, 8));
        block[108..116].copy_from_slice(&format_octal_field(0, 8));
        block[116..124].copy_from_slice(&format_octal_field(0, 8));
        block[124..136].copy_from_slice(&format_octal_field(contents.len() as u64, 12));
        block[136..148].copy_from_slice(&format_octal_field(0, 12));
        block[156] = b'0';
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        let checksum = entry::compute_checksum(&block);
        block[148..156].copy_from_slice(&format_octal_field(checksum, 8));

        let payload_len = entry::round_up_block(contents.len() as u64) as usize;
        let mut file_payload = vec![0u8; payload_len];
        file_payload[..contents.len()].copy_from_slice(contents);

        TarRecord {
            pax_blocks: Vec::new(),
            raw_header: block,
            file_payload,
            decoded: DecodedEntry {
                name: name.to_string(),
                typeflag: TypeFlag::Regular,
                size: contents.len() as u64,
                pax_keys: Vec::new(),
            },
        }
    }

    #[test]
    fn reads_single_entry_and_terminator() {
        let record = make_plain_record("hello.txt", b"hello world");
        let mut buf = Vec::new();
        {
            let mut writer = TarWriter::new(&mut buf);
            writer.write_record(&record).unwrap();
            writer.finish().unwrap();
        }

        let mut reader = TarReader::new(&buf[..]);
        let got = reader.read_record().unwrap().expect("one record");
        assert_eq!(got.decoded.name, "hello.txt");
        assert_eq!(got.decoded.size, 11);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn pax_path_override_takes_precedence() {
        let mut target = make_plain_record("short", b"data");
        // Truncate the ustar name on purpose; PAX path should win.
        let pax_entries = vec![("path".to_string(), "apps/com.example/_manifest".to_string())];
        let pax_payload = format_pax_payload(&pax_entries);

        let mut pax_block = [0u8; BLOCK_LEN];
        pax_block[0..9].copy_from_slice(b"PaxHeader");
        pax_block[100..108].copy_from_slice(&format_octal_field(0o644, 8));
        pax_block[124..136].copy_from_slice(&format_octal_field(pax_payload.len() as u64, 12));
        pax_block[156] = b'x';
        let checksum = entry::compute_checksum(&pax_block);
        pax_block[148..156].copy_from_slice(&format_octal_field(checksum, 8));

        let payload_len = entry::round_up_block(pax_payload.len() as u64) as usize;
        let mut raw_payload = vec![0u8; payload_len];
        raw_payload[..pax_payload.len()].copy_from_slice(&pax_payload);

        target.pax_blocks.push(PaxBlock { raw_header: pax_block, raw_payload, is_global: false });
        target.decoded.name = "apps/com.example/_manifest".to_string();
        target.decoded.pax_keys = pax_entries;

        let mut buf = Vec::new();
        {
            let mut writer = TarWriter::new(&mut buf);
            writer.write_record(&target).unwrap();
            writer.finish().unwrap();
        }

        let mut reader = TarReader::new(&buf[..]);
        let got = reader.read_record().unwrap().expect("one record");
        assert_eq!(got.decoded.name, "apps/com.example/_manifest");
    }

    #[test]
    fn empty_archive_is_just_terminator() {
        let mut buf = Vec::new();
        {
            let mut writer = TarWriter::new(&mut buf);
            writer.finish().unwrap();
        }
        let mut reader = TarReader::new(&buf[..]);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut record = make_plain_record("a", b"x");
        record.raw_header[0] = b'Z';
        let mut buf = Vec::new();
        buf.extend_from_slice(&record.raw_header);
        buf.extend_from_slice(&record.file_payload);
        buf.extend_from_slice(&[0u8; BLOCK_LEN * 2]);

        let mut reader = TarReader::new(&buf[..]);
        assert!(reader.read_record().is_err());
    }
}
