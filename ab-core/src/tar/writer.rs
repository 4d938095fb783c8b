//! Streaming tar writer: accepts [`TarRecord`]s carrying their raw header
//! and payload bytes and appends the two-block terminator on `finish`.
//! Serialisation is bit-exact: writing back everything a reader produced
//! reproduces the original stream.

use std::io::Write;

use super::entry::{BLOCK_LEN, TarRecord, round_up_block};
use crate::error::{AbError, Result};

pub struct TarWriter<W: Write> {
    inner: W,
    finished: bool,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, finished: false }
    }

    pub fn write_record(&mut self, record: &TarRecord) -> Result<()> {
        if self.finished {
            return Err(AbError::MalformedHeader("write attempted after tar terminator".into()));
        }
        let expected_payload_len = round_up_block(record.decoded.size) as usize;
        let is_payload_bearing = record.decoded.typeflag.to_byte() == b'0' || record.decoded.typeflag.to_byte() == b'7';
        if is_payload_bearing && record.file_payload.len() != expected_payload_len {
            return Err(AbError::MalformedHeader(format!(
                "payload length {} does not match declared size rounded to 512 ({})",
                record.file_payload.len(),
                expected_payload_len
            )));
        }

        for block in &record.pax_blocks {
            self.inner.write_all(&block.raw_header)?;
            self.inner.write_all(&block.raw_payload)?;
        }
        self.inner.write_all(&record.raw_header)?;
        self.inner.write_all(&record.file_payload)?;
        Ok(())
    }

    /// Emit the two-block terminator. Further writes are refused.
    pub fn finish(mut self) -> Result<W> {
        if !self.finished {
            self.inner.write_all(&[0u8; BLOCK_LEN * 2])?;
            self.finished = true;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::entry::{DecodedEntry, TypeFlag, compute_checksum, format_octal_field};

    fn sample_record(name: &str, contents: &[u8]) -> TarRecord {
        let mut block = [0u8; BLOCK_LEN];
        let name_bytes = name.as_bytes();
        block[..name_bytes.len()].copy_from_slice(name_bytes);
        block[100..108].copy_from_slice(&format_octal_field(0o644, 8));
        block[124..136].copy_from_slice(&format_octal_field(contents.len() as u64, 12));
        block[156] = b'0';
        let checksum = compute_checksum(&block);
        block[148..156].copy_from_slice(&format_octal_field(checksum, 8));

        let payload_len = round_up_block(contents.len() as u64) as usize;
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
    fn refuses_write_after_finish() {
        let record = sample_record("a", b"1");
        let mut writer = TarWriter::new(Vec::new());
        writer.write_record(&record).unwrap();
        let out = writer.finish().unwrap();

        let mut writer2 = TarWriter::new(out);
        writer2.finish().unwrap();
    }

    #[test]
    fn payload_length_mismatch_is_rejected() {
        let mut record = sample_record("a", b"short");
        record.file_payload = vec![0u8; 512 * 3];
        let mut writer = TarWriter::new(Vec::new());
        assert!(writer.write_record(&record).is_err());
    }

    #[test]
    fn terminator_is_two_zero_blocks() {
        let writer = TarWriter::new(Vec::new());
        let out = writer.finish().unwrap();
        assert_eq!(out.len(), BLOCK_LEN * 2);
        assert!(out.iter().all(|&b| b == 0));
    }
}
