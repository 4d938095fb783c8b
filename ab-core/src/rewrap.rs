//! Re-emit an archive under a caller-chosen compression/encryption
//! combination (spec §4.5). `Keep` bypasses the Tar Engine and the zlib
//! layer entirely, moving the opaque body bytes as-is.

use std::io::{BufReader, Read, Write};

use crate::crypto::{aes_cbc, kdf};
use crate::envelope::header::{self, read_header};
use crate::envelope::{WriteEncryptionOptions, open_read, open_write, split_master_key_blob};
use crate::error::{AbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Decompress,
    Keep,
    Compress,
}

pub fn rewrap<R, W, F>(
    src: R,
    passphrase: F,
    ignore_checksum: bool,
    compression: CompressionMode,
    encrypt_output: Option<WriteEncryptionOptions>,
    dst: W,
) -> Result<()>
where
    R: Read,
    W: Write,
    F: FnOnce() -> Result<String>,
{
    match compression {
        CompressionMode::Keep => rewrap_keep(src, passphrase, ignore_checksum, encrypt_output, dst),
        CompressionMode::Decompress => rewrap_recode(src, passphrase, ignore_checksum, false, encrypt_output, dst),
        CompressionMode::Compress => rewrap_recode(src, passphrase, ignore_checksum, true, encrypt_output, dst),
    }
}

fn rewrap_recode<R, W, F>(
    src: R,
    passphrase: F,
    ignore_checksum: bool,
    compress_output: bool,
    encrypt_output: Option<WriteEncryptionOptions>,
    dst: W,
) -> Result<()>
where
    R: Read,
    W: Write,
    F: FnOnce() -> Result<String>,
{
    let (descriptor, mut body) = open_read(src, passphrase, ignore_checksum)?;
    let mut sink = open_write(dst, descriptor.version(), compress_output, encrypt_output)?;
    std::io::copy(&mut body, &mut sink)?;
    sink.finish()?;
    Ok(())
}

/// The fast path: strip (or pass through) the cipher layer without ever
/// inflating the body, then re-emit the header with the same compression
/// flag. Only valid when the output stays unencrypted — re-encrypting
/// opaque bytes under a fresh key is treated as a `compress`/`decompress`
/// recode instead.
fn rewrap_keep<R, W, F>(
    src: R,
    passphrase: F,
    ignore_checksum: bool,
    encrypt_output: Option<WriteEncryptionOptions>,
    mut dst: W,
) -> Result<()>
where
    R: Read,
    W: Write,
    F: FnOnce() -> Result<String>,
{
    if encrypt_output.is_some() {
        return Err(AbError::MalformedHeader(
            "keep-compression rewrap cannot also encrypt the output; use compress/decompress instead".into(),
        ));
    }

    let mut reader = BufReader::new(src);
    let raw = read_header(&mut reader)?;

    let mut plain_body: Box<dyn Read> = match &raw.encrypted {
        None => Box::new(reader),
        Some(fields) => {
            let passphrase = passphrase()?;
            let user_key_vec = kdf::derive_user_key(&passphrase, &fields.user_salt, fields.iterations, 32);
            let mut user_key = [0u8; 32];
            user_key.copy_from_slice(&user_key_vec);

            let blob_plain = aes_cbc::decrypt_whole(&user_key, &fields.user_key_iv, &fields.master_key_blob)?;
            let (tar_iv, master_key, stored_checksum) = split_master_key_blob(&blob_plain)?;

            if !ignore_checksum
                && kdf::verify_master_key_checksum(&master_key, &fields.checksum_salt, fields.iterations, &stored_checksum).is_none()
            {
                return Err(AbError::CorruptedEncryptedHeader);
            }

            Box::new(aes_cbc::CbcDecryptReader::new(reader, &master_key, &tar_iv))
        }
    };

    let out_header = header::RawHeader {
        version: raw.version,
        compressed: raw.compressed,
        encrypted: None,
    };
    header::write_header(&mut dst, &out_header)?;
    std::io::copy(&mut plain_body, &mut dst)?;
    dst.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::open_write as envelope_open_write;

    fn make_plain_archive(version: i64, compressed: bool, contents: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut body = envelope_open_write(&mut out, version, compressed, None).unwrap();
        std::io::Write::write_all(&mut body, contents).unwrap();
        body.finish().unwrap();
        out
    }

    #[test]
    fn keep_on_unencrypted_is_byte_copy_of_body() {
        let input = make_plain_archive(4, true, b"compressed-ish bytes not actually deflated in this test helper");
        let mut out = Vec::new();
        rewrap(&input[..], || Ok(String::new()), false, CompressionMode::Keep, None, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn decompress_then_unwrap_yields_original_tar_bytes() {
        let tar_bytes = vec![7u8; 4096];
        let input = make_plain_archive(4, true, &tar_bytes);
        let mut out = Vec::new();
        rewrap(&input[..], || Ok(String::new()), false, CompressionMode::Decompress, None, &mut out).unwrap();

        let (descriptor, mut body) = open_read(&out[..], || Ok(String::new()), false).unwrap();
        assert!(!descriptor.is_compressed());
        let mut got = Vec::new();
        std::io::Read::read_to_end(&mut body, &mut got).unwrap();
        assert_eq!(got, tar_bytes);
    }

    #[test]
    fn encrypted_keep_decrypts_without_inflating() {
        let tar_bytes = vec![3u8; 2048];
        let mut out = Vec::new();
        let opts = WriteEncryptionOptions { passphrase: "hunter2".to_string(), salt_bytes: 32, iterations: 1000 };
        let mut body = envelope_open_write(&mut out, 5, true, Some(opts)).unwrap();
        std::io::Write::write_all(&mut body, &tar_bytes).unwrap();
        body.finish().unwrap();

        let mut rewrapped = Vec::new();
        rewrap(
            &out[..],
            || Ok("hunter2".to_string()),
            false,
            CompressionMode::Keep,
            None,
            &mut rewrapped,
        )
        .unwrap();

        let (descriptor, mut reader) = open_read(&rewrapped[..], || Ok(String::new()), false).unwrap();
        assert!(!descriptor.is_encrypted());
        assert!(descriptor.is_compressed());
        let mut got = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut got).unwrap();
        assert_eq!(got, tar_bytes);
    }

    #[test]
    fn keep_with_encrypt_output_is_rejected() {
        let input = make_plain_archive(4, false, b"x");
        let mut out = Vec::new();
        let opts = WriteEncryptionOptions { passphrase: "pw".to_string(), salt_bytes: 16, iterations: 10 };
        let result = rewrap(&input[..], || Ok(String::new()), false, CompressionMode::Keep, Some(opts), &mut out);
        assert!(result.is_err());
    }
}
