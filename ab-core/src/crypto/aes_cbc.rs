//! Streaming AES-256-CBC with PKCS#7 padding.
//!
//! The envelope body (and the 80-byte master-key blob) is a contiguous
//! AES-256-CBC ciphertext. Rather than buffering a whole archive to use the
//! `cbc` crate's padded-buffer helpers, these wrappers process one 16-byte
//! block at a time so a multi-gigabyte tar stream never needs to be
//! materialised in memory (spec §5 resource bounds).

use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use std::io::{self, Read, Write};

use crate::error::{AbError, Result};

pub const BLOCK_LEN: usize = 16;

type Enc = cbc::Encryptor<Aes256>;
type Dec = cbc::Decryptor<Aes256>;

/// One-shot helper for the fixed-size master-key blob (80 bytes): small
/// enough that whole-buffer encryption is the natural fit.
pub fn encrypt_whole(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let enc = Enc::new(key.into(), iv.into());
    enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

pub fn decrypt_whole(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let dec = Dec::new(key.into(), iv.into());
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| AbError::WrongPassphrase)
}

/// Wraps a `Write` sink, encrypting bytes as they arrive. `finish()` must be
/// called to flush the final partial block with PKCS#7 padding.
pub struct CbcEncryptWriter<W: Write> {
    inner: W,
    enc: Enc,
    pending: Vec<u8>,
}

impl<W: Write> CbcEncryptWriter<W> {
    pub fn new(inner: W, key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            inner,
            enc: Enc::new(key.into(), iv.into()),
            pending: Vec::with_capacity(BLOCK_LEN),
        }
    }

    fn encrypt_full_blocks(&mut self) -> io::Result<()> {
        while self.pending.len() >= BLOCK_LEN {
            let mut block = [0u8; BLOCK_LEN];
            block.copy_from_slice(&self.pending[..BLOCK_LEN]);
            self.enc.encrypt_block_mut((&mut block).into());
            self.inner.write_all(&block)?;
            self.pending.drain(..BLOCK_LEN);
        }
        Ok(())
    }

    /// Pad the final partial block with PKCS#7 and flush it. Returns the
    /// inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.encrypt_full_blocks()?;
        let pad_len = BLOCK_LEN - self.pending.len();
        self.pending.extend(std::iter::repeat(pad_len as u8).take(pad_len));
        debug_assert_eq!(self.pending.len(), BLOCK_LEN);
        let mut block = [0u8; BLOCK_LEN];
        block.copy_from_slice(&self.pending);
        self.enc.encrypt_block_mut((&mut block).into());
        self.inner.write_all(&block)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CbcEncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.encrypt_full_blocks()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads ciphertext from an inner `Read`, decrypting and unpadding on the
/// fly. Because PKCS#7 padding lives in the final block, the reader holds
/// back one decrypted block until it knows more ciphertext remains, so it
/// can strip padding only from the true last block.
pub struct CbcDecryptReader<R: Read> {
    inner: R,
    dec: Dec,
    held: Vec<u8>,
    out: std::collections::VecDeque<u8>,
    finished: bool,
}

impl<R: Read> CbcDecryptReader<R> {
    pub fn new(inner: R, key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            inner,
            dec: Dec::new(key.into(), iv.into()),
            held: Vec::new(),
            out: std::collections::VecDeque::new(),
            finished: false,
        }
    }

    fn pump(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let mut block = [0u8; BLOCK_LEN];
        let n = read_exact_or_eof(&mut self.inner, &mut block)?;
        if n == 0 {
            if !self.held.is_empty() {
                return Err(AbError::TruncatedBody);
            }
            self.finished = true;
            return Ok(());
        }
        if n != BLOCK_LEN {
            return Err(AbError::TruncatedBody);
        }
        if !self.held.is_empty() {
            self.out.extend(self.held.drain(..));
        }
        let mut decrypted = block;
        self.dec.decrypt_block_mut((&mut decrypted).into());
        self.held = decrypted.to_vec();
        Ok(())
    }

    fn finalize_last_block(&mut self) -> Result<()> {
        if self.held.is_empty() {
            return Ok(());
        }
        let pad_len = *self.held.last().unwrap() as usize;
        if pad_len == 0 || pad_len > BLOCK_LEN || pad_len > self.held.len() {
            return Err(AbError::WrongPassphrase);
        }
        let data_len = self.held.len() - pad_len;
        if self.held[data_len..].iter().any(|&b| b as usize != pad_len) {
            return Err(AbError::WrongPassphrase);
        }
        self.out.extend(self.held[..data_len].iter().copied());
        self.held.clear();
        Ok(())
    }
}

fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

impl<R: Read> Read for CbcDecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.out.is_empty() && !self.finished {
            self.pump().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if self.finished {
                self.finalize_last_block()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            }
        }
        let n = std::cmp::min(buf.len(), self.out.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.out.pop_front().unwrap();
        }
        Ok(n)
    }
}
