//! Concatenate the tar streams of an ordered list of Android Backup files
//! into one output archive, dropping each input's own terminator.

use std::io::{Read, Write};

use crate::envelope::{WriteEncryptionOptions, open_read, open_write};
use crate::error::{AbError, Result};
use crate::tar::{TarReader, TarWriter};

pub struct MergeOptions {
    pub compress: bool,
    pub encrypt: Option<WriteEncryptionOptions>,
    pub ignore_checksum: bool,
}

/// Merge `inputs` (opened readers plus a passphrase supplier each) into
/// `output`. The output version is taken from the first input; all inputs
/// must agree, or `VersionMismatch` is raised. `options.ignore_checksum` is
/// forwarded to every input's `open_read`, per spec §6's global
/// `--ignore-checksum` flag.
pub fn merge<R, F, W>(inputs: Vec<(R, F)>, output: W, options: &MergeOptions) -> Result<()>
where
    R: Read,
    F: FnOnce() -> Result<String>,
    W: Write,
{
    let mut first_version: Option<i64> = None;
    let mut output_tar: Option<TarWriter<crate::envelope::BodyWriter<W>>> = None;
    let mut output_slot = Some(output);

    for (src, passphrase) in inputs {
        let (descriptor, body) = open_read(src, passphrase, options.ignore_checksum)?;
        match first_version {
            None => {
                first_version = Some(descriptor.version());
                let encrypt = options.encrypt.as_ref().map(|o| WriteEncryptionOptions {
                    passphrase: o.passphrase.clone(),
                    salt_bytes: o.salt_bytes,
                    iterations: o.iterations,
                });
                let output = output_slot.take().expect("output consumed at most once");
                let sink = open_write(output, descriptor.version(), options.compress, encrypt)?;
                output_tar = Some(TarWriter::new(sink));
            }
            Some(expected) if expected != descriptor.version() => {
                return Err(AbError::VersionMismatch { first: expected, other: descriptor.version() });
            }
            Some(_) => {}
        }

        let mut reader = TarReader::new(body);
        let writer = output_tar.as_mut().expect("set on first input");
        while let Some(record) = reader.read_record()? {
            writer.write_record(&record)?;
        }
    }

    let writer = output_tar.ok_or_else(|| AbError::MalformedHeader("merge requires at least one input".into()))?;
    writer.finish()?.finish()?;
    Ok(())
}
