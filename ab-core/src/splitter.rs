//! Group a tar entry stream into per-app sub-archives using app-boundary
//! detection, driving a caller-supplied envelope factory per group.

use std::io::{Read, Write};

use crate::envelope::{BodyWriter, WriteEncryptionOptions, open_write};
use crate::error::{AbError, Result};
use crate::tar::{TarReader, TarRecord, TarWriter};

/// Compression/encryption choices for every per-app output, supplied once
/// by the caller and applied identically to each group.
pub struct SplitOptions {
    pub version: i64,
    pub compress: bool,
    pub encrypt: Option<WriteEncryptionOptions>,
}

/// Opens a new output sink for the given zero-padded group index and
/// package name (empty for the preamble group).
pub trait SinkFactory {
    type Sink: Write;
    fn open(&mut self, group_index: u32, package: &str) -> Result<Self::Sink>;
}

fn validate_package_name(name: &str) -> Result<()> {
    if name.contains("..") || name.contains('/') {
        return Err(AbError::BadPackageName { name: name.to_string() });
    }
    Ok(())
}

/// Matches `apps/<package>/_manifest` and returns the captured package, or
/// `None` if the name isn't a manifest marker.
fn manifest_package(name: &str) -> Option<&str> {
    let rest = name.strip_prefix("apps/")?;
    let pkg = rest.strip_suffix("/_manifest")?;
    Some(pkg)
}

struct CurrentGroup<W: Write> {
    index: u32,
    package: String,
    tar: TarWriter<BodyWriter<W>>,
}

/// Split `tar_reader`'s entries into one output archive per app group,
/// opening each sink via `factory`. Returns the number of groups written.
pub fn split<R: Read, F: SinkFactory>(
    mut tar_reader: TarReader<R>,
    factory: &mut F,
    options: &SplitOptions,
) -> Result<u32> {
    let mut next_index: u32 = 0;
    let mut current: Option<CurrentGroup<F::Sink>> = None;

    let open_group = |factory: &mut F, index: u32, package: &str, options: &SplitOptions| -> Result<CurrentGroup<F::Sink>> {
        let sink = factory.open(index, package)?;
        let encrypt = options.encrypt.as_ref().map(|o| WriteEncryptionOptions {
            passphrase: o.passphrase.clone(),
            salt_bytes: o.salt_bytes,
            iterations: o.iterations,
        });
        let body = open_write(sink, options.version, options.compress, encrypt)?;
        Ok(CurrentGroup { index, package: package.to_string(), tar: TarWriter::new(body) })
    };

    while let Some(record) = tar_reader.read_record()? {
        if let Some(captured) = manifest_package(&record.decoded.name) {
            validate_package_name(captured)?;
            let boundary_is_new = match &current {
                None => true,
                Some(group) => group.package != captured,
            };
            if boundary_is_new {
                if let Some(group) = current.take() {
                    group.tar.finish()?.finish()?;
                }
                let opened = open_group(factory, next_index, captured, options)?;
                next_index += 1;
                current = Some(opened);
            }
        }

        if current.is_none() {
            let opened = open_group(factory, next_index, "", options)?;
            next_index += 1;
            current = Some(opened);
        }

        current.as_mut().unwrap().tar.write_record(&record)?;
    }

    if let Some(group) = current.take() {
        group.tar.finish()?.finish()?;
    } else {
        // Zero-entry archive: still produce exactly one (empty) output.
        let opened = open_group(factory, next_index, "", options)?;
        next_index += 1;
        opened.tar.finish()?.finish()?;
    }

    Ok(next_index)
}

/// Renders the `<prefix>_<NNN>_<package>.ab` filename convention used by
/// the default [`SinkFactory`] the driver wires up.
pub fn group_filename(prefix: &str, group_index: u32, package: &str) -> String {
    format!("{prefix}_{group_index:03}_{package}.ab")
}
