use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ab_core::envelope::WriteEncryptionOptions;
use ab_core::error::{AbError, Result};
use ab_core::rewrap::CompressionMode;
use ab_core::splitter::{SinkFactory, SplitOptions, group_filename};
use ab_core::tar::TarReader;
use ab_core::{MergeOptions, listing, merge, open_read, open_write, rewrap, split};

use crate::presentation::cli::{BodyFlags, InputAuth, OutputAuth, STDIO_SENTINEL};

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some(STDIO_SENTINEL)
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_stdio(path) {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(File::open(path)?))
    }
}

fn refuse_if_same_file(input: &Path, output: &Path) -> Result<()> {
    if is_stdio(input) || is_stdio(output) {
        return Ok(());
    }
    let same = match (std::fs::canonicalize(input), std::fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    };
    if same {
        return Err(AbError::RefuseOverwrite { path: output.display().to_string() });
    }
    Ok(())
}

fn open_output(path: &Path, input: &Path) -> Result<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdout()));
    }
    refuse_if_same_file(input, path)?;
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}

fn strip_ab_suffix(input: &Path) -> String {
    let name = input.to_string_lossy().into_owned();
    name.strip_suffix(".ab")
        .or_else(|| name.strip_suffix(".adb"))
        .unwrap_or(&name)
        .to_string()
}

fn sibling_passphrase_path(input: &Path) -> PathBuf {
    PathBuf::from(format!("{}.passphrase.txt", strip_ab_suffix(input)))
}

/// Passphrase resolution order (spec §6): explicit flag, then passfile,
/// then a sibling `<input>.passphrase.txt`, then an interactive prompt.
/// True TTY masking is out of scope (spec §1 non-goal); the fallback here
/// reads one line from stdin.
fn resolve_passphrase(explicit: Option<String>, passfile: Option<PathBuf>, sibling_of: Option<&Path>) -> Result<String> {
    if let Some(p) = explicit {
        return Ok(p);
    }
    if let Some(path) = passfile {
        return Ok(std::fs::read_to_string(path)?);
    }
    if let Some(input) = sibling_of {
        let sibling = sibling_passphrase_path(input);
        if sibling.exists() {
            return Ok(std::fs::read_to_string(sibling)?);
        }
    }
    eprint!("passphrase: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}

fn input_passphrase_provider(input: PathBuf, auth: InputAuth) -> impl FnOnce() -> Result<String> {
    move || resolve_passphrase(auth.passphrase, auth.passfile, Some(&input))
}

fn output_encrypt_options(body: &BodyFlags, auth: &OutputAuth) -> Result<Option<WriteEncryptionOptions>> {
    if !body.encrypt {
        return Ok(None);
    }
    let passphrase = resolve_passphrase(auth.output_passphrase.clone(), auth.output_passfile.clone(), None)?;
    Ok(Some(WriteEncryptionOptions {
        passphrase,
        salt_bytes: auth.output_salt_bytes,
        iterations: auth.output_iterations,
    }))
}

/// `rewrap`'s no-flag default is `Decompress`, not `Keep`: the `strip`
/// alias (spec §8 scenario S3) names the same `Commands::Rewrap` variant as
/// plain `rewrap` with no way to tell which name invoked it, and "stripped"
/// means both encryption and compression removed. `-k/--keep-compression`
/// stays available for callers who want the old behavior explicitly.
fn compression_mode(body: &BodyFlags) -> CompressionMode {
    if body.keep_compression {
        CompressionMode::Keep
    } else if body.compress {
        CompressionMode::Compress
    } else {
        CompressionMode::Decompress
    }
}

pub fn handle_ls(input: PathBuf, input_auth: InputAuth) -> Result<()> {
    let src = open_input(&input)?;
    let ignore_checksum = input_auth.ignore_checksum;
    let provider = input_passphrase_provider(input, input_auth);
    let report = listing::render_listing(src, provider, ignore_checksum)?;
    print!("{report}");
    Ok(())
}

pub fn handle_rewrap(
    input: PathBuf,
    output: Option<PathBuf>,
    input_auth: InputAuth,
    output_auth: OutputAuth,
    body: BodyFlags,
) -> Result<()> {
    let output_path = output.unwrap_or_else(|| {
        if is_stdio(&input) {
            PathBuf::from(STDIO_SENTINEL)
        } else {
            PathBuf::from(format!("{}.stripped.ab", strip_ab_suffix(&input)))
        }
    });
    let src = open_input(&input)?;
    let dst = open_output(&output_path, &input)?;
    let mode = compression_mode(&body);
    let encrypt = output_encrypt_options(&body, &output_auth)?;
    let ignore_checksum = input_auth.ignore_checksum;
    let provider = input_passphrase_provider(input, input_auth);
    rewrap(src, provider, ignore_checksum, mode, encrypt, dst)
}

struct FileSinkFactory {
    prefix: String,
    dir: PathBuf,
}

impl SinkFactory for FileSinkFactory {
    type Sink = BufWriter<File>;
    fn open(&mut self, group_index: u32, package: &str) -> Result<Self::Sink> {
        let name = group_filename(&self.prefix, group_index, package);
        let path = self.dir.join(name);
        Ok(BufWriter::new(File::create(path)?))
    }
}

pub fn handle_split(input: PathBuf, prefix: String, input_auth: InputAuth, output_auth: OutputAuth, body: BodyFlags) -> Result<()> {
    let src = open_input(&input)?;
    let ignore_checksum = input_auth.ignore_checksum;
    let encrypt = output_encrypt_options(&body, &output_auth)?;
    let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
    let provider = input_passphrase_provider(input.clone(), input_auth);
    let (descriptor, tar_bytes) = open_read(src, provider, ignore_checksum)?;
    let tar_reader = TarReader::new(tar_bytes);
    let mut factory = FileSinkFactory { prefix, dir };
    let options = SplitOptions { version: descriptor.version(), compress: body.compress, encrypt };
    split(tar_reader, &mut factory, &options)?;
    Ok(())
}

pub fn handle_merge(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    input_auth: InputAuth,
    output_auth: OutputAuth,
    body: BodyFlags,
) -> Result<()> {
    let output_path = output.unwrap_or_else(|| PathBuf::from(STDIO_SENTINEL));
    let ignore_checksum = input_auth.ignore_checksum;
    let opened: Vec<(Box<dyn Read>, Box<dyn FnOnce() -> Result<String>>)> = inputs
        .into_iter()
        .map(|path| -> Result<(Box<dyn Read>, Box<dyn FnOnce() -> Result<String>>)> {
            let src = open_input(&path)?;
            let auth = input_auth.clone();
            let provider: Box<dyn FnOnce() -> Result<String>> = Box::new(move || resolve_passphrase(auth.passphrase, auth.passfile, Some(&path)));
            Ok((src, provider))
        })
        .collect::<Result<_>>()?;

    let dst = open_output(&output_path, Path::new(""))?;
    let encrypt = output_encrypt_options(&body, &output_auth)?;
    let options = MergeOptions { compress: body.compress, encrypt, ignore_checksum };
    merge(opened, dst, &options)
}

pub fn handle_unwrap(input: PathBuf, output: Option<PathBuf>, input_auth: InputAuth) -> Result<()> {
    let output_path = output.unwrap_or_else(|| {
        if is_stdio(&input) {
            PathBuf::from(STDIO_SENTINEL)
        } else {
            PathBuf::from(format!("{}.tar", strip_ab_suffix(&input)))
        }
    });
    let src = open_input(&input)?;
    let mut dst = open_output(&output_path, &input)?;
    let ignore_checksum = input_auth.ignore_checksum;
    let provider = input_passphrase_provider(input, input_auth);
    let (_, mut tar_bytes) = open_read(src, provider, ignore_checksum)?;
    io::copy(&mut tar_bytes, &mut dst)?;
    Ok(())
}

pub fn handle_wrap(input: PathBuf, output: Option<PathBuf>, output_version: i64, output_auth: OutputAuth, body: BodyFlags) -> Result<()> {
    let output_path = output.unwrap_or_else(|| {
        if is_stdio(&input) {
            PathBuf::from(STDIO_SENTINEL)
        } else {
            PathBuf::from(format!("{}.ab", strip_ab_suffix(&input)))
        }
    });
    let mut src = open_input(&input)?;
    let dst = open_output(&output_path, &input)?;
    let encrypt = output_encrypt_options(&body, &output_auth)?;
    let mut sink = open_write(dst, output_version, body.compress, encrypt)?;
    io::copy(&mut src, &mut sink)?;
    sink.finish()?;
    Ok(())
}
