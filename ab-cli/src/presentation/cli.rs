use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "abtool", author, version, about = "Android Backup archive tool", long_about = None)]
pub struct Cli {
    /// Print help as Markdown instead of the usual plain-text help.
    #[arg(long, global = true)]
    pub markdown: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// The `-` sentinel means stdin (for inputs) or stdout (for outputs).
pub const STDIO_SENTINEL: &str = "-";

#[derive(Args, Clone)]
pub struct InputAuth {
    /// Passphrase for an encrypted input archive.
    #[arg(short = 'p', long)]
    pub passphrase: Option<String>,
    /// Read the input passphrase from this file, verbatim.
    #[arg(long)]
    pub passfile: Option<PathBuf>,
    /// Accept the decrypted master key even if its checksum doesn't verify.
    #[arg(long)]
    pub ignore_checksum: bool,
}

#[derive(Args, Clone)]
pub struct OutputAuth {
    /// Passphrase to encrypt the output archive with.
    #[arg(long)]
    pub output_passphrase: Option<String>,
    /// Read the output passphrase from this file, verbatim.
    #[arg(long)]
    pub output_passfile: Option<PathBuf>,
    #[arg(long, default_value_t = 64)]
    pub output_salt_bytes: usize,
    #[arg(long, default_value_t = 10000)]
    pub output_iterations: u32,
}

#[derive(Args, Clone)]
pub struct BodyFlags {
    #[arg(short = 'c', long)]
    pub compress: bool,
    #[arg(short = 'd', long)]
    pub decompress: bool,
    #[arg(short = 'k', long = "keep-compression")]
    pub keep_compression: bool,
    #[arg(short = 'e', long)]
    pub encrypt: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List envelope parameters and tar entries.
    #[command(visible_alias = "list")]
    Ls {
        input: PathBuf,
        #[command(flatten)]
        input_auth: InputAuth,
    },

    /// Re-emit an archive with a different compression/encryption combination.
    #[command(visible_aliases = ["strip", "ab2ab"])]
    Rewrap {
        input: PathBuf,
        output: Option<PathBuf>,
        #[command(flatten)]
        input_auth: InputAuth,
        #[command(flatten)]
        output_auth: OutputAuth,
        #[command(flatten)]
        body: BodyFlags,
    },

    /// Split a full-system archive into one-app-per-file archives.
    #[command(visible_alias = "ab2many")]
    Split {
        input: PathBuf,
        #[arg(long)]
        prefix: String,
        #[command(flatten)]
        input_auth: InputAuth,
        #[command(flatten)]
        output_auth: OutputAuth,
        #[command(flatten)]
        body: BodyFlags,
    },

    /// Merge per-app archives back into one full-system archive.
    #[command(visible_alias = "many2ab")]
    Merge {
        inputs: Vec<PathBuf>,
        output: Option<PathBuf>,
        #[command(flatten)]
        input_auth: InputAuth,
        #[command(flatten)]
        output_auth: OutputAuth,
        #[command(flatten)]
        body: BodyFlags,
    },

    /// Strip the envelope entirely, producing a raw tar file.
    #[command(visible_alias = "ab2tar")]
    Unwrap {
        input: PathBuf,
        output: Option<PathBuf>,
        #[command(flatten)]
        input_auth: InputAuth,
    },

    /// Wrap a raw tar file in a fresh Android Backup envelope.
    #[command(visible_alias = "tar2ab")]
    Wrap {
        input: PathBuf,
        output: Option<PathBuf>,
        #[arg(long)]
        output_version: i64,
        #[command(flatten)]
        output_auth: OutputAuth,
        #[command(flatten)]
        body: BodyFlags,
    },
}
