use thiserror::Error;

/// One variant per failure kind in the format/CLI contract. Each carries
/// enough context (offset, path, field name) to print a one-line diagnostic.
#[derive(Error, Debug)]
pub enum AbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic: expected \"ANDROID BACKUP\", got {found:?}")]
    BadMagic { found: String },

    #[error("unsupported version: {version} (supported: 1-5)")]
    UnsupportedVersion { version: i64 },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("corrupted encrypted header: master-key checksum mismatch")]
    CorruptedEncryptedHeader,

    #[error("truncated body: expected more ciphertext/plaintext bytes than were available")]
    TruncatedBody,

    #[error("zlib error: {0}")]
    ZlibError(String),

    #[error("tar checksum error at header offset {offset}")]
    TarChecksumError { offset: u64 },

    #[error("PAX header too large: {size} bytes exceeds the 1 MiB cap")]
    PaxHeaderTooLarge { size: u64 },

    #[error("bad package name: {name:?}")]
    BadPackageName { name: String },

    #[error("version mismatch: inputs disagree ({first} vs {other})")]
    VersionMismatch { first: i64, other: i64 },

    #[error("refusing to overwrite input file: {path}")]
    RefuseOverwrite { path: String },

    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, AbError>;
