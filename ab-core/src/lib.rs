#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;

pub mod crypto {
    pub mod aes_cbc;
    pub mod hex;
    pub mod kdf;
}

pub mod envelope;
pub mod tar;

pub mod splitter;
pub mod merger;
pub mod rewrap;
pub mod listing;

pub use error::{AbError, Result};

pub use envelope::{BodyReader, BodyWriter, EncryptionParams, EnvelopeDescriptor, WriteEncryptionOptions, open_read, open_write};
pub use merger::{MergeOptions, merge};
pub use rewrap::{CompressionMode, rewrap};
pub use splitter::{SinkFactory, SplitOptions, group_filename, split};
pub use tar::{DecodedEntry, PaxBlock, TarReader, TarRecord, TarWriter, TypeFlag};

pub use listing::render_listing;

pub mod prelude {
    pub use crate::Result;
    pub use crate::envelope::{EnvelopeDescriptor, WriteEncryptionOptions, open_read, open_write};
    pub use crate::listing::render_listing;
    pub use crate::merger::{MergeOptions, merge};
    pub use crate::rewrap::{CompressionMode, rewrap};
    pub use crate::splitter::{SinkFactory, SplitOptions, split};
    pub use crate::tar::{TarReader, TarRecord, TarWriter};
}
