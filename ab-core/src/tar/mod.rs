pub mod entry;
pub mod reader;
pub mod writer;

pub use entry::{DecodedEntry, PaxBlock, TarRecord, TypeFlag};
pub use reader::TarReader;
pub use writer::TarWriter;
