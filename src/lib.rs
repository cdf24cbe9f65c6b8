#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]
#![forbid(unsafe_code)]

mod deflate;
mod errors;
mod header;
mod mode;
mod sink;
pub mod time;
mod writer;

pub use deflate::{deflate_in_blocks, DeflateSummary, RECOMMENDED_BLOCK_SIZE};
pub use errors::{Error, ErrorKind};
pub use header::{
    DataDescriptor, EndOfCentralDirectoryFixed, ZipCentralFileHeaderFixed, ZipLocalFileHeaderFixed,
};
pub use sink::{ByteSink, WriteSink};
pub use writer::{ArchiveWriter, EntryOptions};

/// Compute the CRC32 (IEEE) of a byte slice.
///
/// Convenient for callers declaring a stored entry whose body is already in
/// memory. For data that arrives in pieces, stream it through an entry
/// opened with [`ArchiveWriter::open_streaming_entry`] instead and let the
/// writer accumulate the checksum.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
