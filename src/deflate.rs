//! Block-wise deflate compression with bounded memory.

use crate::errors::Error;
use crate::sink::ByteSink;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::debug;
use std::io::{self, Read, Write};

/// A block size that keeps the resident buffer modest while giving the
/// compressor enough context per block to stay close to whole-input ratios.
pub const RECOMMENDED_BLOCK_SIZE: usize = 1 << 16;

/// What [`deflate_in_blocks`] learned about the stream it produced: exactly
/// the facts a compressed archive entry is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateSummary {
    /// Raw bytes consumed from the source.
    pub uncompressed_size: u64,
    /// Compressed bytes appended to the sink.
    pub compressed_size: u64,
    /// CRC32 of the raw source bytes.
    pub crc32: u32,
}

/// Forwards compressed output into a [`ByteSink`], counting bytes out.
struct SinkWriter<'a, S: ByteSink + ?Sized> {
    sink: &'a mut S,
    written: u64,
}

impl<S: ByteSink + ?Sized> Write for SinkWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.append(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compresses `source` into `sink` one `block_size` chunk at a time.
///
/// A single deflate state is carried across all blocks. Each full block ends
/// with a sync flush, which emits byte-aligned output while leaving the
/// logical stream open; the terminating flush after the source is exhausted
/// closes it. The concatenation of everything appended is one valid raw
/// deflate stream, identical in meaning to a whole-input compression pass.
///
/// At most one block of raw input plus the compressor's fixed internal state
/// is resident at any time, independent of source length. An empty source
/// still produces a minimal valid stream.
pub fn deflate_in_blocks<R, S>(
    mut source: R,
    sink: &mut S,
    block_size: usize,
) -> Result<DeflateSummary, Error>
where
    R: Read,
    S: ByteSink + ?Sized,
{
    if block_size == 0 {
        return Err(Error::invalid_input("block size must be at least 1"));
    }

    let mut crc = crc32fast::Hasher::new();
    let mut uncompressed_size = 0u64;
    let mut blocks = 0u64;

    let mut encoder = DeflateEncoder::new(SinkWriter { sink, written: 0 }, Compression::default());
    let mut block = vec![0u8; block_size];

    loop {
        let filled = fill_block(&mut source, &mut block)?;
        if filled == 0 {
            break;
        }

        crc.update(&block[..filled]);
        uncompressed_size += filled as u64;
        blocks += 1;

        encoder.write_all(&block[..filled]).map_err(Error::io)?;
        if filled < block_size {
            // Final short block: the terminating flush below ends the stream.
            break;
        }

        // Block boundary: byte-align the output without closing the stream.
        encoder.flush().map_err(Error::io)?;
    }

    let writer = encoder.finish().map_err(Error::io)?;
    debug!(
        "deflated {} bytes in {} blocks to {} bytes",
        uncompressed_size, blocks, writer.written
    );

    Ok(DeflateSummary {
        uncompressed_size,
        compressed_size: writer.written,
        crc32: crc.finalize(),
    })
}

/// Reads until `block` is full or the source is exhausted, tolerating short
/// reads and interrupts.
fn fill_block<R: Read>(source: &mut R, block: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < block.len() {
        match source.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::io(err)),
        }
    }
    Ok(filled)
}
