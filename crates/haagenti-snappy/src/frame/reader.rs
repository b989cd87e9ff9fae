//! Framed stream reader.

use std::io::{self, Read};

use haagenti_core::{Algorithm, CompressionStats, Error, Result, StreamConfig};
use tracing::{debug, trace, warn};

use super::{
    ChunkHeader, ChunkType, CHECKSUM_SIZE, CHUNK_HEADER_SIZE, MAX_CHUNK_LEN,
    STREAM_IDENTIFIER_BODY,
};
use crate::block::{decode_into, decoded_len, MAX_BLOCK_SIZE};
use crate::checksum::checksum;
use crate::pool::{BufferPool, PooledBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    ExpectHeader,
    Streaming,
    Failed,
}

impl ReaderState {
    fn name(self) -> &'static str {
        match self {
            ReaderState::ExpectHeader => "expect_header",
            ReaderState::Streaming => "streaming",
            ReaderState::Failed => "failed",
        }
    }
}

/// A reader that decompresses the framing format.
///
/// Chunks are pulled from the source one at a time; each data chunk is
/// decoded into an internal block buffer and verified before any of its
/// bytes are handed out. The stream ends cleanly when the source ends on a
/// chunk boundary.
///
/// Errors are terminal: once a read fails, every later read fails with
/// [`Error::InvalidState`] and the source is left alone.
pub struct FrameReader<R: Read> {
    inner: R,
    state: ReaderState,
    scratch: PooledBuffer,
    decoded: PooledBuffer,
    pos: usize,
    end: usize,
    verify_checksum: bool,
    stats: CompressionStats,
}

impl<R: Read> FrameReader<R> {
    /// Create a reader with the default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, StreamConfig::default())
    }

    /// Create a reader with the given configuration.
    pub fn with_config(inner: R, config: StreamConfig) -> Self {
        Self::with_pool(inner, config, BufferPool::shared())
    }

    /// Create a reader borrowing its buffers from `pool`.
    pub fn with_pool(inner: R, config: StreamConfig, pool: &BufferPool) -> Self {
        FrameReader {
            inner,
            state: ReaderState::ExpectHeader,
            scratch: pool.acquire(MAX_CHUNK_LEN),
            decoded: pool.acquire(MAX_BLOCK_SIZE),
            pos: 0,
            end: 0,
            verify_checksum: config.verify_checksum,
            stats: CompressionStats::new(Algorithm::Snappy),
        }
    }

    /// Get a reference to the source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Get a mutable reference to the source.
    ///
    /// Reading from it directly desynchronizes the stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Statistics for the stream so far.
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Whether a previous read failed.
    pub fn is_failed(&self) -> bool {
        self.state == ReaderState::Failed
    }

    /// Read and process one chunk. Returns `false` at end of stream.
    fn next_chunk(&mut self) -> Result<bool> {
        let mut raw_header = [0u8; CHUNK_HEADER_SIZE];
        let n = read_full(&mut self.inner, &mut raw_header)?;
        if n == 0 {
            debug!(
                decoded = self.stats.original_size,
                consumed = self.stats.compressed_size,
                "end of frame stream"
            );
            return Ok(false);
        }
        if n < CHUNK_HEADER_SIZE {
            return Err(Error::corrupted(format!(
                "truncated chunk header: {} of {} bytes",
                n, CHUNK_HEADER_SIZE
            )));
        }
        self.stats.compressed_size += CHUNK_HEADER_SIZE;

        let header = ChunkHeader::parse(raw_header);
        if header.length > self.scratch.len() {
            return Err(Error::unsupported(format!(
                "chunk length {} exceeds {}",
                header.length,
                self.scratch.len()
            )));
        }
        if self.state == ReaderState::ExpectHeader
            && header.chunk_type != ChunkType::StreamIdentifier
        {
            return Err(Error::corrupted(
                "stream does not start with a stream identifier",
            ));
        }

        match header.chunk_type {
            ChunkType::StreamIdentifier => {
                if header.length != STREAM_IDENTIFIER_BODY.len() {
                    return Err(Error::corrupted(format!(
                        "stream identifier length {}",
                        header.length
                    )));
                }
                self.read_payload(header.length)?;
                if &self.scratch[..header.length] != STREAM_IDENTIFIER_BODY {
                    return Err(Error::corrupted("bad stream identifier"));
                }
                trace!("stream identifier");
                self.state = ReaderState::Streaming;
            }
            ChunkType::CompressedData | ChunkType::UncompressedData => {
                if header.length < CHECKSUM_SIZE {
                    return Err(Error::corrupted(format!(
                        "data chunk length {} too short for checksum",
                        header.length
                    )));
                }
                self.read_payload(header.length)?;
                self.load_block(header)?;
            }
            ChunkType::Padding | ChunkType::Skippable(_) => {
                self.read_payload(header.length)?;
                self.stats.chunks_skipped += 1;
                trace!(
                    chunk_type = header.chunk_type.to_byte(),
                    len = header.length,
                    "skipped chunk"
                );
            }
            ChunkType::Reserved(byte) => {
                return Err(Error::unsupported(format!(
                    "reserved unskippable chunk type {:#04x}",
                    byte
                )));
            }
        }
        Ok(true)
    }

    /// Fill `scratch[..len]` from the source.
    fn read_payload(&mut self, len: usize) -> Result<()> {
        let n = read_full(&mut self.inner, &mut self.scratch[..len])?;
        if n < len {
            return Err(Error::unexpected_eof(n));
        }
        self.stats.compressed_size += len;
        Ok(())
    }

    /// Decode the data chunk sitting in `scratch` into `decoded`.
    fn load_block(&mut self, header: ChunkHeader) -> Result<()> {
        let expected = u32::from_le_bytes([
            self.scratch[0],
            self.scratch[1],
            self.scratch[2],
            self.scratch[3],
        ]);
        let body = &self.scratch[CHECKSUM_SIZE..header.length];

        let len = if header.chunk_type == ChunkType::CompressedData {
            let len = decoded_len(body)?;
            if len > MAX_BLOCK_SIZE {
                return Err(Error::corrupted(format!(
                    "decoded block of {} bytes exceeds {}",
                    len, MAX_BLOCK_SIZE
                )));
            }
            decode_into(body, &mut self.decoded[..len])?
        } else {
            if body.len() > MAX_BLOCK_SIZE {
                return Err(Error::corrupted(format!(
                    "stored block of {} bytes exceeds {}",
                    body.len(),
                    MAX_BLOCK_SIZE
                )));
            }
            self.decoded[..body.len()].copy_from_slice(body);
            body.len()
        };

        if self.verify_checksum {
            let actual = checksum(&self.decoded[..len]);
            if actual != expected {
                return Err(Error::checksum_mismatch(expected, actual));
            }
        }

        trace!(
            chunk_type = header.chunk_type.to_byte(),
            raw = len,
            "decoded data chunk"
        );

        self.pos = 0;
        self.end = len;
        self.stats.original_size += len;
        self.stats.blocks_processed += 1;
        if header.chunk_type == ChunkType::UncompressedData {
            self.stats.blocks_stored += 1;
        }
        Ok(())
    }
}

impl<R: Read> Read for FrameReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == ReaderState::Failed {
            return Err(Error::InvalidState {
                expected: ReaderState::Streaming.name(),
                actual: ReaderState::Failed.name(),
            }
            .into());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.end {
                let n = buf.len().min(self.end - self.pos);
                buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            match self.next_chunk() {
                Ok(true) => {}
                Ok(false) => return Ok(0),
                Err(e) => {
                    warn!(error = %e, state = self.state.name(), "frame stream failed");
                    self.state = ReaderState::Failed;
                    return Err(e.into());
                }
            }
        }
    }
}

/// Read until `buf` is full or the source ends, retrying interrupted reads.
fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
