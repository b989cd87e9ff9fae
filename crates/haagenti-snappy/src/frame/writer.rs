//! Framed stream writer.

use std::io::{self, Write};
use std::mem::ManuallyDrop;

use haagenti_core::{Algorithm, CompressionStats, Error, StreamConfig};
use tracing::{debug, trace, warn};

use super::{
    ChunkHeader, ChunkType, CHECKSUM_SIZE, CHUNK_HEADER_SIZE, MAGIC_CHUNK, OBUF_HEADER_LEN,
    OBUF_LEN,
};
use crate::block::{encode_into, MAX_BLOCK_SIZE};
use crate::checksum::checksum;
use crate::pool::{BufferPool, PooledBuffer};

/// Offset of the data chunk header inside the staging buffer.
const CHUNK_START: usize = MAGIC_CHUNK.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    NoHeaderWritten,
    HeaderWritten,
    Failed,
}

/// Turns raw blocks into chunks.
///
/// The staging buffer is laid out as
/// `[stream identifier | chunk header | checksum | compressed block]` so a
/// chunk (and, the first time, the identifier in front of it) goes to the
/// sink in a single write.
///
/// Any sink error is terminal: the sink may hold a torn chunk, so nothing
/// more is written after it.
struct ChunkEncoder {
    obuf: PooledBuffer,
    state: WriterState,
    stats: CompressionStats,
}

impl ChunkEncoder {
    fn new(obuf: PooledBuffer) -> Self {
        ChunkEncoder {
            obuf,
            state: WriterState::NoHeaderWritten,
            stats: CompressionStats::new(Algorithm::Snappy),
        }
    }

    fn is_failed(&self) -> bool {
        self.state == WriterState::Failed
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_failed() {
            return Err(Error::InvalidState {
                expected: "open",
                actual: "failed",
            }
            .into());
        }
        Ok(())
    }

    fn write_block<W: Write>(&mut self, sink: &mut W, block: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        let result = self.emit_chunk(sink, block);
        if let Err(e) = &result {
            warn!(error = %e, "frame writer failed");
            self.state = WriterState::Failed;
        }
        result
    }

    fn flush_sink<W: Write>(&mut self, sink: &mut W) -> io::Result<()> {
        self.ensure_open()?;
        let result = sink.flush();
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn emit_chunk<W: Write>(&mut self, sink: &mut W, block: &[u8]) -> io::Result<()> {
        debug_assert!(!block.is_empty() && block.len() <= MAX_BLOCK_SIZE);

        let crc = checksum(block);
        let compressed_len = encode_into(block, &mut self.obuf[OBUF_HEADER_LEN..])?;

        // Compression must save at least 12.5% to be worth decoding.
        let stored = compressed_len >= block.len() - block.len() / 8;
        let (chunk_type, body_len) = if stored {
            (ChunkType::UncompressedData, block.len())
        } else {
            (ChunkType::CompressedData, compressed_len)
        };

        let header = ChunkHeader::new(chunk_type, CHECKSUM_SIZE + body_len)?;
        let crc_start = CHUNK_START + CHUNK_HEADER_SIZE;
        self.obuf[CHUNK_START..crc_start].copy_from_slice(&header.encode());
        self.obuf[crc_start..OBUF_HEADER_LEN].copy_from_slice(&crc.to_le_bytes());

        let start = if self.state == WriterState::NoHeaderWritten {
            debug!("writing stream identifier");
            self.obuf[..CHUNK_START].copy_from_slice(&MAGIC_CHUNK);
            0
        } else {
            CHUNK_START
        };

        let emitted = if stored {
            sink.write_all(&self.obuf[start..OBUF_HEADER_LEN])?;
            sink.write_all(block)?;
            OBUF_HEADER_LEN - start + block.len()
        } else {
            let end = OBUF_HEADER_LEN + compressed_len;
            sink.write_all(&self.obuf[start..end])?;
            end - start
        };
        self.state = WriterState::HeaderWritten;

        trace!(
            raw = block.len(),
            chunk = header.length,
            stored,
            "wrote data chunk"
        );

        self.stats.original_size += block.len();
        self.stats.compressed_size += emitted;
        self.stats.blocks_processed += 1;
        if stored {
            self.stats.blocks_stored += 1;
        }
        Ok(())
    }
}

/// A writer that compresses into the framing format.
///
/// Bytes are buffered until a full block is available, then written as one
/// chunk. Call [`flush`](Write::flush) to emit a partial block and
/// [`finish`](FrameWriter::finish) to end the stream and recover the sink.
/// Dropping an unfinished writer flushes on a best-effort basis and ignores
/// errors.
///
/// A writer that never receives any bytes produces no output at all. After
/// the sink fails once, every later write or flush fails with
/// [`Error::InvalidState`] and nothing else reaches the sink.
pub struct FrameWriter<W: Write> {
    inner: ManuallyDrop<W>,
    ibuf: PooledBuffer,
    ibuf_len: usize,
    block_size: usize,
    encoder: ChunkEncoder,
    finished: bool,
}

impl<W: Write> FrameWriter<W> {
    /// Create a writer with the default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, StreamConfig::default())
    }

    /// Create a writer with the given configuration.
    pub fn with_config(inner: W, config: StreamConfig) -> Self {
        Self::with_pool(inner, config, BufferPool::shared())
    }

    /// Create a writer borrowing its buffers from `pool`.
    pub fn with_pool(inner: W, config: StreamConfig, pool: &BufferPool) -> Self {
        let block_size = config.block_size_within(MAX_BLOCK_SIZE);
        FrameWriter {
            inner: ManuallyDrop::new(inner),
            ibuf: pool.acquire(block_size),
            ibuf_len: 0,
            block_size,
            encoder: ChunkEncoder::new(pool.acquire(OBUF_LEN)),
            finished: false,
        }
    }

    /// Get a reference to the sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Get a mutable reference to the sink.
    ///
    /// Writing to it directly corrupts the stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Block size in use.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes buffered but not yet written as a chunk.
    pub fn buffered(&self) -> usize {
        self.ibuf_len
    }

    /// Whether a previous write or flush failed.
    pub fn is_failed(&self) -> bool {
        self.encoder.is_failed()
    }

    /// Statistics for the stream so far.
    pub fn stats(&self) -> &CompressionStats {
        &self.encoder.stats
    }

    /// Flush any buffered bytes, flush the sink, and return it.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush()?;
        debug!(
            raw = self.encoder.stats.original_size,
            emitted = self.encoder.stats.compressed_size,
            "finished frame stream"
        );
        self.finished = true;
        // Safety: `finished` stops Drop from touching `inner` again
        Ok(unsafe { ManuallyDrop::take(&mut self.inner) })
    }

    /// Write the buffered bytes as one block.
    fn flush_buffer(&mut self) -> io::Result<()> {
        let len = std::mem::take(&mut self.ibuf_len);
        if len == 0 {
            return Ok(());
        }
        self.encoder.write_block(&mut *self.inner, &self.ibuf[..len])
    }
}

impl<W: Write> Write for FrameWriter<W> {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        self.encoder.ensure_open()?;
        let total = buf.len();

        while buf.len() > self.block_size - self.ibuf_len {
            if self.ibuf_len == 0 {
                // Nothing buffered: chunk whole blocks straight from the
                // caller's slice.
                let whole = buf.len() - buf.len() % self.block_size;
                for block in buf[..whole].chunks(self.block_size) {
                    self.encoder.write_block(&mut *self.inner, block)?;
                }
                buf = &buf[whole..];
            } else {
                let n = self.block_size - self.ibuf_len;
                self.ibuf[self.ibuf_len..self.block_size].copy_from_slice(&buf[..n]);
                self.ibuf_len = self.block_size;
                buf = &buf[n..];
                self.flush_buffer()?;
            }
        }

        self.ibuf[self.ibuf_len..self.ibuf_len + buf.len()].copy_from_slice(buf);
        self.ibuf_len += buf.len();
        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.encoder.flush_sink(&mut *self.inner)
    }
}

impl<W: Write> Drop for FrameWriter<W> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if !self.encoder.is_failed() {
            if let Err(e) = self.flush() {
                warn!(error = %e, "frame writer dropped with unflushed data");
            }
        }
        // Safety: not finished, so `inner` is still ours to drop
        unsafe { ManuallyDrop::drop(&mut self.inner) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::decode;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Split a stream into `(type, payload)` pairs.
    fn chunks(stream: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < stream.len() {
            let header = ChunkHeader::parse(stream[pos..pos + 4].try_into().unwrap());
            let payload = stream[pos + 4..pos + 4 + header.length].to_vec();
            out.push((header.chunk_type.to_byte(), payload));
            pos += 4 + header.length;
        }
        out
    }

    /// Raw bytes carried by a data chunk payload.
    fn raw_of(chunk_type: u8, payload: &[u8]) -> Vec<u8> {
        let raw = match chunk_type {
            0x00 => decode(&payload[4..]).unwrap(),
            0x01 => payload[4..].to_vec(),
            other => panic!("not a data chunk: {other:#x}"),
        };
        let crc = u32::from_le_bytes(payload[..4].try_into().unwrap());
        assert_eq!(crc, checksum(&raw));
        raw
    }

    fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        data
    }

    #[test]
    fn test_empty_stream() {
        let writer = FrameWriter::new(Vec::new());
        let out = writer.finish().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_stream_identifier() {
        let mut writer = FrameWriter::with_config(
            Vec::new(),
            StreamConfig::default().with_block_size(64),
        );
        for i in 0..50u8 {
            writer.write_all(&[i; 37]).unwrap();
            writer.flush().unwrap();
        }
        let out = writer.finish().unwrap();

        assert_eq!(&out[..10], &MAGIC_CHUNK);
        let parsed = chunks(&out);
        let identifiers = parsed.iter().filter(|(t, _)| *t == 0xff).count();
        assert_eq!(identifiers, 1);
        assert_eq!(parsed[0].0, 0xff);
        assert!(parsed[1..].iter().all(|(t, _)| *t == 0x00 || *t == 0x01));
    }

    #[test]
    fn test_random_data_stored() {
        let data = random_bytes(10_000, 7);
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_all(&data).unwrap();
        let out = writer.finish().unwrap();

        assert_eq!(out[10], 0x01);
        let parsed = chunks(&out);
        assert_eq!(parsed.len(), 2);
        assert_eq!(raw_of(parsed[1].0, &parsed[1].1), data);
    }

    #[test]
    fn test_repetitive_data_compressed() {
        let data = b"abcdefgh".repeat(2000);
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_all(&data).unwrap();
        let stats = writer.stats().clone();
        assert_eq!(stats.blocks_processed, 0);

        let out = writer.finish().unwrap();
        assert_eq!(out[10], 0x00);
        assert!(out.len() < data.len() / 4);

        let parsed = chunks(&out);
        assert_eq!(raw_of(parsed[1].0, &parsed[1].1), data);
    }

    #[test]
    fn test_flush_emits_partial_block() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_all(b"hello").unwrap();
        assert_eq!(writer.buffered(), 5);
        writer.flush().unwrap();
        assert_eq!(writer.buffered(), 0);

        let out = writer.finish().unwrap();
        let parsed = chunks(&out);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].0, 0x01);
        assert_eq!(raw_of(parsed[1].0, &parsed[1].1), b"hello");
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.flush().unwrap();
        writer.write_all(&[]).unwrap();
        assert!(writer.finish().unwrap().is_empty());
    }

    #[test]
    fn test_block_size_respected() {
        let data = random_bytes(5000, 11);
        let mut writer = FrameWriter::with_config(
            Vec::new(),
            StreamConfig::default().with_block_size(1000),
        );
        assert_eq!(writer.block_size(), 1000);
        for piece in data.chunks(333) {
            writer.write_all(piece).unwrap();
        }
        let out = writer.finish().unwrap();

        let parsed = chunks(&out);
        assert_eq!(parsed.len(), 6);
        let mut rebuilt = Vec::new();
        for (t, payload) in &parsed[1..] {
            let raw = raw_of(*t, payload);
            assert_eq!(raw.len(), 1000);
            rebuilt.extend_from_slice(&raw);
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_block_size_clamped() {
        let writer = FrameWriter::with_config(
            Vec::new(),
            StreamConfig::default().with_block_size(1 << 20),
        );
        assert_eq!(writer.block_size(), MAX_BLOCK_SIZE);
    }

    #[test]
    fn test_large_write_chunks_directly() {
        let data = random_bytes(200_000, 3);
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_all(&data).unwrap();

        // Three whole blocks go straight out; the tail stays buffered.
        assert_eq!(writer.stats().blocks_processed, 3);
        assert_eq!(writer.buffered(), 200_000 - 3 * MAX_BLOCK_SIZE);

        let out = writer.finish().unwrap();
        let parsed = chunks(&out);
        assert_eq!(parsed.len(), 5);
        let rebuilt: Vec<u8> = parsed[1..]
            .iter()
            .flat_map(|(t, p)| raw_of(*t, p))
            .collect();
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_stats() {
        let data = b"0123456789".repeat(10_000);
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_all(&data).unwrap();
        writer.write_all(&random_bytes(100, 1)).unwrap();
        writer.flush().unwrap();

        let stats = writer.stats().clone();
        let out = writer.finish().unwrap();

        assert_eq!(stats.algorithm, Some(Algorithm::Snappy));
        assert_eq!(stats.original_size, data.len() + 100);
        assert_eq!(stats.compressed_size, out.len());
        assert_eq!(stats.blocks_processed, 2);
        assert_eq!(stats.blocks_stored, 0);
        assert!(stats.ratio().is_effective());
    }

    #[test]
    fn test_drop_flushes() {
        let mut out = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut out);
            writer.write_all(b"dropped but not lost").unwrap();
        }
        let parsed = chunks(&out);
        assert_eq!(parsed.len(), 2);
        assert_eq!(raw_of(parsed[1].0, &parsed[1].1), b"dropped but not lost");
    }

    #[test]
    fn test_buffers_returned_to_pool() {
        let pool = BufferPool::new();
        {
            let mut writer = FrameWriter::with_pool(Vec::new(), StreamConfig::default(), &pool);
            writer.write_all(b"pooled").unwrap();
            assert_eq!(pool.retained(), 0);
            writer.finish().unwrap();
        }
        assert_eq!(pool.retained(), 2);
    }

    #[test]
    fn test_sink_error_propagates() {
        struct FailingSink;

        impl Write for FailingSink {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let pool = BufferPool::new();
        let mut writer = FrameWriter::with_pool(FailingSink, StreamConfig::default(), &pool);
        writer.write_all(b"never arrives").unwrap();
        let err = writer.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        assert!(writer.is_failed());

        drop(writer);
        assert_eq!(pool.retained(), 2);
    }

    /// Accepts `budget` bytes, fails once, then accepts everything.
    struct TornSink<'a> {
        out: &'a mut Vec<u8>,
        budget: usize,
        tripped: bool,
    }

    impl Write for TornSink<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.tripped && self.out.len() + buf.len() > self.budget {
                let n = self.budget - self.out.len();
                if n == 0 {
                    self.tripped = true;
                    return Err(io::ErrorKind::TimedOut.into());
                }
                self.out.extend_from_slice(&buf[..n]);
                return Ok(n);
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_terminal() {
        let mut out = Vec::new();
        {
            let sink = TornSink {
                out: &mut out,
                budget: 12,
                tripped: false,
            };
            let mut writer = FrameWriter::new(sink);
            writer.write_all(&random_bytes(100, 8)).unwrap();

            let err = writer.flush().unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::TimedOut);
            assert!(writer.is_failed());

            // The sink works again, but the stream is already torn.
            let err = writer.write(b"more").unwrap_err();
            assert!(matches!(
                Error::from_io(&err),
                Some(Error::InvalidState { .. })
            ));
            let err = writer.flush().unwrap_err();
            assert!(matches!(
                Error::from_io(&err),
                Some(Error::InvalidState { .. })
            ));
            assert!(writer.finish().is_err());
        }

        // Nothing after the torn chunk, not even from the drop flush.
        assert_eq!(out.len(), 12);
        assert_eq!(&out[..10], &MAGIC_CHUNK);
    }

    #[test]
    fn test_failed_writer_skips_drop_flush() {
        let mut out = Vec::new();
        {
            let sink = TornSink {
                out: &mut out,
                budget: 5,
                tripped: false,
            };
            let mut writer = FrameWriter::new(sink);
            // Over one block, so the first block goes straight to the sink.
            writer
                .write_all(&random_bytes(MAX_BLOCK_SIZE + 1, 2))
                .unwrap_err();
            writer.write_all(b"still buffered?").unwrap_err();
            assert_eq!(writer.buffered(), 0);
        }
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_get_ref_and_get_mut() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        writer.flush().unwrap();

        let written = writer.get_ref().len();
        assert!(written > 0);
        assert_eq!(writer.stats().compressed_size, written);

        // Padding appended through the sink keeps the stream readable.
        writer
            .get_mut()
            .extend_from_slice(&ChunkHeader::new(ChunkType::Padding, 0).unwrap().encode());
        let out = writer.finish().unwrap();
        assert_eq!(out.len(), written + 4);
        assert_eq!(chunks(&out).last().unwrap().0, 0xfe);
    }
}
