//! # Haagenti Snappy
//!
//! Snappy-compatible block compression and a checksummed streaming frame
//! format.
//!
//! Snappy trades ratio for speed: a single greedy pass over a small hash
//! table, no entropy coding. It suits caches, RPC payloads and logs where
//! latency matters more than size.
//!
//! ## Layers
//!
//! - [`block`]: one-shot [`encode`] / [`decode`] of raw blocks, compatible
//!   with other Snappy implementations
//! - [`frame`]: [`FrameWriter`] / [`FrameReader`] wrapping blocks of at most
//!   64 KB in typed, length-prefixed chunks, each carrying a CRC-32 of its raw
//!   bytes
//! - [`SnappyCodec`]: the block codec behind haagenti-core's traits
//!
//! ## Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! let data = b"hello hello hello hello hello".repeat(100);
//!
//! let compressed = haagenti_snappy::encode(&data)?;
//! assert_eq!(haagenti_snappy::decode(&compressed)?, data);
//!
//! let mut writer = haagenti_snappy::open_writer(Vec::new());
//! writer.write_all(&data)?;
//! let stream = writer.finish()?;
//!
//! let mut reader = haagenti_snappy::open_reader(&stream[..]);
//! let mut out = Vec::new();
//! reader.read_to_end(&mut out)?;
//! assert_eq!(out, data);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod block;
pub mod checksum;
pub mod codec;
pub mod frame;
pub mod pool;

use std::io::{Read, Write};

// Re-export main types
pub use block::{
    decode, decode_into, decoded_len, encode, encode_into, max_encoded_len, MAX_BLOCK_SIZE,
};
pub use codec::SnappyCodec;
pub use frame::{ChunkHeader, ChunkType, FrameReader, FrameWriter};
pub use pool::{BufferPool, PooledBuffer};

/// Open a frame writer over `sink` with the default configuration.
pub fn open_writer<W: Write>(sink: W) -> FrameWriter<W> {
    FrameWriter::new(sink)
}

/// Open a frame reader over `source` with the default configuration.
pub fn open_reader<R: Read>(source: R) -> FrameReader<R> {
    FrameReader::new(source)
}
