//! Snappy framing format.
//!
//! A framed stream is a sequence of chunks, each a one-byte type, a 24-bit
//! little-endian payload length, and the payload:
//!
//! ```text
//! stream       := stream-id chunk*
//! stream-id    := 0xff 06 00 00 "sNaPpY"
//! compressed   := 0x00 len(3) crc(4) compressed-block
//! uncompressed := 0x01 len(3) crc(4) raw-block
//! padding      := 0xfe len(3) ignored
//! skippable    := 0x80..=0xfd len(3) ignored
//! ```
//!
//! Data chunks carry at most [`MAX_BLOCK_SIZE`](crate::block::MAX_BLOCK_SIZE)
//! raw bytes and the checksum of those raw bytes.

mod reader;
mod writer;

pub use reader::FrameReader;
pub use writer::FrameWriter;

use haagenti_core::{Error, Result};

use crate::block::MAX_ENCODED_LEN_OF_MAX_BLOCK_SIZE;

/// Payload of the stream identifier chunk.
pub const STREAM_IDENTIFIER_BODY: &[u8; 6] = b"sNaPpY";

/// The complete stream identifier chunk every stream starts with.
pub const MAGIC_CHUNK: [u8; 10] = [0xff, 0x06, 0x00, 0x00, b's', b'N', b'a', b'P', b'p', b'Y'];

/// Size of the checksum that leads every data chunk payload.
pub const CHECKSUM_SIZE: usize = 4;

/// Size of a chunk header (type plus 24-bit length).
pub const CHUNK_HEADER_SIZE: usize = 4;

/// Room for the stream identifier plus one data chunk header and checksum.
pub const OBUF_HEADER_LEN: usize = MAGIC_CHUNK.len() + CHUNK_HEADER_SIZE + CHECKSUM_SIZE;

/// Writer staging buffer size: header room plus a worst-case block.
pub const OBUF_LEN: usize = OBUF_HEADER_LEN + MAX_ENCODED_LEN_OF_MAX_BLOCK_SIZE;

/// Largest chunk payload a reader accepts.
pub const MAX_CHUNK_LEN: usize = MAX_ENCODED_LEN_OF_MAX_BLOCK_SIZE + CHECKSUM_SIZE;

/// Largest payload length a 24-bit header can carry.
const MAX_HEADER_LEN: usize = (1 << 24) - 1;

/// Chunk type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// 0xff: stream identifier.
    StreamIdentifier,
    /// 0x00: checksum plus compressed block.
    CompressedData,
    /// 0x01: checksum plus raw block.
    UncompressedData,
    /// 0xfe: padding, ignored.
    Padding,
    /// 0x80..=0xfd: reserved, skipped by readers.
    Skippable(u8),
    /// 0x02..=0x7f: reserved, a reader must reject the stream.
    Reserved(u8),
}

impl ChunkType {
    /// Classify a type byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xff => ChunkType::StreamIdentifier,
            0x00 => ChunkType::CompressedData,
            0x01 => ChunkType::UncompressedData,
            0xfe => ChunkType::Padding,
            0x80..=0xfd => ChunkType::Skippable(byte),
            _ => ChunkType::Reserved(byte),
        }
    }

    /// The type byte on the wire.
    pub fn to_byte(self) -> u8 {
        match self {
            ChunkType::StreamIdentifier => 0xff,
            ChunkType::CompressedData => 0x00,
            ChunkType::UncompressedData => 0x01,
            ChunkType::Padding => 0xfe,
            ChunkType::Skippable(b) | ChunkType::Reserved(b) => b,
        }
    }

    /// Whether a reader discards chunks of this type.
    pub fn is_skippable(self) -> bool {
        matches!(self, ChunkType::Padding | ChunkType::Skippable(_))
    }

    /// Whether chunks of this type carry stream data.
    pub fn is_data(self) -> bool {
        matches!(self, ChunkType::CompressedData | ChunkType::UncompressedData)
    }
}

/// A parsed chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chunk type.
    pub chunk_type: ChunkType,
    /// Payload length in bytes.
    pub length: usize,
}

impl ChunkHeader {
    /// Create a header, rejecting lengths a 24-bit field cannot hold.
    pub fn new(chunk_type: ChunkType, length: usize) -> Result<Self> {
        if length > MAX_HEADER_LEN {
            return Err(Error::block_too_large(length as u64, MAX_HEADER_LEN as u64));
        }
        Ok(ChunkHeader { chunk_type, length })
    }

    /// Parse a header from its four wire bytes.
    pub fn parse(bytes: [u8; CHUNK_HEADER_SIZE]) -> Self {
        ChunkHeader {
            chunk_type: ChunkType::from_byte(bytes[0]),
            length: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], 0]) as usize,
        }
    }

    /// Encode the header to its four wire bytes.
    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let len = (self.length as u32).to_le_bytes();
        [self.chunk_type.to_byte(), len[0], len[1], len[2]]
    }
}
