//! Snappy codec (combined compressor + decompressor).

use haagenti_core::{Algorithm, Codec, Compressor, Decompressor, Result};

use crate::block;

/// Snappy block codec.
///
/// Operates on raw blocks (varint length plus tokens), not framed streams;
/// use [`FrameWriter`](crate::FrameWriter) and
/// [`FrameReader`](crate::FrameReader) for those.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnappyCodec;

impl SnappyCodec {
    /// Create a new Snappy codec.
    pub fn new() -> Self {
        SnappyCodec
    }

    /// Decoded length declared by a compressed block.
    pub fn decompressed_len(&self, input: &[u8]) -> Result<usize> {
        block::decoded_len(input)
    }
}

impl Compressor for SnappyCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Snappy
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        block::encode(input)
    }

    fn compress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        block::encode_into(input, output)
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        block::max_encoded_len(input_len).unwrap_or(usize::MAX)
    }
}

impl Decompressor for SnappyCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Snappy
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        block::decode(input)
    }

    fn decompress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        block::decode_into(input, output)
    }
}

impl Codec for SnappyCodec {
    fn new() -> Self {
        SnappyCodec::new()
    }
}
