//! Configuration shared by streaming (framed) codecs.

/// Default block size for streaming operations (64 KB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Configuration for framed streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Largest block a writer hands to the block codec (default: 64 KB).
    ///
    /// Codecs clamp this to the limit of their own format.
    pub block_size: usize,

    /// Verify per-block checksums while reading (default: true).
    pub verify_checksum: bool,
}

impl StreamConfig {
    /// Set the writer block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Enable or disable checksum verification on read.
    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Block size clamped into `1..=max`.
    #[inline]
    pub fn block_size_within(&self, max: usize) -> usize {
        self.block_size.clamp(1, max.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            verify_checksum: true,
        }
    }
}
