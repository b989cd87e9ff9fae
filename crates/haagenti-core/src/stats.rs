//! Statistics for compression operations.

use crate::types::{Algorithm, CompressionRatio};

/// Running statistics for a compression or decompression stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Algorithm used.
    pub algorithm: Option<Algorithm>,

    /// Original (uncompressed) size in bytes.
    pub original_size: usize,

    /// Compressed (on the wire) size in bytes, including framing.
    pub compressed_size: usize,

    /// Number of data blocks processed.
    pub blocks_processed: usize,

    /// Blocks stored verbatim because compression did not pay off.
    pub blocks_stored: usize,

    /// Chunks skipped without decoding (padding, reserved-skippable).
    pub chunks_skipped: usize,
}

impl CompressionStats {
    /// Create empty stats for an algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        CompressionStats {
            algorithm: Some(algorithm),
            ..Default::default()
        }
    }

    /// Get compression ratio.
    pub fn ratio(&self) -> CompressionRatio {
        CompressionRatio::new(self.original_size, self.compressed_size)
    }

    /// Get space savings as percentage.
    pub fn savings_percent(&self) -> f64 {
        self.ratio().savings_percent()
    }

    /// Merge stats from another stream.
    pub fn merge(&mut self, other: &CompressionStats) {
        self.original_size += other.original_size;
        self.compressed_size += other.compressed_size;
        self.blocks_processed += other.blocks_processed;
        self.blocks_stored += other.blocks_stored;
        self.chunks_skipped += other.chunks_skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut a = CompressionStats::new(Algorithm::Snappy);
        a.original_size = 100;
        a.compressed_size = 40;
        a.blocks_processed = 1;

        let mut b = CompressionStats::new(Algorithm::Snappy);
        b.original_size = 50;
        b.compressed_size = 60;
        b.blocks_processed = 1;
        b.blocks_stored = 1;

        a.merge(&b);
        assert_eq!(a.original_size, 150);
        assert_eq!(a.compressed_size, 100);
        assert_eq!(a.blocks_processed, 2);
        assert_eq!(a.blocks_stored, 1);
        assert_eq!(a.algorithm, Some(Algorithm::Snappy));
    }

    #[test]
    fn test_savings() {
        let mut stats = CompressionStats::new(Algorithm::Snappy);
        stats.original_size = 200;
        stats.compressed_size = 50;
        assert!((stats.savings_percent() - 75.0).abs() < 1e-9);
    }
}
