//! # Haagenti Core
//!
//! Core traits, types, and stream configuration for the Haagenti compression
//! library.
//!
//! Haagenti is named after the 48th demon of the Ars Goetia, who transmutes
//! substances into more valuable forms - just as compression transforms data
//! into denser representations.
//!
//! ## Design Philosophy
//!
//! - **Zero-copy where possible**: Minimize allocations and memory copies
//! - **Streaming-first**: Codecs ship `Read`/`Write` adapters alongside one-shot calls
//! - **One error type**: Every codec reports failures through [`Error`]
//!
//! ## Core Traits
//!
//! - [`Compressor`] - One-shot compression operations
//! - [`Decompressor`] - One-shot decompression operations
//! - [`Codec`] - Combined compress/decompress capability
//!
//! ## Example
//!
//! ```ignore
//! use haagenti_core::{Codec, Compressor, Decompressor};
//! use haagenti_snappy::SnappyCodec;
//!
//! let codec = SnappyCodec::new();
//! let compressed = codec.compress(data)?;
//! let original = codec.decompress(&compressed)?;
//! ```

pub mod error;
pub mod stats;
pub mod stream;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use stats::CompressionStats;
pub use stream::StreamConfig;
pub use traits::{Codec, Compressor, Decompressor};
pub use types::{Algorithm, CompressionRatio};
