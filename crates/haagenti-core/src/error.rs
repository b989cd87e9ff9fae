//! Error types for compression operations.

use std::io;

use thiserror::Error;

/// Result type alias for compression operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Compression error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Input data is corrupted or invalid.
    #[error("corrupt input: {message}")]
    CorruptedData { message: String },

    /// Input uses a feature this codec does not implement.
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// Declared block size exceeds what the format can represent.
    #[error("block too large: {size} bytes exceeds maximum of {max}")]
    BlockTooLarge { size: u64, max: u64 },

    /// Buffer too small for output.
    #[error("buffer too small: need {required} bytes, got {provided}")]
    BufferTooSmall { required: usize, provided: usize },

    /// Checksum verification failed.
    #[error("checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Unexpected end of input stream.
    #[error("unexpected EOF after {bytes_read} bytes")]
    UnexpectedEof { bytes_read: usize },

    /// Stream state error.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// I/O error from underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a corrupted data error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Error::CorruptedData {
            message: message.into(),
        }
    }

    /// Create a corrupted data error with offset context.
    pub fn corrupted_at(message: impl Into<String>, offset: usize) -> Self {
        Error::CorruptedData {
            message: format!("{} at offset {}", message.into(), offset),
        }
    }

    /// Create an unsupported input error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    /// Create a block too large error.
    pub fn block_too_large(size: u64, max: u64) -> Self {
        Error::BlockTooLarge { size, max }
    }

    /// Create a buffer too small error.
    pub fn buffer_too_small(required: usize, provided: usize) -> Self {
        Error::BufferTooSmall { required, provided }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: u32, actual: u32) -> Self {
        Error::ChecksumMismatch { expected, actual }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(bytes_read: usize) -> Self {
        Error::UnexpectedEof { bytes_read }
    }

    /// True for every flavour of damaged input: malformed tokens or chunks,
    /// checksum mismatches, and truncation.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptedData { .. }
                | Error::ChecksumMismatch { .. }
                | Error::UnexpectedEof { .. }
        )
    }

    /// True when the input is well-formed but uses something this codec rejects.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Check if error is recoverable (can retry with different parameters).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::BufferTooSmall { .. })
    }

    /// Get error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::CorruptedData { .. } => "corrupted_data",
            Error::Unsupported(_) => "unsupported",
            Error::BlockTooLarge { .. } => "block_too_large",
            Error::BufferTooSmall { .. } => "buffer_too_small",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::UnexpectedEof { .. } => "unexpected_eof",
            Error::InvalidState { .. } => "invalid_state",
            Error::Io(_) => "io_error",
        }
    }

    /// Recover the codec error carried inside an [`io::Error`] produced by a
    /// `Read`/`Write` adapter.
    pub fn from_io(err: &io::Error) -> Option<&Error> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Error>())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => {
                let kind = match other {
                    Error::Unsupported(_) => io::ErrorKind::Unsupported,
                    Error::UnexpectedEof { .. } => io::ErrorKind::UnexpectedEof,
                    Error::InvalidState { .. } => io::ErrorKind::Other,
                    _ => io::ErrorKind::InvalidData,
                };
                io::Error::new(kind, other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_classification() {
        assert!(Error::corrupted("bad tag").is_corruption());
        assert!(Error::checksum_mismatch(1, 2).is_corruption());
        assert!(Error::unexpected_eof(3).is_corruption());
        assert!(!Error::unsupported("chunk type 0x02").is_corruption());
        assert!(Error::unsupported("chunk type 0x02").is_unsupported());
        assert!(!Error::block_too_large(1 << 33, u32::MAX as u64).is_corruption());
    }

    #[test]
    fn test_corrupted_at_message() {
        let err = Error::corrupted_at("offset beyond output", 17);
        assert_eq!(
            err.to_string(),
            "corrupt input: offset beyond output at offset 17"
        );
    }

    #[test]
    fn test_io_roundtrip_preserves_codec_error() {
        let io_err: io::Error = Error::checksum_mismatch(0xdead_beef, 0).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let inner = Error::from_io(&io_err).unwrap();
        assert!(matches!(
            inner,
            Error::ChecksumMismatch {
                expected: 0xdead_beef,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_io_error_passes_through() {
        let original = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let io_err: io::Error = Error::from(original).into();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
        assert!(Error::from_io(&io_err).is_none());
    }

    #[test]
    fn test_io_kinds() {
        let unsupported: io::Error = Error::unsupported("reserved chunk").into();
        assert_eq!(unsupported.kind(), io::ErrorKind::Unsupported);

        let eof: io::Error = Error::unexpected_eof(2).into();
        assert_eq!(eof.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_category() {
        assert_eq!(Error::block_too_large(1, 0).category(), "block_too_large");
        assert_eq!(Error::buffer_too_small(8, 4).category(), "buffer_too_small");
        assert!(Error::buffer_too_small(8, 4).is_recoverable());
    }
}
