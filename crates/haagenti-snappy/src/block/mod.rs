//! Snappy block format encoding and decoding.
//!
//! A block is the varint-encoded decompressed length followed by a sequence
//! of tokens:
//!
//! ```text
//! block   := varint(len) token*
//! token   := literal | copy
//! literal := tag(0b00) [len-1: 0..4 bytes LE] bytes
//! copy1   := tag(0b01) offset_lo            (len 4..11, offset < 2048)
//! copy2   := tag(0b10) offset(2 bytes LE)   (len 1..64)
//! copy4   := tag(0b11) offset(4 bytes LE)   (len 1..64)
//! ```
//!
//! A copy replays `len` bytes starting `offset` bytes back in the output and
//! may overlap the bytes it is producing.

mod decode;
mod encode;

pub use decode::{decode, decode_into};
pub use encode::{encode, encode_into};

use haagenti_core::{Error, Result};

/// Largest block the encoder processes in one match-search pass.
pub const MAX_BLOCK_SIZE: usize = 65536;

/// Worst-case encoded size of a full block: `max_encoded_len(MAX_BLOCK_SIZE)`.
pub const MAX_ENCODED_LEN_OF_MAX_BLOCK_SIZE: usize = 76490;

/// Bytes kept in reserve at the end of the input so the match loop can load
/// eight bytes without bounds trouble.
pub(crate) const INPUT_MARGIN: usize = 16 - 1;

/// Inputs shorter than this are emitted as a single literal.
pub const MIN_NON_LITERAL_BLOCK_SIZE: usize = 1 + 1 + INPUT_MARGIN;

/// Largest decoded length a block header may declare.
pub const MAX_DECODED_LEN: u64 = u32::MAX as u64;

/// Upper bound on output bytes per input token byte (a 3-byte copy2 of
/// length 64 is the densest token).
const MAX_EXPANSION: usize = 22;

pub(crate) const TAG_LITERAL: u8 = 0x00;
pub(crate) const TAG_COPY1: u8 = 0x01;
pub(crate) const TAG_COPY2: u8 = 0x02;
pub(crate) const TAG_COPY4: u8 = 0x03;

/// Maximum encoded size for an input of `src_len` bytes, or `None` when the
/// input is too large for the format.
///
/// The worst case is a one-byte literal followed by a five-byte copy, so six
/// input bytes become seven output bytes.
pub fn max_encoded_len(src_len: usize) -> Option<usize> {
    let n = src_len as u64;
    if n > MAX_DECODED_LEN {
        return None;
    }
    let n = 32 + n + n / 6;
    if n > MAX_DECODED_LEN {
        return None;
    }
    usize::try_from(n).ok()
}

/// Decoded length declared by a compressed block.
pub fn decoded_len(src: &[u8]) -> Result<usize> {
    header(src).map(|(len, _)| len)
}

/// Parse the block header, returning `(decoded_len, header_len)`.
pub(crate) fn header(src: &[u8]) -> Result<(usize, usize)> {
    let (value, header_len) = read_uvarint(src)?;
    if value > MAX_DECODED_LEN {
        return Err(Error::block_too_large(value, MAX_DECODED_LEN));
    }
    let len = usize::try_from(value)
        .map_err(|_| Error::block_too_large(value, usize::MAX as u64))?;
    Ok((len, header_len))
}

/// Reject declared lengths the token bytes could never produce.
pub(crate) fn check_plausible(decoded: usize, tokens: usize) -> Result<()> {
    if decoded > tokens.saturating_mul(MAX_EXPANSION) {
        return Err(Error::corrupted(format!(
            "declared length {} cannot come from {} token bytes",
            decoded, tokens
        )));
    }
    Ok(())
}

/// Write `value` as a varint, returning the number of bytes written.
#[inline]
pub(crate) fn put_uvarint(buf: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Read a varint, returning `(value, bytes_read)`.
pub(crate) fn read_uvarint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= 10 {
            return Err(Error::corrupted("varint overflows 64 bits"));
        }
        if byte < 0x80 {
            if i == 9 && byte > 1 {
                return Err(Error::corrupted("varint overflows 64 bits"));
            }
            return Ok((value | (byte as u64) << shift, i + 1));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    Err(Error::corrupted("truncated length header"))
}
