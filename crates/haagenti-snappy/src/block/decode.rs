//! Block decoder.
//!
//! The decoder is the trust boundary for external input: every index is
//! checked against both the token stream and the destination before use.

use haagenti_core::{Error, Result};

use super::{check_plausible, header, TAG_COPY1, TAG_COPY2, TAG_COPY4, TAG_LITERAL};

/// Decompress a block into a freshly allocated buffer.
pub fn decode(src: &[u8]) -> Result<Vec<u8>> {
    let (len, header_len) = header(src)?;
    let tokens = &src[header_len..];
    check_plausible(len, tokens.len())?;

    let mut output = vec![0u8; len];
    decode_tokens(&mut output, tokens)?;
    Ok(output)
}

/// Decompress a block into `dst`, returning the decoded length.
///
/// Fails with `BufferTooSmall` when `dst` is shorter than the length the
/// block declares.
pub fn decode_into(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let (len, header_len) = header(src)?;
    if len > dst.len() {
        return Err(Error::buffer_too_small(len, dst.len()));
    }
    let tokens = &src[header_len..];
    check_plausible(len, tokens.len())?;

    decode_tokens(&mut dst[..len], tokens)?;
    Ok(len)
}

/// Literal lengths must fit a signed 32-bit integer.
const MAX_LITERAL_LEN_MINUS_ONE: u32 = i32::MAX as u32;

/// Little-endian integer from `bytes` (at most four).
#[inline(always)]
fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32)
}

/// Run the token stream `src`, filling `dst` exactly.
fn decode_tokens(dst: &mut [u8], src: &[u8]) -> Result<()> {
    let mut d = 0;
    let mut s = 0;

    while s < src.len() {
        let tag = src[s];

        let (length, offset) = match tag & 0x03 {
            TAG_LITERAL => {
                let x = (tag >> 2) as usize;
                let len_minus_one = if x < 60 {
                    s += 1;
                    x as u32
                } else {
                    // 60..=63: the next 1..=4 bytes hold len-1.
                    let extra = x - 59;
                    if extra >= src.len() - s {
                        return Err(Error::corrupted_at("truncated literal length", s));
                    }
                    let value = read_le(&src[s + 1..s + 1 + extra]);
                    s += 1 + extra;
                    value
                };

                if len_minus_one >= MAX_LITERAL_LEN_MINUS_ONE {
                    return Err(Error::unsupported(format!(
                        "literal length {} exceeds 31 bits",
                        len_minus_one as u64 + 1
                    )));
                }
                let length = len_minus_one as usize + 1;

                if length > dst.len() - d || length > src.len() - s {
                    return Err(Error::corrupted_at("literal overruns block", s));
                }

                dst[d..d + length].copy_from_slice(&src[s..s + length]);
                d += length;
                s += length;
                continue;
            }
            TAG_COPY1 => {
                if src.len() - s < 2 {
                    return Err(Error::corrupted_at("truncated copy", s));
                }
                let length = 4 + ((tag >> 2) & 0x07) as usize;
                let offset = ((tag as usize & 0xe0) << 3) | src[s + 1] as usize;
                s += 2;
                (length, offset)
            }
            TAG_COPY2 => {
                if src.len() - s < 3 {
                    return Err(Error::corrupted_at("truncated copy", s));
                }
                let length = 1 + (tag >> 2) as usize;
                let offset = read_le(&src[s + 1..s + 3]) as usize;
                s += 3;
                (length, offset)
            }
            _ => {
                debug_assert_eq!(tag & 0x03, TAG_COPY4);
                if src.len() - s < 5 {
                    return Err(Error::corrupted_at("truncated copy", s));
                }
                let length = 1 + (tag >> 2) as usize;
                let offset = read_le(&src[s + 1..s + 5]) as usize;
                s += 5;
                (length, offset)
            }
        };

        if offset == 0 {
            return Err(Error::corrupted_at("invalid zero offset", d));
        }
        if offset > d {
            return Err(Error::corrupted_at("offset beyond output", d));
        }
        if length > dst.len() - d {
            return Err(Error::corrupted_at("copy overruns block", d));
        }

        let start = d - offset;
        if offset >= length {
            dst.copy_within(start..start + length, d);
        } else {
            // Overlapping: each byte may be one this copy just wrote.
            for i in 0..length {
                dst[d + i] = dst[start + i];
            }
        }
        d += length;
    }

    if d != dst.len() {
        return Err(Error::corrupted(format!(
            "block decoded to {} bytes, header declared {}",
            d,
            dst.len()
        )));
    }

    Ok(())
}
