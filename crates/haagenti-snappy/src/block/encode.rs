//! Block encoder: greedy hash-chain-free match search.

use haagenti_core::{Error, Result};

use super::{
    max_encoded_len, put_uvarint, INPUT_MARGIN, MAX_BLOCK_SIZE, MAX_DECODED_LEN,
    MIN_NON_LITERAL_BLOCK_SIZE, TAG_COPY1, TAG_COPY2, TAG_LITERAL,
};
use crate::pool::BufferPool;

/// Largest hash table (entries). Tables scale from 2^8 up to this.
const MAX_TABLE_SIZE: usize = 1 << 14;

const TABLE_MASK: usize = MAX_TABLE_SIZE - 1;

/// Multiplicative hash of four bytes, keeping the top `32 - shift` bits.
#[inline(always)]
fn hash(bytes: u32, shift: u32) -> usize {
    (bytes.wrapping_mul(0x1e35_a7bd) >> shift) as usize
}

/// Read 4 bytes as u32 (little-endian).
#[inline(always)]
fn load32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Read 8 bytes as u64 (little-endian).
#[inline(always)]
fn load64(data: &[u8], pos: usize) -> u64 {
    u64::from_le_bytes([
        data[pos],
        data[pos + 1],
        data[pos + 2],
        data[pos + 3],
        data[pos + 4],
        data[pos + 5],
        data[pos + 6],
        data[pos + 7],
    ])
}

/// Compress `src` into a freshly allocated block.
pub fn encode(src: &[u8]) -> Result<Vec<u8>> {
    let max_len = max_encoded_len(src.len())
        .ok_or_else(|| Error::block_too_large(src.len() as u64, MAX_DECODED_LEN))?;

    let mut scratch = BufferPool::shared().acquire(max_len);
    let written = encode_into(src, &mut scratch)?;
    Ok(scratch[..written].to_vec())
}

/// Compress `src` into `dst`, returning the number of bytes written.
///
/// `dst` must hold at least [`max_encoded_len`] bytes. Inputs longer than
/// [`MAX_BLOCK_SIZE`] are encoded as consecutive sub-blocks behind a single
/// length header.
pub fn encode_into(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let max_len = max_encoded_len(src.len())
        .ok_or_else(|| Error::block_too_large(src.len() as u64, MAX_DECODED_LEN))?;
    if dst.len() < max_len {
        return Err(Error::buffer_too_small(max_len, dst.len()));
    }

    let mut pos = put_uvarint(dst, src.len() as u64);

    for block in src.chunks(MAX_BLOCK_SIZE) {
        if block.len() < MIN_NON_LITERAL_BLOCK_SIZE {
            pos += emit_literal(&mut dst[pos..], block);
        } else {
            pos += encode_block(&mut dst[pos..], block);
        }
    }

    Ok(pos)
}

/// Encode one block of `MIN_NON_LITERAL_BLOCK_SIZE..=MAX_BLOCK_SIZE` bytes.
///
/// `dst` is already known to be large enough.
fn encode_block(dst: &mut [u8], src: &[u8]) -> usize {
    debug_assert!(src.len() >= MIN_NON_LITERAL_BLOCK_SIZE && src.len() <= MAX_BLOCK_SIZE);

    // Positions fit in u16 because blocks never exceed 64 KB.
    let mut shift = 32 - 8;
    let mut table_size = 1 << 8;
    while table_size < MAX_TABLE_SIZE && table_size < src.len() {
        table_size *= 2;
        shift -= 1;
    }
    let mut table = [0u16; MAX_TABLE_SIZE];

    let s_limit = src.len() - INPUT_MARGIN;
    let mut out = 0;
    let mut next_emit = 0;

    // There is nothing to copy from yet, so the search starts at 1.
    let mut s = 1;
    let mut next_hash = hash(load32(src, s), shift);
    let mut candidate: usize;

    'search: loop {
        // Probe every byte for the first 32 misses, then every second byte
        // for the next 32, and so on. Incompressible input gets skimmed.
        let mut skip = 32;
        let mut next_s = s;

        loop {
            s = next_s;
            let step = skip >> 5;
            next_s = s + step;
            skip += step;
            if next_s > s_limit {
                break 'search;
            }

            let slot = next_hash & TABLE_MASK;
            candidate = table[slot] as usize;
            table[slot] = s as u16;

            next_hash = hash(load32(src, next_s), shift);
            if load32(src, s) == load32(src, candidate) {
                break;
            }
        }

        out += emit_literal(&mut dst[out..], &src[next_emit..s]);

        // Keep emitting copies while the byte right after one copy starts
        // another match.
        loop {
            let base = s;

            s += 4;
            let mut i = candidate + 4;
            while s < src.len() && src[i] == src[s] {
                i += 1;
                s += 1;
            }

            out += emit_copy(&mut dst[out..], base - candidate, s - base);
            next_emit = s;
            if s >= s_limit {
                break 'search;
            }

            // Refresh the table at s-1 and s from a single 8-byte load.
            let x = load64(src, s - 1);
            table[hash(x as u32, shift) & TABLE_MASK] = (s - 1) as u16;

            let slot = hash((x >> 8) as u32, shift) & TABLE_MASK;
            candidate = table[slot] as usize;
            table[slot] = s as u16;

            if (x >> 8) as u32 != load32(src, candidate) {
                next_hash = hash((x >> 16) as u32, shift);
                s += 1;
                break;
            }
        }
    }

    if next_emit < src.len() {
        out += emit_literal(&mut dst[out..], &src[next_emit..]);
    }

    out
}

/// Write a literal token, returning the number of bytes written.
///
/// `literal` must be non-empty.
pub(crate) fn emit_literal(dst: &mut [u8], literal: &[u8]) -> usize {
    let n = literal.len() - 1;

    let header = if n < 60 {
        dst[0] = ((n as u8) << 2) | TAG_LITERAL;
        1
    } else {
        let extra = match n {
            0..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xff_ffff => 3,
            _ => 4,
        };
        dst[0] = ((59 + extra as u8) << 2) | TAG_LITERAL;
        let bytes = (n as u32).to_le_bytes();
        dst[1..1 + extra].copy_from_slice(&bytes[..extra]);
        1 + extra
    };

    dst[header..header + literal.len()].copy_from_slice(literal);
    header + literal.len()
}

/// Write copy tokens for `length` bytes at `offset`, returning the number of
/// bytes written.
///
/// Requires `1 <= offset <= 65535` and `4 <= length`.
pub(crate) fn emit_copy(dst: &mut [u8], offset: usize, mut length: usize) -> usize {
    debug_assert!((1..=65535).contains(&offset) && length >= 4);

    let offset_lo = offset as u8;
    let offset_hi = (offset >> 8) as u8;
    let mut i = 0;

    // 68 = 64 + 4: a 67-byte copy is cheaper as 60 (copy2) + 7 (copy1) than
    // as 64 (copy2) + 3 (copy2), since copy1 needs length >= 4.
    while length >= 68 {
        dst[i] = (63 << 2) | TAG_COPY2;
        dst[i + 1] = offset_lo;
        dst[i + 2] = offset_hi;
        i += 3;
        length -= 64;
    }

    if length > 64 {
        dst[i] = (59 << 2) | TAG_COPY2;
        dst[i + 1] = offset_lo;
        dst[i + 2] = offset_hi;
        i += 3;
        length -= 60;
    }

    if length >= 12 || offset >= 2048 {
        dst[i] = (((length - 1) as u8) << 2) | TAG_COPY2;
        dst[i + 1] = offset_lo;
        dst[i + 2] = offset_hi;
        return i + 3;
    }

    dst[i] = (offset_hi << 5) | (((length - 4) as u8) << 2) | TAG_COPY1;
    dst[i + 1] = offset_lo;
    i + 2
}
