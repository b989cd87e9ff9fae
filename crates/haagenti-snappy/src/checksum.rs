//! Block checksum.
//!
//! Every data chunk carries the standard CRC-32 (reflected polynomial
//! 0xEDB88320, seed 0xFFFFFFFF, final complement) of its *uncompressed*
//! bytes, stored little-endian.

/// Compute the checksum of a raw block.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(
            checksum(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn test_matches_table_driven_crc() {
        // Bitwise reference, one byte at a time.
        fn reference(data: &[u8]) -> u32 {
            let mut crc = 0xFFFF_FFFFu32;
            for &byte in data {
                crc ^= byte as u32;
                for _ in 0..8 {
                    crc = if crc & 1 != 0 {
                        0xEDB8_8320 ^ (crc >> 1)
                    } else {
                        crc >> 1
                    };
                }
            }
            !crc
        }

        let data: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(31) >> 3) as u8).collect();
        assert_eq!(checksum(&data), reference(&data));
    }

    #[test]
    fn test_single_bit_sensitivity() {
        let data = b"sensitive payload".to_vec();
        let base = checksum(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(checksum(&flipped), base);
            }
        }
    }
}
