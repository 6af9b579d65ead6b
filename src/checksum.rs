//! CRC32C (Castagnoli) checksums as used by the `PP2_TYPE_CRC32C` TLV.
//!
//! The checksum covers the whole binary header, from the signature through the end of the
//! TLV region, with the four value bytes of the checksum TLV replaced by zeroes.

use std::ops::Range;

use crate::v2::CRC32C_LENGTH;

/// An incremental CRC32C hasher.
#[derive(Copy, Clone, Debug)]
pub struct Hasher {
    crc: u32,
}

impl Hasher {
    pub fn new() -> Self {
        Hasher { crc: 0 }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.crc = crc32c::crc32c_append(self.crc, bytes);
    }

    pub fn finalize(self) -> u32 {
        self.crc
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Hasher::new()
    }
}

/// The CRC32C checksum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

/// The CRC32C checksum of `header` with the bytes in `field` logically zeroed.
///
/// The header itself is never modified. `field` is at most four bytes long.
pub fn checksum_without(header: &[u8], field: Range<usize>) -> u32 {
    let mut hasher = Hasher::new();

    hasher.update(&header[..field.start]);
    hasher.update(&[0; CRC32C_LENGTH][..field.len()]);
    hasher.update(&header[field.end..]);

    hasher.finalize()
}

/// Verifies the big-endian checksum stored at `field` within `header`.
pub fn verify(header: &[u8], field: Range<usize>) -> Result<u32, (u32, u32)> {
    let mut stored = [0; CRC32C_LENGTH];
    stored.copy_from_slice(&header[field.clone()]);

    let expected = u32::from_be_bytes(stored);
    let actual = checksum_without(header, field);

    if expected == actual {
        Ok(expected)
    } else {
        Err((expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(checksum(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn empty_input() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = Hasher::new();
        hasher.update(b"1234");
        hasher.update(b"56789");

        assert_eq!(hasher.finalize(), checksum(b"123456789"));
    }

    #[test]
    fn zeroed_field() {
        let header = [1, 2, 3, 0xAA, 0xBB, 0xCC, 0xDD, 4, 5];
        let zeroed = [1, 2, 3, 0, 0, 0, 0, 4, 5];

        assert_eq!(checksum_without(&header, 3..7), checksum(&zeroed));
    }

    #[test]
    fn verify_stored_value() {
        let mut header = vec![1, 2, 3, 0, 0, 0, 0, 4, 5];
        let crc = checksum(&header);
        header[3..7].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(verify(&header, 3..7), Ok(crc));

        header[6] ^= 0x01;
        assert!(verify(&header, 3..7).is_err());
    }
}
