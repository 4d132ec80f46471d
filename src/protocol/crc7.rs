//! 7-bit checksum guarding sensor packets
//!
//! MSB-first, generator `0x89` (x^7 + x^3 + 1), zero seed. The checksum is
//! returned in the upper seven bits of the byte, which is CRC-7/MMC shifted
//! left by one.

use crc::{Crc, CRC_7_MMC};

const CRC: Crc<u8> = Crc::<u8>::new(&CRC_7_MMC);

/// Calculate the packet checksum over `data`
pub fn crc7(data: &[u8]) -> u8 {
    CRC.checksum(data) << 1
}
