//! Frame header: 4-byte big-endian file length plus a CRC-8 check byte,
//! packed into the first 40 bits of the content region.
//!
//! The checksum is CRC-8 with polynomial 0x07, init 0x00, no reflection and
//! no final xor (`CRC_8_SMBUS` in the crc crate's catalog).

use crc::{Crc, CRC_8_SMBUS};

use crate::error::DecodeError;

/// Header size in bytes within the content region.
pub const HEADER_BYTES: usize = 5;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Total transmitted file length in bytes.
    pub file_byte_length: u32,
    /// Stored check byte, already verified.
    pub crc8: u8,
}

/// Pack a file length into the 5-byte wire header.
pub fn pack(file_byte_length: u32) -> [u8; HEADER_BYTES] {
    let len = file_byte_length.to_be_bytes();
    let crc = CRC8.checksum(&len);
    [len[0], len[1], len[2], len[3], crc]
}

/// Parse and verify a 5-byte header.
pub fn parse(bytes: &[u8; HEADER_BYTES]) -> Result<HeaderRecord, DecodeError> {
    let computed = CRC8.checksum(&bytes[..4]);
    let stored = bytes[4];
    if computed != stored {
        return Err(DecodeError::HeaderCrcMismatch { stored, computed });
    }
    Ok(HeaderRecord {
        file_byte_length: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        crc8: stored,
    })
}
