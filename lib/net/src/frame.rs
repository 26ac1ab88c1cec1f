//! The cluster-socket wire format: `len:u32-BE || payload[len]`, `1 <= len <= MAX_MSG_SIZE`. Uses
//! a byteorder-based header read/write, with an encrypted category header dropped (authentication
//! is out of scope) in favour of a plain length prefix.

use byteorder::{BigEndian, ByteOrder};

/// Header size in bytes: one big-endian `u32` length prefix.
pub const MSG_HDR_SIZE: usize = 4;

/// `1 <= N <= 256 MiB`, per §4.3.1.
pub const MAX_MSG_SIZE: u32 = 256 * 1024 * 1024;

/// Encodes `len` as a 4-byte big-endian header into `out[0..4]`.
#[inline]
pub fn write_header(out: &mut [u8], len: u32) {
    BigEndian::write_u32(&mut out[..MSG_HDR_SIZE], len);
}

/// Decodes a 4-byte big-endian header from `input[0..4]`.
#[inline]
pub fn read_header(input: &[u8]) -> u32 {
    BigEndian::read_u32(&input[..MSG_HDR_SIZE])
}

/// Validates a declared payload length against the wire format's bounds.
#[inline]
pub fn validate_len(len: u32) -> bool {
    len > 0 && len <= MAX_MSG_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut buf = [0u8; MSG_HDR_SIZE];
        write_header(&mut buf, 65537);
        assert_eq!(read_header(&buf), 65537);
    }

    #[test]
    fn validate_len_rejects_zero_and_oversized() {
        assert!(!validate_len(0));
        assert!(validate_len(1));
        assert!(validate_len(MAX_MSG_SIZE));
        assert!(!validate_len(MAX_MSG_SIZE + 1));
    }
}
