//! CRC32 integrity for compiled entries
//!
//! Encoded entry frame:
//!
//! ```text
//! +------------------+
//! | Body Length      | (u32 LE)
//! +------------------+
//! | Body             | (JSON bytes)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of body)
//! +------------------+
//! ```

use crc32fast::Hasher;

use super::errors::{CompileError, CompileResult};

/// CRC32 (IEEE) over `data`
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Wrap `body` in a length-prefixed, checksummed frame
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(body.len() + 8);
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    buf.extend_from_slice(&compute_checksum(body).to_le_bytes());
    buf
}

/// Verify a frame and return its body
pub fn unframe(bytes: &[u8]) -> CompileResult<&[u8]> {
    if bytes.len() < 8 {
        return Err(CompileError::Serialization(format!(
            "frame too short: {} bytes",
            bytes.len()
        )));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[..4]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    if bytes.len() != len + 8 {
        return Err(CompileError::Serialization(format!(
            "frame length {} does not match {} bytes",
            len,
            bytes.len()
        )));
    }

    let body = &bytes[4..4 + len];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[4 + len..]);
    let expected = u32::from_le_bytes(crc_bytes);
    let actual = compute_checksum(body);
    if expected != actual {
        return Err(CompileError::ChecksumMismatch { expected, actual });
    }
    Ok(body)
}
