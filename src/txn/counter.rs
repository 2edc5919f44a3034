//! 32-bit counter encoding used by `increase32`

use crate::error::{Result, TideError};

/// Encode as 4 bytes, big-endian, two's complement
pub fn encode_i32(value: i32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decode a stored counter. An absent value counts as 0.
pub fn decode_i32(value: Option<&[u8]>) -> Result<i32> {
    match value {
        None => Ok(0),
        Some(bytes) => {
            let bytes: [u8; 4] = bytes
                .try_into()
                .map_err(|_| TideError::InvalidCounter { len: bytes.len() })?;
            Ok(i32::from_be_bytes(bytes))
        }
    }
}
