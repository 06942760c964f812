//! Base64 encoding with the standard alphabet and `=` padding.
//!
//! Every 3 input bytes become 4 output characters. A trailing group of
//! 2 bytes is padded with one `=`, a trailing single byte with two.
//!
//! ```
//! use tcpmux::codec::base64;
//!
//! assert_eq!(base64::encode(b"Man"), "TWFu");
//! assert_eq!(base64::encode(b"Ma"), "TWE=");
//! assert_eq!(base64::encode(b"M"), "TQ==");
//! assert_eq!(base64::decode("TWFu").unwrap(), b"Man");
//! ```

use thiserror::Error;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const PAD: u8 = b'=';

/// Reverse lookup table; `INVALID` marks bytes outside the alphabet.
const INVALID: u8 = 0xFF;

const DECODE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Reasons a string cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input is not made of whole 4-character groups.
    #[error("base64 input length {0} is not a multiple of 4")]
    InvalidLength(usize),

    /// A character outside the alphabet, or padding in the wrong place.
    #[error("invalid base64 character {byte:#04x} at offset {offset}")]
    InvalidByte {
        /// Offset of the character in the input.
        offset: usize,
        /// The offending byte.
        byte: u8,
    },

    /// The output buffer is smaller than [`decoded_len`].
    #[error("output buffer holds {available} bytes, {needed} needed")]
    BufferTooSmall {
        /// Bytes the decoded data needs.
        needed: usize,
        /// Bytes the caller provided.
        available: usize,
    },
}

/// Number of characters [`encode`] produces for `len` input bytes.
pub fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}

/// Encodes `data` to a padded base64 string.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(encoded_len(data.len()));

    let mut chunks = data.chunks_exact(3);
    for chunk in &mut chunks {
        let group = u32::from(chunk[0]) << 16 | u32::from(chunk[1]) << 8 | u32::from(chunk[2]);
        push_sextets(&mut out, group, 4);
    }

    match *chunks.remainder() {
        [a, b] => {
            push_sextets(&mut out, u32::from(a) << 16 | u32::from(b) << 8, 3);
            out.push(PAD as char);
        }
        [a] => {
            push_sextets(&mut out, u32::from(a) << 16, 2);
            out.push_str("==");
        }
        _ => {}
    }

    out
}

fn push_sextets(out: &mut String, group: u32, count: usize) {
    for i in 0..count {
        let index = (group >> (18 - 6 * i)) & 0x3F;
        out.push(ALPHABET[index as usize] as char);
    }
}

/// Number of bytes `input` decodes to, counting its padding.
///
/// Fails only when the length is not a multiple of 4.
pub fn decoded_len(input: &str) -> Result<usize, DecodeError> {
    let bytes = input.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::InvalidLength(bytes.len()));
    }

    let padding = bytes.iter().rev().take(2).take_while(|&&b| b == PAD).count();
    Ok(bytes.len() / 4 * 3 - padding)
}

/// Decodes `input` into `out`, returning the number of bytes written.
pub fn decode_into(input: &str, out: &mut [u8]) -> Result<usize, DecodeError> {
    let needed = decoded_len(input)?;
    if out.len() < needed {
        return Err(DecodeError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    let bytes = input.as_bytes();
    let groups = bytes.len() / 4;
    let mut written = 0;

    for (g, quad) in bytes.chunks_exact(4).enumerate() {
        let last = g + 1 == groups;
        let mut group = 0u32;
        let mut padding = 0;

        for (i, &byte) in quad.iter().enumerate() {
            let offset = g * 4 + i;

            if byte == PAD {
                // Padding only closes the final group, at most twice.
                if !last || i < 2 {
                    return Err(DecodeError::InvalidByte { offset, byte });
                }
                padding += 1;
                continue;
            }

            let value = DECODE[byte as usize];
            if value == INVALID || padding > 0 {
                return Err(DecodeError::InvalidByte { offset, byte });
            }
            group |= u32::from(value) << (18 - 6 * i);
        }

        let decoded = [(group >> 16) as u8, (group >> 8) as u8, group as u8];
        let take = 3 - padding;
        out[written..written + take].copy_from_slice(&decoded[..take]);
        written += take;
    }

    Ok(written)
}

/// Decodes a padded base64 string.
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let mut out = vec![0u8; decoded_len(input)?];
    let written = decode_into(input, &mut out)?;
    out.truncate(written);
    Ok(out)
}
