//! MLink packet framing
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+----------------+--------+
//! | sync   | kind   | seq    | len    | src    | dst    | register words | crc32  |
//! | u16    | u16    | u16    | u16    | u16    | u16    | 4 * n bytes    | u32    |
//! +--------+--------+--------+--------+--------+--------+----------------+--------+
//! ```
//!
//! All fields are little-endian. `len` counts 32-bit words of the whole
//! packet, header and trailer included. The CRC covers every byte before it.

use adc_core::{FrameError, RegFrame, WORD_LEN};
use thiserror::Error;

pub const SYNC: u16 = 0x2a50;
pub const HEADER_LEN: usize = 12;
pub const CRC_LEN: usize = 4;

/// Upper bound on register operations carried by one packet
pub const MAX_OPS_PER_FRAME: usize = 256;

pub const KIND_REG_REQUEST: u16 = 0x0101;
pub const KIND_REG_RESPONSE: u16 = 0x0102;

#[derive(Error, Debug)]
pub enum MLinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No response within {0} ms")]
    Timeout(u64),
    #[error("Bad sync word 0x{0:04x}")]
    BadSync(u16),
    #[error("Packet truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("CRC mismatch: packet says 0x{expected:08x}, computed 0x{actual:08x}")]
    Crc { expected: u32, actual: u32 },
    #[error("Too many register operations for one packet: {0}")]
    TooLarge(usize),
    #[error("Register payload: {0}")]
    Frame(#[from] FrameError),
}

impl From<MLinkError> for adc_core::DeviceError {
    fn from(e: MLinkError) -> Self {
        match e {
            MLinkError::Io(e) => adc_core::DeviceError::Io(e),
            MLinkError::Timeout(ms) => adc_core::DeviceError::Timeout(ms),
            MLinkError::Frame(e) => adc_core::DeviceError::Frame(e),
            other => adc_core::DeviceError::Protocol(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MLinkHeader {
    pub kind: u16,
    pub seq: u16,
    pub src: u16,
    pub dst: u16,
}

/// Build a complete packet around a register frame
pub fn encode(header: &MLinkHeader, regs: &RegFrame) -> Result<Vec<u8>, MLinkError> {
    if regs.ops.len() > MAX_OPS_PER_FRAME {
        return Err(MLinkError::TooLarge(regs.ops.len()));
    }
    let body_end = HEADER_LEN + regs.encoded_len();
    let total = body_end + CRC_LEN;
    let mut buf = vec![0u8; total];

    put_header(&mut buf, header);
    regs.serialize_into(&mut buf[HEADER_LEN..body_end])?;
    put_crc(&mut buf);
    Ok(buf)
}

/// Build a packet from raw register words. Devices answer reads this way,
/// with the read flag set and the value filled in.
#[cfg(test)]
pub(crate) fn encode_words(header: &MLinkHeader, words: &[u32]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + words.len() * WORD_LEN + CRC_LEN];
    put_header(&mut buf, header);
    for (word, chunk) in words
        .iter()
        .zip(buf[HEADER_LEN..].chunks_exact_mut(WORD_LEN))
    {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    put_crc(&mut buf);
    buf
}

/// Fill the header of a packet buffer sized to its final length
fn put_header(buf: &mut [u8], header: &MLinkHeader) {
    let words = (buf.len() / WORD_LEN) as u16;
    put_u16(buf, 0, SYNC);
    put_u16(buf, 2, header.kind);
    put_u16(buf, 4, header.seq);
    put_u16(buf, 6, words);
    put_u16(buf, 8, header.src);
    put_u16(buf, 10, header.dst);
}

/// CRC over everything before the trailer, stored in the trailer
fn put_crc(buf: &mut [u8]) {
    let body_end = buf.len() - CRC_LEN;
    let crc = crc32(&buf[..body_end]);
    buf[body_end..].copy_from_slice(&crc.to_le_bytes());
}

/// Parse and verify a packet
pub fn decode(data: &[u8]) -> Result<(MLinkHeader, RegFrame), MLinkError> {
    if data.len() < HEADER_LEN + CRC_LEN {
        return Err(MLinkError::Truncated {
            expected: HEADER_LEN + CRC_LEN,
            got: data.len(),
        });
    }
    let sync = get_u16(data, 0);
    if sync != SYNC {
        return Err(MLinkError::BadSync(sync));
    }
    let total = get_u16(data, 6) as usize * WORD_LEN;
    if total < HEADER_LEN + CRC_LEN || total > data.len() {
        return Err(MLinkError::Truncated {
            expected: total,
            got: data.len(),
        });
    }

    let body_end = total - CRC_LEN;
    let expected = u32::from_le_bytes([
        data[body_end],
        data[body_end + 1],
        data[body_end + 2],
        data[body_end + 3],
    ]);
    let actual = crc32(&data[..body_end]);
    if expected != actual {
        return Err(MLinkError::Crc { expected, actual });
    }

    let header = MLinkHeader {
        kind: get_u16(data, 2),
        seq: get_u16(data, 4),
        src: get_u16(data, 8),
        dst: get_u16(data, 10),
    };
    let regs = RegFrame::from_bytes(&data[HEADER_LEN..body_end])?;
    Ok((header, regs))
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// CRC-32 (IEEE 802.3, reflected)
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}
