//! Register operations and their wire encoding
//!
//! Every register operation travels as one 32-bit little-endian word:
//!
//! ```text
//!  31   30             16 15              0
//! +----+-----------------+-----------------+
//! | R  |  register (15)  |   value (16)    |
//! +----+-----------------+-----------------+
//! ```
//!
//! A [`RegFrame`] is simply a run of such words with no header; the outer
//! transport packet adds its own header and checksum around it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Size of one encoded register operation in bytes
pub const WORD_LEN: usize = 4;

/// Register numbers are 15 bits wide on the wire
pub const REG_NUM_MASK: u16 = 0x7fff;

const READ_FLAG: u32 = 0x8000_0000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed register frame: {0} bytes is not a multiple of 4")]
    Malformed(usize),
    #[error("Buffer too small for register frame: need {need} bytes, got {got}")]
    BufferTooSmall { need: usize, got: usize },
}

/// A single register read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegOp {
    /// True for a read request, false for a write
    pub read: bool,
    /// Register number (only the low 15 bits reach the wire)
    pub addr: u16,
    /// Value to write, or the value reported by the device
    pub value: u16,
}

impl RegOp {
    pub fn read(addr: u16) -> Self {
        Self {
            read: true,
            addr,
            value: 0,
        }
    }

    pub fn write(addr: u16, value: u16) -> Self {
        Self {
            read: false,
            addr,
            value,
        }
    }

    /// Pack into the 32-bit register word. Never fails: the register number is
    /// masked to 15 bits and reads always carry a zero value field.
    pub fn to_word(&self) -> u32 {
        let num = u32::from(self.addr & REG_NUM_MASK) << 16;
        if self.read {
            READ_FLAG | num
        } else {
            num | u32::from(self.value)
        }
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            read: word & READ_FLAG != 0,
            addr: ((word >> 16) as u16) & REG_NUM_MASK,
            value: word as u16,
        }
    }

    pub fn encode(&self) -> [u8; WORD_LEN] {
        self.to_word().to_le_bytes()
    }

    pub fn decode(bytes: [u8; WORD_LEN]) -> Self {
        Self::from_word(u32::from_le_bytes(bytes))
    }

    /// Address and value rendered as `0x`-prefixed hex
    pub fn hex(&self) -> (String, String) {
        (format!("0x{:04x}", self.addr), format!("0x{:04x}", self.value))
    }
}

/// An ordered run of register operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegFrame {
    pub ops: Vec<RegOp>,
}

impl RegFrame {
    pub fn new(ops: Vec<RegOp>) -> Self {
        Self { ops }
    }

    /// Number of bytes [`RegFrame::serialize_into`] writes
    pub fn encoded_len(&self) -> usize {
        self.ops.len() * WORD_LEN
    }

    /// Write the frame into the front of `buf`, returning the number of bytes
    /// written. Bytes past that point are left untouched so an enclosing
    /// packet can place its trailer there.
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let need = self.encoded_len();
        if buf.len() < need {
            return Err(FrameError::BufferTooSmall {
                need,
                got: buf.len(),
            });
        }
        for (op, chunk) in self.ops.iter().zip(buf.chunks_exact_mut(WORD_LEN)) {
            chunk.copy_from_slice(&op.encode());
            trace!("Register word: {:08x}", op.to_word());
        }
        Ok(need)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        // Sized exactly above, cannot come up short
        let _ = self.serialize_into(&mut buf);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() % WORD_LEN != 0 {
            return Err(FrameError::Malformed(data.len()));
        }
        let ops = data
            .chunks_exact(WORD_LEN)
            .map(|chunk| RegOp::decode([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { ops })
    }
}

impl From<Vec<RegOp>> for RegFrame {
    fn from(ops: Vec<RegOp>) -> Self {
        Self::new(ops)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid hex value {text:?}: {reason}")]
pub struct HexError {
    pub text: String,
    pub reason: String,
}

/// Parse hexadecimal text, with or without a `0x` prefix, into a 16-bit value.
/// Only hex digits may follow the prefix: no sign and no whitespace.
pub fn parse_hex_u16(text: &str) -> Result<u16, HexError> {
    let invalid = |reason: &str| HexError {
        text: text.to_string(),
        reason: reason.to_string(),
    };
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return Err(invalid("no digits"));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid("not a hex digit"));
    }
    u16::from_str_radix(digits, 16).map_err(|e| invalid(&e.to_string()))
}

/// Register address/value pair as exchanged with API clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegHex {
    #[serde(rename = "Addr")]
    pub addr: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl RegHex {
    pub fn new(addr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            value: value.into(),
        }
    }
}

impl From<&RegOp> for RegHex {
    fn from(op: &RegOp) -> Self {
        let (addr, value) = op.hex();
        Self { addr, value }
    }
}

impl From<RegOp> for RegHex {
    fn from(op: RegOp) -> Self {
        Self::from(&op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_word_layout() {
        let op = RegOp {
            read: true,
            addr: 0x1234,
            value: 0xbeef,
        };
        assert_eq!(op.to_word(), 0x9234_0000);
        assert_eq!(op.encode(), [0x00, 0x00, 0x34, 0x92]);
    }

    #[test]
    fn test_write_word_layout() {
        let op = RegOp::write(0x0001, 0x00ff);
        assert_eq!(op.to_word(), 0x0001_00ff);
        assert_eq!(op.encode(), [0xff, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_register_number_is_masked() {
        let op = RegOp::write(0xffff, 0x0000);
        assert_eq!(op.to_word(), 0x7fff_0000);
        assert_eq!(RegOp::from_word(op.to_word()).addr, 0x7fff);

        let op = RegOp::read(0xffff);
        assert_eq!(op.to_word(), 0xffff_0000);
    }

    #[test]
    fn test_decode_extracts_fields() {
        let op = RegOp::decode([0x09, 0x00, 0x01, 0x00]);
        assert_eq!(op, RegOp::write(1, 9));

        let op = RegOp::decode([0x00, 0x00, 0x40, 0x80]);
        assert_eq!(op, RegOp::read(0x40));
    }

    #[test]
    fn test_frame_round_trip() {
        let ops = vec![
            RegOp::read(0x0000),
            RegOp::write(0x0001, 0xffff),
            RegOp::read(0x7fff),
            RegOp::write(0x0abc, 0x1234),
        ];
        let frame = RegFrame::new(ops.clone());
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(RegFrame::from_bytes(&bytes).unwrap().ops, ops);
    }

    #[test]
    fn test_frame_round_trip_truncates_out_of_range() {
        let frame = RegFrame::new(vec![RegOp::write(0x8005, 0x0042)]);
        let decoded = RegFrame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(decoded.ops, vec![RegOp::write(0x0005, 0x0042)]);
    }

    #[test]
    fn test_malformed_frame_lengths() {
        assert_eq!(
            RegFrame::from_bytes(&[0u8; 3]),
            Err(FrameError::Malformed(3))
        );
        assert_eq!(
            RegFrame::from_bytes(&[0u8; 5]),
            Err(FrameError::Malformed(5))
        );
    }

    #[test]
    fn test_empty_frame_is_not_an_error() {
        let frame = RegFrame::from_bytes(&[]).unwrap();
        assert!(frame.ops.is_empty());
    }

    #[test]
    fn test_serialize_into_leaves_trailer_alone() {
        let frame = RegFrame::new(vec![RegOp::write(2, 3)]);
        let mut buf = [0xaa; 8];
        let n = frame.serialize_into(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [0x03, 0x00, 0x02, 0x00, 0xaa, 0xaa, 0xaa, 0xaa]);
    }

    #[test]
    fn test_serialize_into_short_buffer() {
        let frame = RegFrame::new(vec![RegOp::read(1), RegOp::read(2)]);
        let mut buf = [0u8; 6];
        assert_eq!(
            frame.serialize_into(&mut buf),
            Err(FrameError::BufferTooSmall { need: 8, got: 6 })
        );
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u16("0x00ff"), Ok(0x00ff));
        assert_eq!(parse_hex_u16("0XABCD"), Ok(0xabcd));
        assert_eq!(parse_hex_u16("1f"), Ok(0x1f));
        assert!(parse_hex_u16("0x10000").is_err());
        assert!(parse_hex_u16("0x").is_err());
        assert!(parse_hex_u16("zz").is_err());
    }

    #[test]
    fn test_parse_hex_rejects_sign_and_whitespace() {
        for text in ["+1f", "0x+1f", "-1", " 0x1f", "0x1f ", " 0x+1f ", "0x 1f"] {
            assert!(parse_hex_u16(text).is_err(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn test_round_trip_at_boundaries() {
        let numbers = [0x0000, 0x0001, 0x00ff, 0x0100, 0x3fff, 0x4000, 0x7ffe, 0x7fff];
        let values = [0x0000, 0x0001, 0x7fff, 0x8000, 0xffff];
        for &addr in &numbers {
            let read = RegOp::read(addr);
            assert_eq!(RegOp::decode(read.encode()), read);

            for &value in &values {
                let write = RegOp::write(addr, value);
                assert_eq!(RegOp::decode(write.encode()), write);
            }
        }

        let ops: Vec<RegOp> = numbers
            .iter()
            .flat_map(|&a| [RegOp::read(a), RegOp::write(a, 0xffff), RegOp::write(a, 0)])
            .collect();
        let frame = RegFrame::new(ops.clone());
        assert_eq!(RegFrame::from_bytes(&frame.to_bytes()).unwrap().ops, ops);
    }

    #[test]
    fn test_out_of_range_numbers_lose_bit_15() {
        for addr in [0x8000u16, 0x8001, 0xc000, 0xffff] {
            let op = RegOp::write(addr, 0x1234);
            assert_eq!(RegOp::decode(op.encode()), RegOp::write(addr & REG_NUM_MASK, 0x1234));
        }
    }

    #[test]
    fn test_reghex_json_shape() {
        let hex = RegHex::from(RegOp::write(0x1, 0x9));
        let json = serde_json::to_string(&hex).unwrap();
        assert_eq!(json, r#"{"Addr":"0x0001","Value":"0x0009"}"#);

        let parsed: RegHex = serde_json::from_str(&json).unwrap();
        assert_eq!(parse_hex_u16(&parsed.addr), Ok(1));
        assert_eq!(parse_hex_u16(&parsed.value), Ok(9));
    }
}
