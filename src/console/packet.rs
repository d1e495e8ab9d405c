//! Binary packet framing on the console channel.
//!
//! ```text
//!   DLE SOH <hi> <lo> <payload…>
//!           └─┬──┘
//!   type (top 3 bits) | length (low 13 bits), big endian
//! ```
//!
//! Replies are a bare `ACK`/`NAK`, optionally followed by a framed
//! `Response` or `Data` packet.

use alloc::vec::Vec;

pub const SOH: u8 = 0x01;
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const DLE: u8 = 0x10;
pub const NAK: u8 = 0x15;
pub const ESC: u8 = 0x1B;

pub const TYPE_MASK: u16 = 0xE000;
pub const SIZE_MASK: u16 = 0x1FFF;
/// Largest payload one packet can carry.
pub const MAX_PAYLOAD: usize = SIZE_MASK as usize;

/// Packet type from the top three header bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Response,
    Eval,
    Event,
    FileSend,
    Data,
    FileRecv,
    Reserved(u8),
}

impl PacketType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Self::Response,
            1 => Self::Eval,
            2 => Self::Event,
            3 => Self::FileSend,
            4 => Self::Data,
            5 => Self::FileRecv,
            other => Self::Reserved(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Response => 0,
            Self::Eval => 1,
            Self::Event => 2,
            Self::FileSend => 3,
            Self::Data => 4,
            Self::FileRecv => 5,
            Self::Reserved(b) => b & 0x07,
        }
    }
}

/// Split a header word into type and length.
pub fn decode_header(word: u16) -> (PacketType, usize) {
    (PacketType::from_bits((word >> 13) as u8), (word & SIZE_MASK) as usize)
}

/// Header word for `kind` with `len` bytes (clamped to [`MAX_PAYLOAD`]).
pub fn encode_header(kind: PacketType, len: usize) -> u16 {
    ((kind.bits() as u16) << 13) | (len.min(MAX_PAYLOAD) as u16)
}

/// Frame `data` as a complete packet. Payload beyond [`MAX_PAYLOAD`] is cut.
pub fn frame(kind: PacketType, data: &[u8]) -> Vec<u8> {
    let data = &data[..data.len().min(MAX_PAYLOAD)];
    let header = encode_header(kind, data.len()).to_be_bytes();
    let mut out = Vec::with_capacity(data.len() + 4);
    out.extend_from_slice(&[DLE, SOH, header[0], header[1]]);
    out.extend_from_slice(data);
    out
}

/// A fully received packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn payload_str(&self) -> &str {
        core::str::from_utf8(&self.payload).unwrap_or("")
    }
}
