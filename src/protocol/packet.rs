//! Sensor packet layout
//!
//! ```text
//! [state][request_id_lo][request_id_hi][supply][temperature][crc7][0xFF]
//! ```
//!
//! - `state`: switch level on the way in; `128 + state` in the gateway reply
//! - `request_id`: 16-bit little-endian echo token
//! - `supply`: supply voltage in tenths of a volt
//! - `temperature`: radio die temperature in degrees centigrade
//! - `crc7`: checksum over the first five bytes
//! - last byte is a fixed sentinel, written but never checked

use super::crc7::crc7;
use crate::config::protocol::PACKET_SIZE;

/// Bytes covered by the checksum
const CHECKED_LEN: usize = PACKET_SIZE - 2;

/// Written in the last byte of every packet
pub const SENTINEL: u8 = 0xFF;

/// Added to the state byte of a gateway reply
pub const REPLY_FLAG: u8 = 0x80;

/// Reasons a received payload is not a sensor packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer than [`PACKET_SIZE`] bytes
    TooShort,
    /// Checksum byte does not match the covered bytes
    BadCrc { expected: u8, received: u8 },
}

/// Encode a request id as it appears on the wire
pub fn encode_request_id(id: u16) -> [u8; 2] {
    id.to_le_bytes()
}

/// Decode a request id from its wire bytes
pub fn decode_request_id(lo: u8, hi: u8) -> u16 {
    u16::from_le_bytes([lo, hi])
}

/// Application packet exchanged between a sensor and the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPacket {
    pub state: u8,
    pub request_id: u16,
    pub supply: u8,
    pub temperature: u8,
}

impl SensorPacket {
    /// Serialise with a freshly computed checksum
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let id = encode_request_id(self.request_id);
        let mut bytes = [
            self.state,
            id[0],
            id[1],
            self.supply,
            self.temperature,
            0,
            SENTINEL,
        ];
        bytes[CHECKED_LEN] = crc7(&bytes[..CHECKED_LEN]);
        bytes
    }

    /// Parse and verify a received payload; trailing bytes are ignored
    pub fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() < PACKET_SIZE {
            return Err(PacketError::TooShort);
        }

        let expected = crc7(&payload[..CHECKED_LEN]);
        let received = payload[CHECKED_LEN];
        if expected != received {
            return Err(PacketError::BadCrc { expected, received });
        }

        Ok(Self {
            state: payload[0],
            request_id: decode_request_id(payload[1], payload[2]),
            supply: payload[3],
            temperature: payload[4],
        })
    }

    /// Build the gateway's acknowledgement for this packet
    ///
    /// The request id, supply and temperature are echoed; the state gains
    /// the reply flag.
    pub fn reply(&self) -> Self {
        Self {
            state: self.state.wrapping_add(REPLY_FLAG),
            ..*self
        }
    }

    /// Whether this packet was built by [`SensorPacket::reply`]
    pub fn is_reply(&self) -> bool {
        self.state & REPLY_FLAG != 0
    }
}
