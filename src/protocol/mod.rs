//! Application protocol: sensor packets, their checksum and record lines

pub mod crc7;
pub mod packet;
pub mod record;

pub use crc7::crc7;
pub use packet::{PacketError, SensorPacket};
pub use record::{emit, DataType, Fault, LogLine, Origin, Reading, Record, RecordParseError};
