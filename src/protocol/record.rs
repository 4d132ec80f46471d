//! Semicolon-delimited record lines
//!
//! Both node roles report to a serial text stream. Every line has the form
//!
//! ```text
//! <origin>;<data type>;<node id>;<field>...<'.'>
//! ```
//!
//! where origin is `GW` (gateway) or `WS` (window sensor). A gateway relays
//! one `SensorData` line per accepted packet:
//!
//! ```text
//! GW;4;19;-45;1;101;30;25.
//! ```
//!
//! and a sensor appends the elapsed cycle time:
//!
//! ```text
//! WS;4;19;-38;1;101;30;25;123ms.
//! ```
//!
//! Lines are produced with `Display` and read back with [`LogLine::parse`].

use core::fmt;
use log::warn;

/// Which role wrote the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Gateway,
    Sensor,
}

impl Origin {
    pub fn tag(self) -> &'static str {
        match self {
            Origin::Gateway => "GW",
            Origin::Sensor => "WS",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "GW" => Some(Origin::Gateway),
            "WS" => Some(Origin::Sensor),
            _ => None,
        }
    }
}

/// Record kind as numbered on the wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Startup = 1,
    WaitForReady = 2,
    Error = 3,
    SensorData = 4,
    Standby = 5,
}

impl DataType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Startup),
            2 => Some(Self::WaitForReady),
            3 => Some(Self::Error),
            4 => Some(Self::SensorData),
            5 => Some(Self::Standby),
            _ => None,
        }
    }
}

/// Failures reported in `Error` records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Supply below the radio's operating minimum
    LowVoltage,
    /// Radio never answered during bring-up
    RadioInit,
    /// Frame too short to hold a sensor packet
    InvalidSize,
    /// Packet checksum mismatch
    InvalidCrc,
    /// Acknowledged request id could not be persisted
    PersistFailed,
}

impl Fault {
    const ALL: [Fault; 5] = [
        Fault::LowVoltage,
        Fault::RadioInit,
        Fault::InvalidSize,
        Fault::InvalidCrc,
        Fault::PersistFailed,
    ];

    pub fn message(self) -> &'static str {
        match self {
            Fault::LowVoltage => "Low voltage",
            Fault::RadioInit => "Can not initialize RFM",
            Fault::InvalidSize => "Invalid message size",
            Fault::InvalidCrc => "Invalid CRC",
            Fault::PersistFailed => "Can not store request ID in EEPROM",
        }
    }

    fn from_message(message: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|fault| fault.message() == message)
    }
}

/// One delivered (or attempted) sensor report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub node_id: u8,
    /// Signal strength of the last received frame, dBm
    pub rssi: i16,
    pub state: u8,
    pub request_id: u16,
    /// Supply in tenths of a volt
    pub supply: u8,
    pub temperature: u8,
    /// Time since the sensor woke; gateway lines leave this out
    pub elapsed_ms: Option<u32>,
}

/// Record content, independent of origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Startup { node_id: u8, clock_hz: u32, supply: u8 },
    WaitForReady { node_id: u8, elapsed_ms: u32 },
    Error { node_id: u8, fault: Fault },
    SensorData(Reading),
    Standby { node_id: u8, elapsed_ms: u32 },
}

impl Record {
    pub fn data_type(&self) -> DataType {
        match self {
            Record::Startup { .. } => DataType::Startup,
            Record::WaitForReady { .. } => DataType::WaitForReady,
            Record::Error { .. } => DataType::Error,
            Record::SensorData(_) => DataType::SensorData,
            Record::Standby { .. } => DataType::Standby,
        }
    }

    pub fn node_id(&self) -> u8 {
        match *self {
            Record::Startup { node_id, .. }
            | Record::WaitForReady { node_id, .. }
            | Record::Error { node_id, .. }
            | Record::Standby { node_id, .. } => node_id,
            Record::SensorData(reading) => reading.node_id,
        }
    }
}

/// A complete record line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLine {
    pub origin: Origin,
    pub record: Record,
}

/// Reasons a text line is not a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordParseError {
    /// Line does not end with '.'
    Unterminated,
    UnknownOrigin,
    UnknownType,
    /// Wrong number of fields for the record type
    FieldCount,
    /// Field is not a number in range
    BadNumber,
    UnknownFault,
}

impl fmt::Display for RecordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unterminated => write!(f, "missing terminator"),
            Self::UnknownOrigin => write!(f, "unknown origin"),
            Self::UnknownType => write!(f, "unknown data type"),
            Self::FieldCount => write!(f, "wrong number of fields"),
            Self::BadNumber => write!(f, "malformed number"),
            Self::UnknownFault => write!(f, "unknown error message"),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{}",
            self.origin.tag(),
            self.record.data_type() as u8,
            self.record.node_id()
        )?;
        match self.record {
            Record::Startup {
                clock_hz, supply, ..
            } => write!(f, ";{};{}", clock_hz, supply)?,
            Record::WaitForReady { elapsed_ms, .. } | Record::Standby { elapsed_ms, .. } => {
                write!(f, ";{}ms", elapsed_ms)?
            }
            Record::Error { fault, .. } => write!(f, ";{}", fault.message())?,
            Record::SensorData(reading) => {
                write!(
                    f,
                    ";{};{};{};{};{}",
                    reading.rssi,
                    reading.state,
                    reading.request_id,
                    reading.supply,
                    reading.temperature
                )?;
                if let Some(elapsed_ms) = reading.elapsed_ms {
                    write!(f, ";{}ms", elapsed_ms)?;
                }
            }
        }
        write!(f, ".")
    }
}

fn number<T: core::str::FromStr>(field: &str) -> Result<T, RecordParseError> {
    field.parse().map_err(|_| RecordParseError::BadNumber)
}

fn millis(field: &str) -> Result<u32, RecordParseError> {
    field
        .strip_suffix("ms")
        .ok_or(RecordParseError::BadNumber)
        .and_then(number)
}

impl LogLine {
    pub fn new(origin: Origin, record: Record) -> Self {
        Self { origin, record }
    }

    /// Parse one line; surrounding whitespace is ignored
    pub fn parse(line: &str) -> Result<Self, RecordParseError> {
        let body = line
            .trim()
            .strip_suffix('.')
            .ok_or(RecordParseError::Unterminated)?;

        let mut fields: heapless::Vec<&str, 9> = heapless::Vec::new();
        for field in body.split(';') {
            fields.push(field).map_err(|_| RecordParseError::FieldCount)?;
        }
        if fields.len() < 3 {
            return Err(RecordParseError::FieldCount);
        }

        let origin = Origin::from_tag(fields[0]).ok_or(RecordParseError::UnknownOrigin)?;
        let data_type = DataType::from_byte(number(fields[1])?)
            .ok_or(RecordParseError::UnknownType)?;
        let node_id: u8 = number(fields[2])?;
        let rest = &fields[3..];

        let record = match (data_type, rest) {
            (DataType::Startup, [clock, supply]) => Record::Startup {
                node_id,
                clock_hz: number(clock)?,
                supply: number(supply)?,
            },
            (DataType::WaitForReady, [elapsed]) => Record::WaitForReady {
                node_id,
                elapsed_ms: millis(elapsed)?,
            },
            (DataType::Standby, [elapsed]) => Record::Standby {
                node_id,
                elapsed_ms: millis(elapsed)?,
            },
            (DataType::Error, [message]) => Record::Error {
                node_id,
                fault: Fault::from_message(message).ok_or(RecordParseError::UnknownFault)?,
            },
            (DataType::SensorData, [rssi, state, request_id, supply, temperature, tail @ ..])
                if tail.len() <= 1 =>
            {
                Record::SensorData(Reading {
                    node_id,
                    rssi: number(rssi)?,
                    state: number(state)?,
                    request_id: number(request_id)?,
                    supply: number(supply)?,
                    temperature: number(temperature)?,
                    elapsed_ms: match tail {
                        [elapsed] => Some(millis(elapsed)?),
                        _ => None,
                    },
                })
            }
            _ => return Err(RecordParseError::FieldCount),
        };

        Ok(Self { origin, record })
    }
}

/// Write `record` as one line to `sink`
///
/// A sink failure is logged and the line dropped; the radio loop carries on.
pub fn emit<W: fmt::Write>(sink: &mut W, origin: Origin, record: Record) {
    if writeln!(sink, "{}", LogLine::new(origin, record)).is_err() {
        warn!(
            "Record sink rejected {:?} line for node {}",
            record.data_type(),
            record.node_id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(elapsed_ms: Option<u32>) -> Reading {
        Reading {
            node_id: 19,
            rssi: -45,
            state: 1,
            request_id: 101,
            supply: 30,
            temperature: 25,
            elapsed_ms,
        }
    }

    #[test]
    fn test_gateway_sensor_data_line() {
        let line = LogLine::new(Origin::Gateway, Record::SensorData(reading(None)));
        assert_eq!(line.to_string(), "GW;4;19;-45;1;101;30;25.");
    }

    #[test]
    fn test_sensor_data_line_with_elapsed() {
        let line = LogLine::new(Origin::Sensor, Record::SensorData(reading(Some(123))));
        assert_eq!(line.to_string(), "WS;4;19;-45;1;101;30;25;123ms.");
    }

    #[test]
    fn test_error_lines() {
        let line = LogLine::new(
            Origin::Gateway,
            Record::Error {
                node_id: 19,
                fault: Fault::InvalidCrc,
            },
        );
        assert_eq!(line.to_string(), "GW;3;19;Invalid CRC.");

        let line = LogLine::new(
            Origin::Sensor,
            Record::Error {
                node_id: 19,
                fault: Fault::LowVoltage,
            },
        );
        assert_eq!(line.to_string(), "WS;3;19;Low voltage.");
    }

    #[test]
    fn test_startup_and_phase_lines() {
        let startup = LogLine::new(
            Origin::Gateway,
            Record::Startup {
                node_id: 1,
                clock_hz: 240_000_000,
                supply: 33,
            },
        );
        assert_eq!(startup.to_string(), "GW;1;1;240000000;33.");

        let standby = LogLine::new(
            Origin::Sensor,
            Record::Standby {
                node_id: 19,
                elapsed_ms: 80,
            },
        );
        assert_eq!(standby.to_string(), "WS;5;19;80ms.");
    }

    #[test]
    fn test_parse_reads_back_every_kind() {
        let lines = [
            "GW;1;1;240000000;33.",
            "WS;2;19;45ms.",
            "GW;3;7;Invalid message size.",
            "WS;3;19;Can not store request ID in EEPROM.",
            "GW;4;7;-67;0;385;33;18.",
            "WS;4;19;-45;1;101;30;25;123ms.",
            "WS;5;19;80ms.",
        ];
        for text in lines {
            let parsed = LogLine::parse(text).unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn test_parse_gateway_reading() {
        let parsed = LogLine::parse("GW;4;7;-67;0;385;33;18.\r\n").unwrap();
        assert_eq!(parsed.origin, Origin::Gateway);
        match parsed.record {
            Record::SensorData(reading) => {
                assert_eq!(reading.node_id, 7);
                assert_eq!(reading.rssi, -67);
                assert_eq!(reading.state, 0);
                assert_eq!(reading.request_id, 385);
                assert_eq!(reading.supply, 33);
                assert_eq!(reading.temperature, 18);
                assert_eq!(reading.elapsed_ms, None);
            }
            other => panic!("Expected SensorData, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            LogLine::parse("GW;4;7;-67;0;385;33;18"),
            Err(RecordParseError::Unterminated)
        );
        assert_eq!(
            LogLine::parse("XX;4;7;-67;0;385;33;18."),
            Err(RecordParseError::UnknownOrigin)
        );
        assert_eq!(LogLine::parse("GW;9;7;1."), Err(RecordParseError::UnknownType));
        assert_eq!(LogLine::parse("GW;4;7;-67;0."), Err(RecordParseError::FieldCount));
        assert_eq!(
            LogLine::parse("GW;4;7;loud;0;385;33;18."),
            Err(RecordParseError::BadNumber)
        );
        assert_eq!(
            LogLine::parse("GW;3;7;Something odd."),
            Err(RecordParseError::UnknownFault)
        );
        assert_eq!(LogLine::parse("."), Err(RecordParseError::FieldCount));
    }

    #[test]
    fn test_emit_appends_newline() {
        let mut out = String::new();
        emit(
            &mut out,
            Origin::Gateway,
            Record::Error {
                node_id: 3,
                fault: Fault::InvalidSize,
            },
        );
        assert_eq!(out, "GW;3;3;Invalid message size.\n");
    }

    #[test]
    fn test_emit_survives_rejecting_sink() {
        struct Unplugged(usize);

        impl fmt::Write for Unplugged {
            fn write_str(&mut self, _: &str) -> fmt::Result {
                self.0 += 1;
                Err(fmt::Error)
            }
        }

        let mut sink = Unplugged(0);
        emit(&mut sink, Origin::Sensor, Record::Standby { node_id: 19, elapsed_ms: 80 });
        emit(&mut sink, Origin::Sensor, Record::Standby { node_id: 19, elapsed_ms: 81 });
        assert_eq!(sink.0, 2);
    }
}
