//! Packet radio trait for abstraction and testability
//!
//! The protocol engines drive the radio only through [`PacketRadio`], so the
//! RFM69 driver can be swapped with [`mock::MockRadio`] in tests.

use crate::config::protocol::{FRAME_HEADER_SIZE, MAX_PAYLOAD};
use crate::poll::Timeout;
use heapless::Vec;

/// Control byte flag: this frame is an acknowledgement
pub const CTL_SEND_ACK: u8 = 0x80;
/// Control byte flag: the sender wants an acknowledgement
pub const CTL_REQUEST_ACK: u8 = 0x40;

/// Errors that can occur during radio operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// SPI or chip-select failure
    Bus,
    /// Scratch register probe or mode-ready wait failed during initialisation
    NotResponding,
    /// Mode-ready was not signalled in time
    ModeTimeout,
    /// Temperature or RSSI measurement did not complete
    MeasurementTimeout,
}

impl core::fmt::Display for RadioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "bus error"),
            Self::NotResponding => write!(f, "radio not responding"),
            Self::ModeTimeout => write!(f, "mode change timed out"),
            Self::MeasurementTimeout => write!(f, "measurement timed out"),
        }
    }
}

/// Frequency band of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Mhz315,
    Mhz433,
    Mhz868,
    Mhz915,
}

/// Radio settings applied during node bring-up
#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub band: Band,
    pub network_id: u8,
    /// Output power level, 0 (min) to 31 (max)
    pub power_level: u8,
    /// Enable the PA1+PA2 path of the H/HW/HCW variants
    pub high_power: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        use crate::config::radio_defaults;

        Self {
            band: radio_defaults::BAND,
            network_id: radio_defaults::NETWORK_ID,
            power_level: radio_defaults::POWER_LEVEL,
            high_power: radio_defaults::HIGH_POWER,
        }
    }
}

/// Received frame with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    pub target: u8,
    pub sender: u8,
    pub control: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
    /// Received Signal Strength Indicator in dBm, captured before the FIFO read
    pub rssi: i16,
}

impl RadioFrame {
    /// Value of the length byte: header plus payload
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// The sender asked for an acknowledgement
    pub fn ack_requested(&self) -> bool {
        self.control & CTL_REQUEST_ACK != 0
    }

    /// This frame is an acknowledgement
    pub fn ack_received(&self) -> bool {
        self.control & CTL_SEND_ACK != 0
    }
}

/// Control byte for an outgoing frame; an acknowledgement never requests one
pub fn control_byte(request_ack: bool, send_ack: bool) -> u8 {
    if send_ack {
        CTL_SEND_ACK
    } else if request_ack {
        CTL_REQUEST_ACK
    } else {
        0
    }
}

/// Abstract packet radio interface
///
/// Every call blocks; waits are bounded unless a [`Timeout::Forever`] is
/// passed explicitly.
pub trait PacketRadio {
    /// Probe the chip, write the start-up configuration and set the address
    fn initialize(&mut self, band: Band, node_id: u8, network_id: u8) -> Result<(), RadioError>;

    /// Switch the PA1+PA2 high power path
    fn set_high_power(&mut self, on: bool) -> Result<(), RadioError>;

    /// Output power level, clamped to 0..=31
    fn set_power_level(&mut self, level: u8) -> Result<(), RadioError>;

    /// Arm the receiver
    fn receive_begin(&mut self) -> Result<(), RadioError>;

    /// Transmit one frame and re-arm the receiver
    ///
    /// Returns the milliseconds spent waiting for the packet-sent signal.
    /// A missing signal is not an error; the wait is bounded.
    fn send(
        &mut self,
        to: u8,
        payload: &[u8],
        request_ack: bool,
        send_ack: bool,
    ) -> Result<u32, RadioError>;

    /// Read a frame if the ready line is asserted
    fn try_receive(&mut self) -> Option<RadioFrame>;

    /// True while the receiver is armed
    fn is_receiving(&self) -> bool;

    /// Wait for the first decoded frame or until `timeout` elapses
    fn wait_for_response(&mut self, timeout: Timeout) -> Option<RadioFrame>;

    /// Current RSSI in dBm, optionally triggering a fresh measurement
    fn read_rssi(&mut self, force_trigger: bool) -> Result<i16, RadioError>;

    /// Die temperature in degrees centigrade plus `calibration`
    fn read_temperature(&mut self, calibration: i8) -> Result<u8, RadioError>;

    /// Enter sleep mode
    fn sleep(&mut self) -> Result<(), RadioError>;
}
