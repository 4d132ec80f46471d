//! RFM69 transceiver driver
//!
//! Implements [`PacketRadio`] over a blocking `SpiBus` with manual NSS
//! control and the DIO0 line as the only interrupt source. DIO0 is mapped
//! to payload-ready while receiving and to packet-sent while transmitting.

use super::bus::RegisterBus;
use super::mode::{self, RadioMode, Step};
use super::registers::{
    self, dio0, irq1, irq2, ocp, osc, packet2, palevel, reg, rssi, temp, testpa, FSTEP_SHIFT,
    FXOSC_HZ, PROBE_PATTERNS, WRITE_FLAG,
};
use super::traits::{control_byte, Band, PacketRadio, RadioError, RadioFrame};
use crate::config::protocol::{FRAME_HEADER_SIZE, MAX_PAYLOAD};
use crate::config::timing::{MEASUREMENT_TIMEOUT_MS, PROBE_TIMEOUT_MS, TX_LIMIT_MS};
use crate::hal::Clock;
use crate::poll::{elapsed_since, poll_until, Timeout};
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use heapless::Vec;
use log::{debug, warn};

/// Largest length byte the FIFO can hold a frame for
const MAX_FRAME_LEN: usize = FRAME_HEADER_SIZE + MAX_PAYLOAD;

/// Highest output power level
const MAX_POWER_LEVEL: u8 = 31;

/// Control pins for the RFM69
pub struct Rfm69Pins<Nss, Dio0> {
    pub nss: Nss,
    pub dio0: Dio0,
}

/// RFM69 packet radio driver
///
/// Uses dependency injection for SPI, pins and the millisecond clock.
pub struct Rfm69<Spi, Nss, Dio0, C> {
    bus: RegisterBus<Spi, Nss>,
    dio0: Dio0,
    clock: C,
    mode: RadioMode,
    address: u8,
    power_level: u8,
    high_power: bool,
}

impl<Spi, Nss, Dio0, C> Rfm69<Spi, Nss, Dio0, C>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Dio0: InputPin,
    C: Clock + Clone,
{
    /// Create a new driver; the chip is assumed asleep until initialised
    pub fn new(spi: Spi, pins: Rfm69Pins<Nss, Dio0>, clock: C) -> Self {
        Self {
            bus: RegisterBus::new(spi, pins.nss),
            dio0: pins.dio0,
            clock,
            mode: RadioMode::Sleep,
            address: 0,
            power_level: MAX_POWER_LEVEL,
            high_power: false,
        }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Change the operating mode
    ///
    /// Receive and transmit pass through standby. With `wait_for_ready` the
    /// call blocks until the chip reports mode-ready, bounded by the probe
    /// timeout.
    pub fn set_mode(&mut self, target: RadioMode, wait_for_ready: bool) -> Result<(), RadioError> {
        match mode::plan(self.mode, target, self.high_power) {
            Step::Stay => Ok(()),
            Step::ViaStandby => {
                self.set_mode(RadioMode::Standby, true)?;
                self.set_mode(target, wait_for_ready)
            }
            Step::Direct { pa_boost } => {
                if let Some(on) = pa_boost {
                    self.set_high_power_regs(on)?;
                }
                let current = self.bus.read_reg(reg::OPMODE)?;
                self.bus
                    .write_reg(reg::OPMODE, mode::opmode_value(current, target))?;
                self.mode = target;

                if wait_for_ready && !self.wait_mode_ready() {
                    warn!("RFM69: mode {:?} not ready after {} ms", target, PROBE_TIMEOUT_MS);
                    return Err(RadioError::ModeTimeout);
                }
                Ok(())
            }
        }
    }

    fn wait_mode_ready(&mut self) -> bool {
        poll_until(&self.clock, Timeout::Ms(PROBE_TIMEOUT_MS), || {
            matches!(self.bus.read_reg(reg::IRQFLAGS1), Ok(flags) if flags & irq1::MODE_READY != 0)
        })
    }

    fn set_high_power_regs(&mut self, on: bool) -> Result<(), RadioError> {
        let (pa1, pa2) = if on {
            (testpa::PA1_BOOST, testpa::PA2_BOOST)
        } else {
            (testpa::PA1_NORMAL, testpa::PA2_NORMAL)
        };
        self.bus.write_reg(reg::TESTPA1, pa1)?;
        self.bus.write_reg(reg::TESTPA2, pa2)
    }

    pub fn set_address(&mut self, address: u8) -> Result<(), RadioError> {
        self.address = address;
        self.bus.write_reg(reg::NODEADRS, address)
    }

    /// Change the network id (second sync byte)
    pub fn set_network(&mut self, network_id: u8) -> Result<(), RadioError> {
        self.bus.write_reg(reg::SYNCVALUE2, network_id)
    }

    /// Carrier frequency in Hz
    pub fn frequency_hz(&mut self) -> Result<u32, RadioError> {
        let msb = self.bus.read_reg(reg::FRF_MSB)?;
        let mid = self.bus.read_reg(reg::FRF_MID)?;
        let lsb = self.bus.read_reg(reg::FRF_LSB)?;
        let frf = u32::from_be_bytes([0, msb, mid, lsb]) as u64;
        Ok(((frf * FXOSC_HZ) >> FSTEP_SHIFT) as u32)
    }

    /// Retune the carrier, restoring the current mode afterwards
    pub fn set_frequency_hz(&mut self, hz: u32) -> Result<(), RadioError> {
        let previous = self.mode;
        if previous == RadioMode::Transmit {
            self.set_mode(RadioMode::Receive, false)?;
        }

        let frf = (((hz as u64) << FSTEP_SHIFT) / FXOSC_HZ) as u32;
        let [_, msb, mid, lsb] = frf.to_be_bytes();
        self.bus.write_reg(reg::FRF_MSB, msb)?;
        self.bus.write_reg(reg::FRF_MID, mid)?;
        self.bus.write_reg(reg::FRF_LSB, lsb)?;

        // The new frequency is latched on the way through the synthesizer
        if previous == RadioMode::Receive {
            self.set_mode(RadioMode::Synthesizer, false)?;
        }
        self.set_mode(previous, false)
    }

    /// Calibrate the internal RC oscillator
    pub fn rc_calibration(&mut self) -> Result<(), RadioError> {
        self.bus.write_reg(reg::OSC1, osc::RCCAL_START)?;
        let done = poll_until(&self.clock, Timeout::Ms(MEASUREMENT_TIMEOUT_MS), || {
            matches!(self.bus.read_reg(reg::OSC1), Ok(value) if value & osc::RCCAL_DONE != 0)
        });
        if done {
            Ok(())
        } else {
            Err(RadioError::MeasurementTimeout)
        }
    }

    fn ready_line(&mut self) -> bool {
        self.dio0.is_high().unwrap_or(false)
    }

    /// Read a received frame
    ///
    /// Only acts in receive mode with payload-ready set. Captures RSSI,
    /// drops to standby for the FIFO read, then re-arms the receiver.
    pub fn read_data(&mut self) -> Option<RadioFrame> {
        if self.mode != RadioMode::Receive {
            return None;
        }
        let flags = self.bus.read_reg(reg::IRQFLAGS2).ok()?;
        if flags & irq2::PAYLOAD_READY == 0 {
            return None;
        }

        let rssi = self.read_rssi(false).ok()?;
        if let Err(e) = self.set_mode(RadioMode::Standby, true) {
            // Payload stays in the FIFO for the next attempt
            warn!("RFM69: frame read aborted: {}", e);
            let _ = self.set_mode(RadioMode::Receive, false);
            return None;
        }

        let mut buf = [0u8; MAX_FRAME_LEN];
        let read = self.bus.read_fifo(&mut buf);
        let _ = self.set_mode(RadioMode::Receive, false);

        let length = read.ok()?;
        if !(FRAME_HEADER_SIZE..=MAX_FRAME_LEN).contains(&length) {
            debug!("RFM69: discarding frame with length byte {}", length);
            return None;
        }

        let mut payload = Vec::new();
        payload
            .extend_from_slice(&buf[FRAME_HEADER_SIZE..length])
            .ok()?;

        Some(RadioFrame {
            target: buf[0],
            sender: buf[1],
            control: buf[2],
            payload,
            rssi,
        })
    }

    /// Load the FIFO, transmit and return to standby
    ///
    /// Leaves the receiver disarmed; `send` re-arms it on every path.
    fn transmit(
        &mut self,
        to: u8,
        payload: &[u8],
        request_ack: bool,
        send_ack: bool,
    ) -> Result<u32, RadioError> {
        self.set_mode(RadioMode::Standby, true)?;
        self.bus.write_reg(reg::DIOMAPPING1, dio0::PACKET_SENT)?;

        let body = &payload[..payload.len().min(MAX_PAYLOAD)];
        let header = [
            reg::FIFO | WRITE_FLAG,
            (body.len() + FRAME_HEADER_SIZE) as u8,
            to,
            self.address,
            control_byte(request_ack, send_ack),
        ];
        self.bus.write_fifo(&header, body)?;

        self.set_mode(RadioMode::Transmit, false)?;
        let start = self.clock.now_ms();
        let sent = poll_until(&self.clock, Timeout::Ms(TX_LIMIT_MS), || {
            self.dio0.is_high().unwrap_or(false)
        });
        let elapsed = elapsed_since(&self.clock, start);
        if !sent {
            warn!("RFM69: packet sent not signalled after {} ms", elapsed);
        }

        self.set_mode(RadioMode::Standby, true)?;
        Ok(elapsed)
    }

    /// Give back the bus, chip select and DIO0
    pub fn release(self) -> (Spi, Nss, Dio0) {
        let (spi, nss) = self.bus.release();
        (spi, nss, self.dio0)
    }
}

impl<Spi, Nss, Dio0, C> PacketRadio for Rfm69<Spi, Nss, Dio0, C>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Dio0: InputPin,
    C: Clock + Clone,
{
    fn initialize(&mut self, band: Band, node_id: u8, network_id: u8) -> Result<(), RadioError> {
        // A slow probe is tolerated; only the mode-ready check below is fatal
        for pattern in PROBE_PATTERNS {
            let answered = poll_until(&self.clock, Timeout::Ms(PROBE_TIMEOUT_MS), || {
                self.bus.write_reg(reg::SYNCVALUE1, pattern).is_ok()
                    && self.bus.read_reg(reg::SYNCVALUE1) == Ok(pattern)
            });
            if !answered {
                warn!("RFM69: no answer to probe {:#04x}", pattern);
            }
        }

        for (addr, value) in registers::startup_sequence(band, network_id) {
            self.bus.write_reg(addr, value)?;
        }

        // Fresh power-up: low power path, mode written again below
        self.high_power = false;
        self.mode = RadioMode::Sleep;
        self.set_mode(RadioMode::Standby, false)?;
        if !self.wait_mode_ready() {
            debug!("RFM69: standby not reached");
            return Err(RadioError::NotResponding);
        }

        self.set_address(node_id)?;
        debug!("RFM69: initialised as node {} on network {}", node_id, network_id);
        Ok(())
    }

    fn set_high_power(&mut self, on: bool) -> Result<(), RadioError> {
        self.high_power = on;
        self.bus
            .write_reg(reg::OCP, if on { ocp::OFF } else { ocp::ON })?;
        if on {
            self.bus.modify_reg(
                reg::PALEVEL,
                palevel::POWER_MASK,
                palevel::PA1_ON | palevel::PA2_ON,
            )
        } else {
            self.bus
                .write_reg(reg::PALEVEL, palevel::PA0_ON | self.power_level)
        }
    }

    fn set_power_level(&mut self, level: u8) -> Result<(), RadioError> {
        self.power_level = level.min(MAX_POWER_LEVEL);
        // PA1+PA2 cover the upper half of the range in half as many steps
        let value = if self.high_power {
            self.power_level / 2
        } else {
            self.power_level
        };
        self.bus
            .modify_reg(reg::PALEVEL, !palevel::POWER_MASK, value)
    }

    fn receive_begin(&mut self) -> Result<(), RadioError> {
        let flags = self.bus.read_reg(reg::IRQFLAGS2)?;
        if flags & irq2::PAYLOAD_READY != 0 {
            // Stale payload would block the receiver
            self.bus.modify_reg(
                reg::PACKETCONFIG2,
                packet2::RX_RESTART_MASK,
                packet2::RX_RESTART,
            )?;
        }
        self.bus.write_reg(reg::DIOMAPPING1, dio0::PAYLOAD_READY)?;
        self.set_mode(RadioMode::Receive, false)
    }

    fn send(
        &mut self,
        to: u8,
        payload: &[u8],
        request_ack: bool,
        send_ack: bool,
    ) -> Result<u32, RadioError> {
        let sent = self.transmit(to, payload, request_ack, send_ack);
        let rearmed = self.receive_begin();
        let elapsed = sent?;
        rearmed?;
        Ok(elapsed)
    }

    fn try_receive(&mut self) -> Option<RadioFrame> {
        if !self.ready_line() {
            return None;
        }
        self.read_data()
    }

    fn is_receiving(&self) -> bool {
        self.mode == RadioMode::Receive
    }

    fn wait_for_response(&mut self, timeout: Timeout) -> Option<RadioFrame> {
        let clock = self.clock.clone();
        let mut received = None;
        poll_until(&clock, timeout, || {
            received = self.try_receive();
            received.is_some()
        });
        received
    }

    fn read_rssi(&mut self, force_trigger: bool) -> Result<i16, RadioError> {
        if force_trigger {
            self.bus.write_reg(reg::RSSICONFIG, rssi::START)?;
            let done = poll_until(&self.clock, Timeout::Ms(MEASUREMENT_TIMEOUT_MS), || {
                matches!(self.bus.read_reg(reg::RSSICONFIG), Ok(value) if value & rssi::DONE != 0)
            });
            if !done {
                return Err(RadioError::MeasurementTimeout);
            }
        }
        let raw = self.bus.read_reg(reg::RSSIVALUE)?;
        // Arithmetic shift rounds half-dB steps down
        Ok((-(raw as i16)) >> 1)
    }

    fn read_temperature(&mut self, calibration: i8) -> Result<u8, RadioError> {
        self.set_mode(RadioMode::Standby, true)?;
        self.bus.write_reg(reg::TEMP1, temp::MEAS_START)?;
        let done = poll_until(&self.clock, Timeout::Ms(MEASUREMENT_TIMEOUT_MS), || {
            matches!(self.bus.read_reg(reg::TEMP1), Ok(value) if value & temp::MEAS_RUNNING == 0)
        });
        if !done {
            return Err(RadioError::MeasurementTimeout);
        }
        // Complement gives rising values for rising temperature
        let raw = self.bus.read_reg(reg::TEMP2)?;
        Ok((!raw)
            .wrapping_add_signed(temp::COARSE_COEF)
            .wrapping_add_signed(calibration))
    }

    fn sleep(&mut self) -> Result<(), RadioError> {
        self.set_mode(RadioMode::Sleep, false)
    }
}
