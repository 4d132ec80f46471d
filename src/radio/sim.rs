//! Register-level RFM69 model for driver tests
//!
//! Implements `embedded-hal` SPI and pin traits over a shared chip state.
//! It models what the driver relies on: register storage, the FIFO in both
//! directions, mode-ready, packet-sent and payload-ready flags, the DIO0
//! mapping and the self-clearing measurement triggers.

use super::registers::{dio0, irq1, irq2, opmode, osc, packet2, reg, rssi, temp, WRITE_FLAG};
use core::convert::Infallible;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, ErrorKind, SpiBus};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const DIO0_MAPPING_MASK: u8 = 0xC0;
const MODE_MASK: u8 = 0x1C;

pub struct ChipState {
    regs: [u8; 128],
    rx_fifo: VecDeque<u8>,
    tx_fifo: Vec<u8>,
    transmitted: Vec<Vec<u8>>,
    writes: Vec<(u8, u8)>,
    /// Register address of the open transaction and whether it writes
    cursor: Option<(u8, bool)>,
    selected: bool,
    alive: bool,
    mode_ready: bool,
    packet_sent: bool,
    bus_fault: bool,
    /// Register whose writes the chip drops
    ignored: Option<u8>,
    payload_ready: bool,
    dio0: bool,
}

impl ChipState {
    fn new() -> Self {
        Self {
            regs: [0; 128],
            rx_fifo: VecDeque::new(),
            tx_fifo: Vec::new(),
            transmitted: Vec::new(),
            writes: Vec::new(),
            cursor: None,
            selected: false,
            alive: true,
            mode_ready: true,
            packet_sent: true,
            bus_fault: false,
            ignored: None,
            payload_ready: false,
            dio0: false,
        }
    }

    fn mode(&self) -> u8 {
        self.regs[reg::OPMODE as usize] & MODE_MASK
    }

    fn update_flags(&mut self) {
        let mode = self.mode();
        let mut flags = self.regs[reg::IRQFLAGS2 as usize];
        if self.payload_ready {
            flags |= irq2::PAYLOAD_READY;
        } else {
            flags &= !irq2::PAYLOAD_READY;
        }
        if mode != opmode::TRANSMITTER {
            flags &= !irq2::PACKET_SENT;
        }
        self.regs[reg::IRQFLAGS2 as usize] = flags;

        self.dio0 = match self.regs[reg::DIOMAPPING1 as usize] & DIO0_MAPPING_MASK {
            dio0::PACKET_SENT => mode == opmode::TRANSMITTER && flags & irq2::PACKET_SENT != 0,
            dio0::PAYLOAD_READY => mode == opmode::RECEIVER && flags & irq2::PAYLOAD_READY != 0,
            _ => false,
        };
    }

    fn clear_rx(&mut self) {
        self.rx_fifo.clear();
        self.payload_ready = false;
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.writes.push((addr, value));
        if self.ignored == Some(addr) {
            return;
        }
        let index = addr as usize;
        match addr {
            reg::OPMODE => {
                self.regs[index] = value;
                if self.mode_ready {
                    self.regs[reg::IRQFLAGS1 as usize] |= irq1::MODE_READY;
                } else {
                    self.regs[reg::IRQFLAGS1 as usize] &= !irq1::MODE_READY;
                }
                if self.mode() == opmode::TRANSMITTER && !self.tx_fifo.is_empty() {
                    self.transmitted.push(std::mem::take(&mut self.tx_fifo));
                    if self.packet_sent {
                        self.regs[reg::IRQFLAGS2 as usize] |= irq2::PACKET_SENT;
                    }
                }
            }
            reg::IRQFLAGS1 => {}
            reg::IRQFLAGS2 => {
                if value & irq2::FIFO_OVERRUN != 0 {
                    self.tx_fifo.clear();
                    self.clear_rx();
                }
            }
            reg::RSSICONFIG if value & rssi::START != 0 => self.regs[index] = rssi::DONE,
            reg::TEMP1 if value & temp::MEAS_START != 0 => self.regs[index] = 0,
            reg::OSC1 if value & osc::RCCAL_START != 0 => self.regs[index] = osc::RCCAL_DONE,
            reg::PACKETCONFIG2 if value & packet2::RX_RESTART != 0 => {
                self.regs[index] = value & !packet2::RX_RESTART;
                self.clear_rx();
            }
            _ => self.regs[index] = value,
        }
        self.update_flags();
    }

    fn exchange(&mut self, out: u8) -> u8 {
        if !self.alive {
            return 0;
        }
        let cursor = self.cursor;
        match cursor {
            None => {
                self.cursor = Some((out & !WRITE_FLAG, out & WRITE_FLAG != 0));
                0
            }
            Some((reg::FIFO, true)) => {
                self.tx_fifo.push(out);
                0
            }
            Some((reg::FIFO, false)) => {
                let value = self.rx_fifo.pop_front().unwrap_or(0);
                if self.rx_fifo.is_empty() {
                    self.payload_ready = false;
                    self.update_flags();
                }
                value
            }
            Some((addr, true)) => {
                self.write_register(addr, out);
                self.cursor = Some((addr.wrapping_add(1) & 0x7F, true));
                0
            }
            Some((addr, false)) => {
                self.cursor = Some((addr.wrapping_add(1) & 0x7F, false));
                self.regs[addr as usize]
            }
        }
    }
}

/// Test-side view of the simulated chip
#[derive(Clone)]
pub struct ChipHandle(Rc<RefCell<ChipState>>);

impl ChipHandle {
    pub fn reg(&self, addr: u8) -> u8 {
        self.0.borrow().regs[addr as usize]
    }

    /// Set a register without side effects
    pub fn poke(&self, addr: u8, value: u8) {
        self.0.borrow_mut().regs[addr as usize] = value;
    }

    pub fn set_alive(&self, alive: bool) {
        self.0.borrow_mut().alive = alive;
    }

    pub fn set_mode_ready(&self, responds: bool) {
        self.0.borrow_mut().mode_ready = responds;
    }

    pub fn set_packet_sent(&self, responds: bool) {
        self.0.borrow_mut().packet_sent = responds;
    }

    pub fn set_bus_fault(&self, fault: bool) {
        self.0.borrow_mut().bus_fault = fault;
    }

    /// Drop every write to `addr`, as a chip that has not woken up yet
    pub fn ignore_writes(&self, addr: u8) {
        self.0.borrow_mut().ignored = Some(addr);
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.0.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.0.borrow_mut().writes.clear();
    }

    /// Frames put on the air: length byte, header and payload
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.0.borrow().transmitted.clone()
    }

    pub fn nss_released(&self) -> bool {
        !self.0.borrow().selected
    }

    /// Receive a frame given as target, sender, control and payload
    pub fn inject(&self, frame: &[u8]) {
        let mut raw = vec![frame.len() as u8];
        raw.extend_from_slice(frame);
        self.inject_raw(&raw);
    }

    /// Fill the receive FIFO with exactly `bytes`
    pub fn inject_raw(&self, bytes: &[u8]) {
        let mut chip = self.0.borrow_mut();
        chip.rx_fifo = bytes.iter().copied().collect();
        chip.payload_ready = true;
        chip.update_flags();
    }
}

pub struct SimSpi(Rc<RefCell<ChipState>>);

impl SimSpi {
    fn exchange(&mut self, out: u8) -> Result<u8, ErrorKind> {
        let mut chip = self.0.borrow_mut();
        if chip.bus_fault {
            return Err(ErrorKind::Other);
        }
        Ok(chip.exchange(out))
    }
}

impl spi::ErrorType for SimSpi {
    type Error = ErrorKind;
}

impl SpiBus for SimSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.exchange(0)?;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.exchange(word)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        for index in 0..read.len().max(write.len()) {
            let word = self.exchange(write.get(index).copied().unwrap_or(0))?;
            if let Some(slot) = read.get_mut(index) {
                *slot = word;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.exchange(*word)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct SimNss(Rc<RefCell<ChipState>>);

impl digital::ErrorType for SimNss {
    type Error = Infallible;
}

impl OutputPin for SimNss {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut chip = self.0.borrow_mut();
        chip.selected = true;
        chip.cursor = None;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut chip = self.0.borrow_mut();
        chip.selected = false;
        chip.cursor = None;
        Ok(())
    }
}

pub struct SimDio0(Rc<RefCell<ChipState>>);

impl digital::ErrorType for SimDio0 {
    type Error = Infallible;
}

impl InputPin for SimDio0 {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow().dio0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow().dio0)
    }
}

/// A live chip and the bus, pins and handle wired to it
pub fn chip() -> (SimSpi, SimNss, SimDio0, ChipHandle) {
    let state = Rc::new(RefCell::new(ChipState::new()));
    (
        SimSpi(state.clone()),
        SimNss(state.clone()),
        SimDio0(state.clone()),
        ChipHandle(state),
    )
}
