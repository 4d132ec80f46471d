//! RFM69 register map and the fixed start-up configuration

use super::traits::Band;

/// Register addresses
pub mod reg {
    pub const FIFO: u8 = 0x00;
    pub const OPMODE: u8 = 0x01;
    pub const DATAMODUL: u8 = 0x02;
    pub const BITRATE_MSB: u8 = 0x03;
    pub const BITRATE_LSB: u8 = 0x04;
    pub const FDEV_MSB: u8 = 0x05;
    pub const FDEV_LSB: u8 = 0x06;
    pub const FRF_MSB: u8 = 0x07;
    pub const FRF_MID: u8 = 0x08;
    pub const FRF_LSB: u8 = 0x09;
    pub const OSC1: u8 = 0x0A;
    pub const PALEVEL: u8 = 0x11;
    pub const OCP: u8 = 0x13;
    pub const RXBW: u8 = 0x19;
    pub const RSSICONFIG: u8 = 0x23;
    pub const RSSIVALUE: u8 = 0x24;
    pub const DIOMAPPING1: u8 = 0x25;
    pub const DIOMAPPING2: u8 = 0x26;
    pub const IRQFLAGS1: u8 = 0x27;
    pub const IRQFLAGS2: u8 = 0x28;
    pub const RSSITHRESH: u8 = 0x29;
    pub const SYNCCONFIG: u8 = 0x2E;
    pub const SYNCVALUE1: u8 = 0x2F;
    pub const SYNCVALUE2: u8 = 0x30;
    pub const PACKETCONFIG1: u8 = 0x37;
    pub const PAYLOADLENGTH: u8 = 0x38;
    pub const NODEADRS: u8 = 0x39;
    pub const FIFOTHRESH: u8 = 0x3C;
    pub const PACKETCONFIG2: u8 = 0x3D;
    pub const TEMP1: u8 = 0x4E;
    pub const TEMP2: u8 = 0x4F;
    pub const TESTPA1: u8 = 0x5A;
    pub const TESTPA2: u8 = 0x5C;
    pub const TESTDAGC: u8 = 0x6F;
}

/// Address byte flag selecting a register write
pub const WRITE_FLAG: u8 = 0x80;

/// OPMODE mode field
pub mod opmode {
    /// Bits outside the mode field that must be preserved
    pub const KEEP_MASK: u8 = 0xE3;
    pub const SLEEP: u8 = 0x00;
    pub const STANDBY: u8 = 0x04;
    pub const SYNTHESIZER: u8 = 0x08;
    pub const TRANSMITTER: u8 = 0x0C;
    pub const RECEIVER: u8 = 0x10;
}

pub mod irq1 {
    pub const MODE_READY: u8 = 0x80;
}

pub mod irq2 {
    pub const PACKET_SENT: u8 = 0x08;
    pub const PAYLOAD_READY: u8 = 0x04;
    pub const FIFO_OVERRUN: u8 = 0x10;
}

/// DIO0 function, DIOMAPPING1 bits 7..6
pub mod dio0 {
    /// Packet sent in transmit mode
    pub const PACKET_SENT: u8 = 0x00;
    /// Payload ready in receive mode
    pub const PAYLOAD_READY: u8 = 0x40;
}

pub mod palevel {
    pub const PA0_ON: u8 = 0x80;
    pub const PA1_ON: u8 = 0x40;
    pub const PA2_ON: u8 = 0x20;
    pub const POWER_MASK: u8 = 0x1F;
}

pub mod ocp {
    pub const ON: u8 = 0x1A;
    pub const OFF: u8 = 0x0F;
}

/// High power PA test register values (off, boost)
pub mod testpa {
    pub const PA1_NORMAL: u8 = 0x55;
    pub const PA1_BOOST: u8 = 0x5D;
    pub const PA2_NORMAL: u8 = 0x70;
    pub const PA2_BOOST: u8 = 0x7C;
}

pub mod rssi {
    pub const START: u8 = 0x01;
    pub const DONE: u8 = 0x02;
}

pub mod temp {
    pub const MEAS_START: u8 = 0x08;
    pub const MEAS_RUNNING: u8 = 0x04;
    /// Offset putting the raw reading near degrees centigrade
    pub const COARSE_COEF: i8 = -90;
}

pub mod osc {
    pub const RCCAL_START: u8 = 0x80;
    pub const RCCAL_DONE: u8 = 0x40;
}

pub mod packet2 {
    pub const RX_RESTART: u8 = 0x04;
    pub const RX_RESTART_MASK: u8 = 0xFB;
}

/// Crystal frequency over 2^19, the synthesizer step
pub const FXOSC_HZ: u64 = 32_000_000;
pub const FSTEP_SHIFT: u32 = 19;

/// Values written to SYNCVALUE1 to check the chip is alive
pub const PROBE_PATTERNS: [u8; 2] = [0xAA, 0x55];

/// First sync byte; the second carries the network id
pub const SYNC_WORD: u8 = 0x2D;

/// Carrier frequency register bytes for a band
pub fn band_frf(band: Band) -> [u8; 3] {
    match band {
        Band::Mhz315 => [0x4E, 0xC0, 0x00],
        Band::Mhz433 => [0x6C, 0x40, 0x00],
        Band::Mhz868 => [0xD9, 0x00, 0x00],
        Band::Mhz915 => [0xE4, 0xC0, 0x00],
    }
}

/// Register writes applied in order by `initialize`
///
/// FSK packet mode at 55.5 kbps with 50 kHz deviation, variable length
/// frames with hardware CRC, two sync bytes, and DIO0 as the only
/// interrupt line.
pub fn startup_sequence(band: Band, network_id: u8) -> [(u8, u8); 22] {
    let frf = band_frf(band);
    [
        (reg::OPMODE, opmode::STANDBY),
        (reg::DATAMODUL, 0x00),
        (reg::BITRATE_MSB, 0x02),
        (reg::BITRATE_LSB, 0x40),
        (reg::FDEV_MSB, 0x03),
        (reg::FDEV_LSB, 0x33),
        (reg::FRF_MSB, frf[0]),
        (reg::FRF_MID, frf[1]),
        (reg::FRF_LSB, frf[2]),
        // DCC 4%, 125 kHz channel filter
        (reg::RXBW, 0x42),
        (reg::DIOMAPPING1, dio0::PAYLOAD_READY),
        // ClkOut off
        (reg::DIOMAPPING2, 0x07),
        // Writing the overrun flag resets the FIFO
        (reg::IRQFLAGS2, irq2::FIFO_OVERRUN),
        // -110 dBm
        (reg::RSSITHRESH, 220),
        (reg::SYNCCONFIG, 0x88),
        (reg::SYNCVALUE1, SYNC_WORD),
        (reg::SYNCVALUE2, network_id),
        // Variable length, CRC on, no address filtering
        (reg::PACKETCONFIG1, 0x90),
        (reg::PAYLOADLENGTH, 66),
        // Transmit starts when the FIFO is not empty
        (reg::FIFOTHRESH, 0x8F),
        // Auto RX restart after a 2 bit delay
        (reg::PACKETCONFIG2, 0x12),
        (reg::TESTDAGC, 0x30),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_frequencies() {
        let hz = |frf: [u8; 3]| {
            let value = u32::from_be_bytes([0, frf[0], frf[1], frf[2]]) as u64;
            (value * FXOSC_HZ) >> FSTEP_SHIFT
        };
        assert_eq!(hz(band_frf(Band::Mhz315)), 315_000_000);
        assert_eq!(hz(band_frf(Band::Mhz433)), 433_000_000);
        assert_eq!(hz(band_frf(Band::Mhz868)), 868_000_000);
        assert_eq!(hz(band_frf(Band::Mhz915)), 915_000_000);
    }

    #[test]
    fn test_startup_sequence_carries_network() {
        let sequence = startup_sequence(Band::Mhz433, 7);
        assert!(sequence.contains(&(reg::SYNCVALUE2, 7)));
        assert!(sequence.contains(&(reg::FRF_MSB, 0x6C)));
        assert_eq!(sequence[0], (reg::OPMODE, opmode::STANDBY));
    }
}
