//! Register access over SPI with a manually driven chip select
//!
//! The bus and the chip-select pin are owned here and nowhere else. Every
//! transaction raises chip select again, also when the transfer failed.

use super::registers::{reg, WRITE_FLAG};
use super::traits::RadioError;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

pub struct RegisterBus<Spi, Nss> {
    spi: Spi,
    nss: Nss,
}

impl<Spi, Nss> RegisterBus<Spi, Nss>
where
    Spi: SpiBus,
    Nss: OutputPin,
{
    pub fn new(spi: Spi, mut nss: Nss) -> Self {
        let _ = nss.set_high();
        Self { spi, nss }
    }

    /// Run `f` with chip select held low
    fn transaction<R>(
        &mut self,
        f: impl FnOnce(&mut Spi) -> Result<R, Spi::Error>,
    ) -> Result<R, RadioError> {
        self.nss.set_low().map_err(|_| RadioError::Bus)?;
        let result = f(&mut self.spi).and_then(|value| self.spi.flush().map(|_| value));
        let released = self.nss.set_high();
        let value = result.map_err(|_| RadioError::Bus)?;
        released.map_err(|_| RadioError::Bus)?;
        Ok(value)
    }

    pub fn read_reg(&mut self, addr: u8) -> Result<u8, RadioError> {
        self.transaction(|spi| {
            let mut buf = [addr & !WRITE_FLAG, 0];
            spi.transfer_in_place(&mut buf)?;
            Ok(buf[1])
        })
    }

    pub fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), RadioError> {
        self.transaction(|spi| spi.write(&[addr | WRITE_FLAG, value]))
    }

    /// Read-modify-write: keep the bits in `keep`, then OR in `set`
    pub fn modify_reg(&mut self, addr: u8, keep: u8, set: u8) -> Result<(), RadioError> {
        let current = self.read_reg(addr)?;
        self.write_reg(addr, (current & keep) | set)
    }

    /// Write `header` and `body` to the FIFO as one burst
    ///
    /// The header starts with the FIFO address byte.
    pub fn write_fifo(&mut self, header: &[u8], body: &[u8]) -> Result<(), RadioError> {
        self.transaction(|spi| {
            spi.write(header)?;
            spi.write(body)
        })
    }

    /// Burst-read one received frame from the FIFO
    ///
    /// Reads the length byte, then that many bytes into `buf` if they fit.
    /// Returns the length byte; the caller rejects lengths beyond `buf`.
    pub fn read_fifo(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        self.transaction(|spi| {
            let mut length = [reg::FIFO, 0];
            spi.transfer_in_place(&mut length)?;
            let length = length[1] as usize;
            if let Some(frame) = buf.get_mut(..length) {
                spi.read(frame)?;
            }
            Ok(length)
        })
    }

    /// Give back the bus and the chip-select pin
    pub fn release(self) -> (Spi, Nss) {
        (self.spi, self.nss)
    }
}
