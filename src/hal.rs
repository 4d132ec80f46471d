//! Board collaborator contracts
//!
//! GPIO, SPI, PWM and delay come straight from `embedded-hal`. The traits
//! here cover what `embedded-hal` has no contract for: the monotonic tick,
//! the ADC supply sampler and the persistent byte store. Each has a mock
//! implementation for host testing.

/// Monotonic millisecond tick
pub trait Clock {
    /// Milliseconds since an arbitrary epoch; wraps at `u32::MAX`
    fn now_ms(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// ADC channel used to estimate the supply voltage
pub trait SupplySampler {
    /// Take one raw conversion, or `None` if the converter failed to start
    fn sample(&mut self) -> Option<u32>;
}

/// Errors from the persistent byte store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Offset outside the storage area
    OutOfRange,
    /// Programming the cell failed
    WriteFailed,
    /// Read-back after programming did not match
    VerifyFailed,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "offset out of range"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::VerifyFailed => write!(f, "verification failed"),
        }
    }
}

/// Byte-addressed persistent storage (EEPROM or emulated in flash)
pub trait ByteStore {
    /// Read one byte; unreadable cells read as erased
    fn read_byte(&mut self, offset: u32) -> u8;

    /// Program one byte
    fn write_byte(&mut self, offset: u32, value: u8) -> Result<(), StorageError>;

    /// Program a run of bytes starting at `offset`
    ///
    /// The default programs one byte at a time from the highest offset down
    /// and stops at the first failure, so a little-endian value interrupted
    /// part way through an increase never reads back lower than before.
    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StorageError> {
        for (index, &value) in bytes.iter().enumerate().rev() {
            self.write_byte(offset + index as u32, value)?;
        }
        Ok(())
    }
}

impl<S: ByteStore + ?Sized> ByteStore for &mut S {
    fn read_byte(&mut self, offset: u32) -> u8 {
        (**self).read_byte(offset)
    }

    fn write_byte(&mut self, offset: u32, value: u8) -> Result<(), StorageError> {
        (**self).write_byte(offset, value)
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).write_bytes(offset, bytes)
    }
}

/// PWM channel driving an active-low load
///
/// Inverts the duty so that callers can think in terms of brightness.
pub struct ActiveLow<P>(pub P);

impl<P: embedded_hal::pwm::ErrorType> embedded_hal::pwm::ErrorType for ActiveLow<P> {
    type Error = P::Error;
}

impl<P: embedded_hal::pwm::SetDutyCycle> embedded_hal::pwm::SetDutyCycle for ActiveLow<P> {
    fn max_duty_cycle(&self) -> u16 {
        self.0.max_duty_cycle()
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let max = self.0.max_duty_cycle();
        self.0.set_duty_cycle(max - duty.min(max))
    }
}
