//! Crash-surviving request id
//!
//! The counter occupies four little-endian bytes at a fixed offset of a
//! [`ByteStore`] and is handed to the store as one block. A byte-wise store
//! (EEPROM) programs the block most-significant byte first and stops at the
//! first failure: for any increase, every intermediate state then reads back
//! at least the previously persisted value. Flash commits the whole image
//! at once through [`MirroredFlash`], which falls back to the previous copy
//! after a torn commit. Either way request ids stay monotonic across a power
//! cut mid-write.

pub mod mirror;

pub use mirror::MirroredFlash;

use crate::hal::{ByteStore, StorageError};
use log::warn;

/// Width of a persisted counter in bytes
pub const COUNTER_SIZE: u32 = 4;

/// What unprogrammed flash reads back as
const ERASED: u32 = u32::MAX;

/// 32-bit counter persisted in a byte store
pub struct DurableCounter<S> {
    store: S,
    offset: u32,
}

impl<S: ByteStore> DurableCounter<S> {
    pub fn new(store: S, offset: u32) -> Self {
        Self { store, offset }
    }

    /// Read the persisted value
    pub fn read(&mut self) -> u32 {
        let mut bytes = [0u8; COUNTER_SIZE as usize];
        for (index, byte) in (0u32..).zip(bytes.iter_mut()) {
            *byte = self.store.read_byte(self.offset + index);
        }
        u32::from_le_bytes(bytes)
    }

    /// Persist `value` as one block, then verify it
    ///
    /// On error the stored value is uncertain but no lower than before if
    /// `value` was an increase.
    pub fn write(&mut self, value: u32) -> Result<(), StorageError> {
        self.store.write_bytes(self.offset, &value.to_le_bytes())?;

        if self.read() != value {
            return Err(StorageError::VerifyFailed);
        }
        Ok(())
    }

    /// Clear the counter so the next id starts from one
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.write(0)
    }

    /// Give back the underlying store
    pub fn release(self) -> S {
        self.store
    }
}

/// Request id generator backed by a [`DurableCounter`]
///
/// Loaded once per wake-up; every generated id is strictly greater than the
/// last acknowledged id that was persisted before the restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestIds {
    last: u32,
}

impl RequestIds {
    /// Continue after the last persisted id
    pub fn resume<S: ByteStore>(counter: &mut DurableCounter<S>) -> Self {
        let last = match counter.read() {
            ERASED => {
                warn!("Request id reads erased, persistence uncertain; restarting from 1");
                0
            }
            value => value,
        };
        Self { last }
    }

    /// The most recently generated (or resumed) id
    pub fn last(&self) -> u32 {
        self.last
    }

    /// Generate the next id
    pub fn next(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}
