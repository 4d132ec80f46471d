//! Byte store on NOR flash
//!
//! Flash cannot reprogram a byte in place; every update erases a whole
//! sector. The durable area is kept in RAM and committed as one record to
//! two sectors in turn. Each record carries a sequence number and a
//! checksum, and the newest intact record is loaded at start-up, so a power
//! cut during a commit leaves the previous copy in charge instead of erased
//! flash.

use crate::config::storage::AREA_SIZE;
use crate::hal::{ByteStore, StorageError};
use crc::{Crc, CRC_8_SMBUS};
use embedded_storage::{ReadStorage, Storage};
use log::{debug, warn};

const MAGIC: u8 = 0x5A;

/// Magic, sequence number, image, checksum
const RECORD_SIZE: usize = 1 + 4 + AREA_SIZE + 1;

const CHECKSUM: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    sequence: u32,
    image: [u8; AREA_SIZE],
}

impl Snapshot {
    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut raw = [0u8; RECORD_SIZE];
        raw[0] = MAGIC;
        raw[1..5].copy_from_slice(&self.sequence.to_le_bytes());
        raw[5..5 + AREA_SIZE].copy_from_slice(&self.image);
        raw[RECORD_SIZE - 1] = CHECKSUM.checksum(&raw[..RECORD_SIZE - 1]);
        raw
    }

    fn decode(raw: &[u8; RECORD_SIZE]) -> Option<Self> {
        if raw[0] != MAGIC || CHECKSUM.checksum(&raw[..RECORD_SIZE - 1]) != raw[RECORD_SIZE - 1] {
            return None;
        }
        let mut image = [0u8; AREA_SIZE];
        image.copy_from_slice(&raw[5..5 + AREA_SIZE]);
        Some(Self {
            sequence: u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]),
            image,
        })
    }

    fn newer_than(&self, other: &Snapshot) -> bool {
        (self.sequence.wrapping_sub(other.sequence) as i32) > 0
    }
}

/// Durable area mirrored across two flash sectors
pub struct MirroredFlash<F> {
    flash: F,
    banks: [u32; 2],
    /// Bank holding the newest record, and that record
    current: Option<(usize, Snapshot)>,
}

impl<F: Storage> MirroredFlash<F> {
    /// Load the newest intact record from `banks`
    ///
    /// Each bank must start a sector of its own.
    pub fn new(mut flash: F, banks: [u32; 2]) -> Self {
        let mut current: Option<(usize, Snapshot)> = None;
        for (index, &address) in banks.iter().enumerate() {
            let mut raw = [0u8; RECORD_SIZE];
            if flash.read(address, &mut raw).is_err() {
                warn!("Flash read at {:#x} failed", address);
                continue;
            }
            let Some(snapshot) = Snapshot::decode(&raw) else {
                debug!("No intact record at {:#x}", address);
                continue;
            };
            if current.map_or(true, |(_, best)| snapshot.newer_than(&best)) {
                current = Some((index, snapshot));
            }
        }
        if current.is_none() {
            warn!("No durable record in flash, starting erased");
        }
        Self {
            flash,
            banks,
            current,
        }
    }

    fn image(&self) -> [u8; AREA_SIZE] {
        self.current
            .map_or([0xFF; AREA_SIZE], |(_, snapshot)| snapshot.image)
    }

    /// Write `snapshot` to the bank not holding the current record
    fn commit(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        let bank = match self.current {
            Some((index, _)) => 1 - index,
            None => 0,
        };
        let address = self.banks[bank];
        let raw = snapshot.encode();
        self.flash
            .write(address, &raw)
            .map_err(|_| StorageError::WriteFailed)?;

        let mut back = [0u8; RECORD_SIZE];
        self.flash
            .read(address, &mut back)
            .map_err(|_| StorageError::WriteFailed)?;
        if Snapshot::decode(&back) != Some(snapshot) {
            return Err(StorageError::VerifyFailed);
        }

        self.current = Some((bank, snapshot));
        Ok(())
    }

    /// Give back the flash
    pub fn release(self) -> F {
        self.flash
    }
}

impl<F: Storage> ByteStore for MirroredFlash<F> {
    fn read_byte(&mut self, offset: u32) -> u8 {
        self.image().get(offset as usize).copied().unwrap_or(0xFF)
    }

    fn write_byte(&mut self, offset: u32, value: u8) -> Result<(), StorageError> {
        self.write_bytes(offset, &[value])
    }

    /// Commit the whole area at once; unchanged bytes cost no erase
    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StorageError> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > AREA_SIZE {
            return Err(StorageError::OutOfRange);
        }

        let mut image = self.image();
        if image[start..end] == *bytes {
            return Ok(());
        }
        image[start..end].copy_from_slice(bytes);

        let sequence = self
            .current
            .map_or(1, |(_, snapshot)| snapshot.sequence.wrapping_add(1));
        self.commit(Snapshot { sequence, image })
    }
}
