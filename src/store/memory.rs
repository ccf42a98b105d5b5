//! RAM-backed storage region.

use embedded_storage::{ReadStorage, Storage};

use super::ERASED;

/// Errors reported by [`MemoryStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryError {
    /// The access falls outside the region.
    OutOfBounds,
}

/// A fixed-size byte region in RAM that behaves like freshly erased flash.
///
/// Handy on hosts, in simulators and in tests. Build it with
/// [`MemoryStorage::from_bytes`] to replay the contents of a previous boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStorage<const SIZE: usize> {
    bytes: [u8; SIZE],
}

impl<const SIZE: usize> MemoryStorage<SIZE> {
    /// Creates an erased region (every byte `0xFF`).
    pub const fn new() -> Self {
        Self {
            bytes: [ERASED; SIZE],
        }
    }

    /// Creates a region holding `bytes`.
    pub const fn from_bytes(bytes: [u8; SIZE]) -> Self {
        Self { bytes }
    }

    /// Raw contents of the region.
    pub fn as_bytes(&self) -> &[u8; SIZE] {
        &self.bytes
    }

    /// Mutable access to the raw contents, bypassing the store.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; SIZE] {
        &mut self.bytes
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, MemoryError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(MemoryError::OutOfBounds)?;
        if end > SIZE {
            return Err(MemoryError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<const SIZE: usize> Default for MemoryStorage<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> ReadStorage for MemoryStorage<SIZE> {
    type Error = MemoryError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize> Storage for MemoryStorage<SIZE> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}
