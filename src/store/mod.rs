//! # Persistent Key/Value Store
//!
//! A tiny key/value store laid out as an array of fixed-size slots over any
//! byte-addressable [`embedded_storage::Storage`] (EEPROM emulation, a flash
//! partition, or [`MemoryStorage`] on a host). It exists to keep the session
//! token across reboots without the firmware juggling raw addresses.
//!
//! ## Slot layout
//!
//! ```text
//! | key: KEY_LEN bytes, NUL-padded | len: u16 LE | value: VALUE_LEN bytes | marker: u32 LE |
//! ```
//!
//! A slot is empty when its first byte is `0xFF` (erased) or `0x00` (removed).
//! Every occupied slot ends with [`INTEGRITY_MARKER`]. On [`PersistentStore::begin`]
//! a region that is not fully erased must have the marker on *every* occupied
//! slot, otherwise the whole store is wiped. There is no partial repair.
//!
//! Writes go straight to the storage driver; nothing is cached between calls.

mod credential;
mod memory;

pub use credential::{CredentialStore, TOKEN_CAPACITY, TOKEN_KEY, Token};
pub use memory::{MemoryError, MemoryStorage};

use embedded_storage::Storage;
use heapless::String;

use crate::error::StorageError;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

/// Trailer written after every occupied slot.
pub const INTEGRITY_MARKER: u32 = 0xDEAD_BEEF;

const LEN_FIELD: usize = 2;
const MARKER_FIELD: usize = 4;
const CHUNK: usize = 32;

/// Verdict of the integrity check run by [`PersistentStore::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Integrity {
    /// The region has never been written.
    Erased,
    /// Every occupied slot carried a valid marker.
    Intact,
    /// Corruption was found and every slot was zeroed. Stored data is gone.
    Wiped,
}

/// Fixed-capacity key/value store.
///
/// - `KEYS`: number of slots
/// - `KEY_LEN`: maximum key length in bytes
/// - `VALUE_LEN`: maximum value length in bytes
///
/// Not safe to share; every operation takes `&mut self`.
pub struct PersistentStore<S, const KEYS: usize = 10, const KEY_LEN: usize = 16, const VALUE_LEN: usize = 64>
{
    storage: S,
    base: u32,
}

impl<S, const KEYS: usize, const KEY_LEN: usize, const VALUE_LEN: usize>
    PersistentStore<S, KEYS, KEY_LEN, VALUE_LEN>
where
    S: Storage,
{
    /// Bytes taken by one slot.
    pub const SLOT_SIZE: usize = KEY_LEN + LEN_FIELD + VALUE_LEN + MARKER_FIELD;

    /// Bytes taken by the whole store.
    pub const REGION_SIZE: usize = KEYS * Self::SLOT_SIZE;

    /// Creates a store occupying the start of `storage`.
    pub fn new(storage: S) -> Self {
        Self::with_offset(storage, 0)
    }

    /// Creates a store whose region starts `base` bytes into `storage`.
    pub fn with_offset(storage: S, base: u32) -> Self {
        Self { storage, base }
    }

    /// Gives the storage back.
    pub fn release(self) -> S {
        self.storage
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        KEYS
    }

    /// Checks that the region fits and validates whatever a previous boot left
    /// behind.
    pub fn begin(&mut self) -> Result<Integrity, StorageError> {
        if let Err(e) = self.check_region() {
            error!(
                "store region of {} bytes at {} does not fit storage of {} bytes",
                Self::REGION_SIZE,
                self.base,
                self.storage.capacity()
            );
            return Err(e);
        }

        debug!("checking store integrity");
        if self.is_erased()? {
            debug!("store region is erased");
            return Ok(Integrity::Erased);
        }

        for index in 0..KEYS {
            if !self.slot_is_valid(index)? {
                error!("store slot {} is corrupted, wiping all data", index);
                self.clear()?;
                return Ok(Integrity::Wiped);
            }
        }

        debug!("store integrity validated");
        Ok(Integrity::Intact)
    }

    /// Stores `value` under `key`, overwriting an existing entry.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::check_key(key)?;
        if value.len() > VALUE_LEN {
            return Err(StorageError::ValueTooLong);
        }
        self.check_region()?;

        let index = match self.find_index(key)? {
            Some(index) => index,
            None => match self.first_free()? {
                Some(index) => index,
                None => {
                    warn!("store is full, cannot write {}", key);
                    return Err(StorageError::Full);
                }
            },
        };

        let addr = self.slot_addr(index);
        let value_addr = addr + KEY_LEN as u32;

        let mut value_field = [0u8; VALUE_LEN];
        value_field[..value.len()].copy_from_slice(value.as_bytes());
        self.write(value_addr, &(value.len() as u16).to_le_bytes())?;
        self.write(value_addr + LEN_FIELD as u32, &value_field)?;
        self.write(
            value_addr + (LEN_FIELD + VALUE_LEN) as u32,
            &INTEGRITY_MARKER.to_le_bytes(),
        )?;

        // Key goes last: a slot only looks occupied once the rest of it is in place.
        let mut key_field = [0u8; KEY_LEN];
        key_field[..key.len()].copy_from_slice(key.as_bytes());
        self.write(addr, &key_field)
    }

    /// Returns the value stored under `key`, or `None` if there is none.
    pub fn get(&mut self, key: &str) -> Result<Option<String<VALUE_LEN>>, StorageError> {
        self.check_region()?;
        let Some(index) = self.find_index(key)? else {
            return Ok(None);
        };

        let value_addr = self.slot_addr(index) + KEY_LEN as u32;
        let len = self.read_len(value_addr)?;
        if len > VALUE_LEN {
            return Err(StorageError::InvalidData);
        }

        let mut value_field = [0u8; VALUE_LEN];
        self.read(value_addr + LEN_FIELD as u32, &mut value_field)?;
        let text =
            core::str::from_utf8(&value_field[..len]).map_err(|_| StorageError::InvalidData)?;

        let mut value = String::new();
        value
            .push_str(text)
            .map_err(|_| StorageError::InvalidData)?;
        Ok(Some(value))
    }

    /// Returns `true` if `key` is stored.
    pub fn contains(&mut self, key: &str) -> Result<bool, StorageError> {
        self.check_region()?;
        Ok(self.find_index(key)?.is_some())
    }

    /// Number of occupied slots.
    pub fn len(&mut self) -> Result<usize, StorageError> {
        self.check_region()?;
        let mut count = 0;
        for index in 0..KEYS {
            if !self.slot_is_empty(index)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&mut self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Deletes `key` by zeroing its slot.
    pub fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.check_region()?;
        let index = self.find_index(key)?.ok_or(StorageError::NotFound)?;
        self.zero(self.slot_addr(index), Self::SLOT_SIZE)
    }

    /// Zeroes every slot.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.check_region()?;
        self.zero(self.base, Self::REGION_SIZE)?;
        info!("store cleared");
        Ok(())
    }

    fn check_key(key: &str) -> Result<(), StorageError> {
        if key.len() > KEY_LEN {
            return Err(StorageError::KeyTooLong);
        }
        if key.is_empty() || key.as_bytes().contains(&0) {
            return Err(StorageError::InvalidKey);
        }
        Ok(())
    }

    /// The region must lie inside the storage, which also keeps every slot
    /// address inside `u32`.
    fn check_region(&self) -> Result<(), StorageError> {
        match (self.base as usize).checked_add(Self::REGION_SIZE) {
            Some(end) if end <= self.storage.capacity() && u32::try_from(end).is_ok() => Ok(()),
            _ => Err(StorageError::RegionTooSmall),
        }
    }

    fn slot_addr(&self, index: usize) -> u32 {
        self.base + (index * Self::SLOT_SIZE) as u32
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        self.storage
            .read(offset, buf)
            .map_err(|_| StorageError::Backend)
    }

    fn write(&mut self, offset: u32, buf: &[u8]) -> Result<(), StorageError> {
        self.storage
            .write(offset, buf)
            .map_err(|_| StorageError::Backend)
    }

    fn read_len(&mut self, value_addr: u32) -> Result<usize, StorageError> {
        let mut len = [0u8; LEN_FIELD];
        self.read(value_addr, &mut len)?;
        Ok(u16::from_le_bytes(len) as usize)
    }

    fn zero(&mut self, mut offset: u32, len: usize) -> Result<(), StorageError> {
        let zeros = [0u8; CHUNK];
        let end = offset + len as u32;
        while offset < end {
            let n = CHUNK.min((end - offset) as usize);
            self.write(offset, &zeros[..n])?;
            offset += n as u32;
        }
        Ok(())
    }

    fn is_erased(&mut self) -> Result<bool, StorageError> {
        let mut chunk = [0u8; CHUNK];
        let mut offset = self.base;
        let end = self.base + Self::REGION_SIZE as u32;
        while offset < end {
            let n = CHUNK.min((end - offset) as usize);
            self.read(offset, &mut chunk[..n])?;
            if chunk[..n].iter().any(|&b| b != ERASED) {
                return Ok(false);
            }
            offset += n as u32;
        }
        Ok(true)
    }

    fn slot_is_empty(&mut self, index: usize) -> Result<bool, StorageError> {
        let mut first = [0u8; 1];
        self.read(self.slot_addr(index), &mut first)?;
        Ok(first[0] == ERASED || first[0] == 0)
    }

    fn slot_is_valid(&mut self, index: usize) -> Result<bool, StorageError> {
        if self.slot_is_empty(index)? {
            return Ok(true);
        }

        let addr = self.slot_addr(index);
        let mut key_field = [0u8; KEY_LEN];
        self.read(addr, &mut key_field)?;
        if core::str::from_utf8(until_nul(&key_field)).is_err() {
            return Ok(false);
        }

        let value_addr = addr + KEY_LEN as u32;
        if self.read_len(value_addr)? > VALUE_LEN {
            return Ok(false);
        }

        let mut marker = [0u8; MARKER_FIELD];
        self.read(value_addr + (LEN_FIELD + VALUE_LEN) as u32, &mut marker)?;
        Ok(u32::from_le_bytes(marker) == INTEGRITY_MARKER)
    }

    fn find_index(&mut self, key: &str) -> Result<Option<usize>, StorageError> {
        let mut key_field = [0u8; KEY_LEN];
        for index in 0..KEYS {
            self.read(self.slot_addr(index), &mut key_field)?;
            if key_field.first().is_none_or(|&b| b == ERASED || b == 0) {
                continue;
            }
            if until_nul(&key_field) == key.as_bytes() {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn first_free(&mut self) -> Result<Option<usize>, StorageError> {
        for index in 0..KEYS {
            if self.slot_is_empty(index)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Store = PersistentStore<MemoryStorage<1024>, 4, 8, 32>;
    const SLOT: usize = Store::SLOT_SIZE;

    fn store() -> Store {
        let mut store = Store::new(MemoryStorage::new());
        assert_eq!(store.begin(), Ok(Integrity::Erased));
        store
    }

    fn reboot(store: Store) -> Store {
        let bytes = *store.release().as_bytes();
        Store::new(MemoryStorage::from_bytes(bytes))
    }

    #[test]
    fn set_then_get_returns_value() {
        let mut store = store();
        store.set("t", "abc.def.ghi").unwrap();
        store.set("wifi", "").unwrap();
        store.set("exactly8", &"v".repeat(32)).unwrap();

        assert_eq!(store.get("t").unwrap().unwrap().as_str(), "abc.def.ghi");
        assert_eq!(store.get("wifi").unwrap().unwrap().as_str(), "");
        assert_eq!(store.get("exactly8").unwrap().unwrap().len(), 32);
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn values_with_nul_bytes_round_trip() {
        let mut store = store();
        store.set("k", "a\0b").unwrap();
        store.set("z", "\0\0").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().as_str(), "a\0b");
        assert_eq!(store.get("z").unwrap().unwrap().as_str(), "\0\0");

        let mut store = reboot(store);
        assert_eq!(store.begin(), Ok(Integrity::Intact));
        assert_eq!(store.get("k").unwrap().unwrap().as_str(), "a\0b");
    }

    #[test]
    fn overwrite_keeps_one_slot() {
        let mut store = store();
        store.set("t", "first").unwrap();
        store.set("t", "second").unwrap();
        assert_eq!(store.get("t").unwrap().unwrap().as_str(), "second");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn oversized_input_leaves_store_unchanged() {
        let mut store = store();
        store.set("t", "keep").unwrap();
        let before = *store.storage.as_bytes();

        assert_eq!(store.set("too-long-key", "x"), Err(StorageError::KeyTooLong));
        assert_eq!(store.set("t", &"x".repeat(33)), Err(StorageError::ValueTooLong));
        assert_eq!(store.set("", "x"), Err(StorageError::InvalidKey));

        assert_eq!(store.storage.as_bytes(), &before);
        assert_eq!(store.get("t").unwrap().unwrap().as_str(), "keep");
    }

    #[test]
    fn full_store_rejects_new_keys_but_accepts_updates() {
        let mut store = store();
        for key in ["a", "b", "c", "d"] {
            store.set(key, key).unwrap();
        }
        assert_eq!(store.set("e", "e"), Err(StorageError::Full));
        store.set("b", "updated").unwrap();
        assert_eq!(store.get("b").unwrap().unwrap().as_str(), "updated");
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let mut store = store();
        for key in ["a", "b", "c", "d"] {
            store.set(key, key).unwrap();
        }
        assert_eq!(store.remove("nope"), Err(StorageError::NotFound));
        assert_eq!(store.len().unwrap(), 4);

        store.remove("b").unwrap();
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.get("a").unwrap().unwrap().as_str(), "a");
        assert!(store.storage.as_bytes()[SLOT..2 * SLOT].iter().all(|&b| b == 0));

        store.set("e", "e").unwrap();
        assert_eq!(store.get("e").unwrap().unwrap().as_str(), "e");
    }

    #[test]
    fn clear_forgets_everything() {
        let mut store = store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.clear().unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn intact_data_survives_reboot() {
        let mut store = store();
        store.set("t", "token").unwrap();
        store.set("n", "7").unwrap();
        store.remove("n").unwrap();

        let mut store = reboot(store);
        assert_eq!(store.begin(), Ok(Integrity::Intact));
        assert_eq!(store.get("t").unwrap().unwrap().as_str(), "token");
    }

    #[test]
    fn zero_filled_region_is_accepted() {
        let mut store = Store::new(MemoryStorage::from_bytes([0; 1024]));
        assert_eq!(store.begin(), Ok(Integrity::Intact));
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().as_str(), "v");
    }

    #[test]
    fn one_bad_slot_wipes_the_store() {
        let mut store = store();
        store.set("good", "1").unwrap();
        store.set("bad", "2").unwrap();

        let mut store = reboot(store);
        let marker_at = 2 * SLOT - 1;
        store.storage.as_bytes_mut()[marker_at] ^= 0xFF;

        assert_eq!(store.begin(), Ok(Integrity::Wiped));
        assert_eq!(store.get("good").unwrap(), None);
        assert_eq!(store.get("bad").unwrap(), None);
    }

    #[test]
    fn garbage_region_is_wiped() {
        let mut store = Store::new(MemoryStorage::from_bytes([0x5A; 1024]));
        assert_eq!(store.begin(), Ok(Integrity::Wiped));
        assert!(store.is_empty().unwrap());
        assert!(store.storage.as_bytes()[..Store::REGION_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn offset_region_must_fit() {
        let mut store = Store::with_offset(MemoryStorage::new(), 1024 - 10);
        assert_eq!(store.begin(), Err(StorageError::RegionTooSmall));

        let mut store = Store::with_offset(MemoryStorage::new(), 100);
        assert_eq!(store.begin(), Ok(Integrity::Erased));
        store.set("k", "v").unwrap();
        assert!(store.storage.as_bytes()[..100].iter().all(|&b| b == ERASED));
    }

    #[test]
    fn misplaced_region_is_refused_before_begin() {
        let mut store = Store::with_offset(MemoryStorage::new(), u32::MAX - 10);
        assert_eq!(store.set("k", "v"), Err(StorageError::RegionTooSmall));
        assert_eq!(store.get("k"), Err(StorageError::RegionTooSmall));
        assert_eq!(store.len(), Err(StorageError::RegionTooSmall));
        assert_eq!(store.clear(), Err(StorageError::RegionTooSmall));

        let mut store = Store::with_offset(MemoryStorage::new(), 1000);
        assert_eq!(store.set("k", "v"), Err(StorageError::RegionTooSmall));
        assert!(store.storage.as_bytes().iter().all(|&b| b == ERASED));
    }
}
