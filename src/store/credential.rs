use embedded_storage::Storage;
use heapless::String;

use super::{Integrity, PersistentStore};
use crate::error::StorageError;

/// Capacity of the in-memory bearer token.
pub const TOKEN_CAPACITY: usize = 256;

/// Key the session token is persisted under.
pub const TOKEN_KEY: &str = "t";

/// Opaque bearer token issued by the coordinator.
pub type Token = String<TOKEN_CAPACITY>;

/// Where the session keeps its bearer token between boots.
///
/// [`PersistentStore`] is the production implementation; anything else that
/// survives a power cycle works too.
pub trait CredentialStore {
    /// Prepares the backing storage. Called once from `SessionManager::begin`.
    fn open(&mut self) -> Result<(), StorageError>;

    /// Returns the persisted token, if any.
    fn load_token(&mut self) -> Result<Option<Token>, StorageError>;

    /// Persists `token`, replacing any previous one.
    fn save_token(&mut self, token: &str) -> Result<(), StorageError>;

    /// Forgets the persisted token. Erasing an absent token is not an error.
    fn erase_token(&mut self) -> Result<(), StorageError>;
}

impl<S, const KEYS: usize, const KEY_LEN: usize, const VALUE_LEN: usize> CredentialStore
    for PersistentStore<S, KEYS, KEY_LEN, VALUE_LEN>
where
    S: Storage,
{
    fn open(&mut self) -> Result<(), StorageError> {
        if self.begin()? == Integrity::Wiped {
            warn!("credential store was corrupted; persisted token lost");
        }
        Ok(())
    }

    fn load_token(&mut self) -> Result<Option<Token>, StorageError> {
        let Some(stored) = self.get(TOKEN_KEY)? else {
            return Ok(None);
        };
        if stored.is_empty() {
            return Ok(None);
        }

        let mut token = Token::new();
        token
            .push_str(&stored)
            .map_err(|_| StorageError::InvalidData)?;
        Ok(Some(token))
    }

    fn save_token(&mut self, token: &str) -> Result<(), StorageError> {
        self.set(TOKEN_KEY, token)
    }

    fn erase_token(&mut self) -> Result<(), StorageError> {
        match self.remove(TOKEN_KEY) {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Lets a session borrow a store the firmware keeps using for other keys.
impl<C: CredentialStore + ?Sized> CredentialStore for &mut C {
    fn open(&mut self) -> Result<(), StorageError> {
        (**self).open()
    }

    fn load_token(&mut self) -> Result<Option<Token>, StorageError> {
        (**self).load_token()
    }

    fn save_token(&mut self, token: &str) -> Result<(), StorageError> {
        (**self).save_token(token)
    }

    fn erase_token(&mut self) -> Result<(), StorageError> {
        (**self).erase_token()
    }
}
