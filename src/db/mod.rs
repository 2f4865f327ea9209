//! Durable key/value storage.
//!
//! [`KeyValueStore`] is the only seam through which the rest of the crate
//! touches durable storage. Calls are synchronous and report failures as
//! [`StorageError`] values; a rejected write never takes the caller down.

use crate::error::StorageError;

mod memory;
mod migrations;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix`, sorted ascending. An empty prefix lists everything.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list_keys(prefix)
    }
}
