pub mod error;
pub mod file_store;
pub mod identity;
pub mod ids;

pub use error::{StorageError, StorageResult};
pub use file_store::{JsonFileStore, MemoryStore};
pub use identity::{IdentityOrigin, SESSION_ID_KEY, SessionIdentity};
pub use ids::{SessionId, TurnId};

/// Flat string key-value persistence scoped to one client installation.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }
}
