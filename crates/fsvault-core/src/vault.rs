use crate::{
    error::VaultError,
    locker::{KeyLock, KeyLocker},
    path,
};

/// Contract for key-addressed storage shared by the map layer and the CLI.
///
/// Implementations do not lock on their own; callers that need a
/// read-modify-write on one key hold a [`KeyLock`] for the whole section.
pub trait Vault: Send + Sync {
    /// Persist `data` under `key`, overwriting any existing value.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), VaultError>;

    /// Retrieve the value at `key`. A missing key is an
    /// `io::ErrorKind::NotFound` carried in [`VaultError::Io`].
    fn get(&self, key: &str) -> Result<Vec<u8>, VaultError>;

    /// Remove the value at `key`, or the directory at `key` if it is empty.
    fn delete(&self, key: &str) -> Result<(), VaultError>;

    /// Sorted direct children of `key`; directories carry a trailing `/`.
    /// Unreadable or missing directories list as empty.
    fn list(&self, key: &str) -> Vec<String>;

    /// `Ok(true)` when something is stored at `key` with usable permissions.
    /// Absence is reported as the filesystem's not-found error and unusable
    /// permissions as [`VaultError::UnusablePermissions`].
    fn exists(&self, key: &str) -> Result<bool, VaultError>;

    /// Lock table owned by this vault.
    fn locker(&self) -> &KeyLocker;

    /// Block until `key` is exclusively held by the caller. The lock is taken
    /// on the canonical key, so `/a`, `a` and `/x/../a` exclude each other.
    fn lock(&self, key: &str) -> KeyLock {
        self.locker().acquire(&path::canonical(key))
    }

    /// Lock `key` and read it. The lock is handed back even when the read
    /// fails, so the caller can go on to write the key.
    fn get_with_lock(&self, key: &str) -> (KeyLock, Result<Vec<u8>, VaultError>) {
        let lock = self.lock(key);
        let data = self.get(key);
        (lock, data)
    }
}
