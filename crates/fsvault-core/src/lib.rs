//! Core abstractions for FSVault: the storage contract, its error taxonomy,
//! key-to-path mapping and per-key locking.

pub mod error;
pub mod locker;
pub mod path;
pub mod vault;

pub use error::{ErrorKind, VaultError};
pub use locker::{KeyLock, KeyLocker};
pub use vault::Vault;
