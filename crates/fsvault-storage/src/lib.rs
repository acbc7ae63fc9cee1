//! Filesystem storage with encryption at rest.
//! Records are JSON files under a root directory, sealed with AES-GCM when
//! encryption keys are configured; older keys are rotated out on read.

pub mod envelope;
pub mod file_vault;
pub mod keys;

pub use file_vault::{FileVault, VaultConfig};
pub use keys::EncryptionKeys;
