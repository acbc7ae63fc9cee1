use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use fsvault_storage::{EncryptionKeys, FileVault, VaultConfig};
use tracing::debug;

/// Resolve the default data directory for FSVault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("fsvault"))
}

/// Build a vault from the loaded configuration.
pub fn vault_from_config(config: &Config) -> Result<FileVault> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let keys = EncryptionKeys::validated(&config.secret_keys);
    debug!(?root, encryption = keys.is_enabled(), "initializing vault");

    Ok(FileVault::new(VaultConfig::new(root.to_string_lossy(), keys)))
}
