use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use fsvault_core::{path, KeyLocker, Vault, VaultError};
use tempfile::Builder;
use tracing::{debug, error, instrument, warn};

use crate::{
    envelope::{self, Record, CIPHER_AES_GCM},
    keys::EncryptionKeys,
};

/// Mode for stored files; readable by the group so the CLI can share a vault.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;
#[cfg(unix)]
const DIR_MODE: u32 = 0o754;
/// Owner read/write bits a key needs to count as usable.
#[cfg(unix)]
const REQUIRED_MODE: u32 = 0o600;
/// Name prefix of in-flight writes. Entries carrying it are never listed as
/// keys, and leftovers from an interrupted write are swept on directory delete.
const TEMP_PREFIX: &str = ".fsvault-tmp";

/// Everything a [`FileVault`] needs, fixed for the vault's lifetime.
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Directory every key is resolved under. Empty means no sandbox prefix.
    pub root: String,
    pub encryption_keys: EncryptionKeys,
}

impl VaultConfig {
    pub fn new(root: impl Into<String>, encryption_keys: EncryptionKeys) -> Self {
        Self {
            root: root.into(),
            encryption_keys,
        }
    }
}

/// Filesystem-backed vault. Each key is one JSON record file under the root,
/// encrypted with AES-GCM when keys are configured.
#[derive(Debug)]
pub struct FileVault {
    root: String,
    keys: EncryptionKeys,
    locker: KeyLocker,
}

impl FileVault {
    pub fn new(config: VaultConfig) -> Self {
        debug!(
            root = %config.root,
            encryption = config.encryption_keys.is_enabled(),
            "opening file vault"
        );
        Self {
            root: config.root,
            keys: config.encryption_keys,
            locker: KeyLocker::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn encryption_enabled(&self) -> bool {
        self.keys.is_enabled()
    }

    /// Filesystem path backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        path::resolve(&self.root, key)
    }

    fn seal(&self, key: &str, data: &[u8]) -> Result<Record, VaultError> {
        let Some(primary) = self.keys.primary() else {
            debug!("encryption not enabled");
            return Ok(Record::plain(data.to_vec()));
        };

        let sealed = envelope::encrypt(primary.as_bytes(), data).inspect_err(|err| {
            if err.is_permanent() {
                error!(len = primary.len(), "invalid primary encryption key length");
            }
        })?;
        debug!(key, "encrypted data");
        Ok(Record::sealed(sealed))
    }

    /// Try every configured key in order. Data opened with a retired key is
    /// rewritten under the primary key.
    fn open(&self, key: &str, record: Record) -> Result<Vec<u8>, VaultError> {
        if record.cipher != CIPHER_AES_GCM {
            return Err(VaultError::UnsupportedCipher {
                cipher: record.cipher,
            });
        }

        let mut failure = VaultError::NoEncryptionKeys;
        for (index, secret) in self.keys.iter().enumerate() {
            match envelope::decrypt(secret.as_bytes(), &record.data) {
                Ok(plaintext) => {
                    debug!(key, index, "decrypted data");
                    if index > 0 {
                        self.rotate(key, &plaintext);
                    }
                    return Ok(plaintext);
                }
                Err(err) if err.is_permanent() => {
                    debug!(index, len = secret.len(), "invalid encryption key length");
                    return Err(err);
                }
                Err(err) => {
                    debug!(index, %err, "decrypt failed, trying next key");
                    failure = err;
                }
            }
        }
        Err(failure)
    }

    fn rotate(&self, key: &str, plaintext: &[u8]) {
        debug!(key, "rolling encryption to primary key");
        if let Err(err) = self.put(key, plaintext) {
            warn!(key, %err, "failed data refresh");
        }
    }
}

impl Vault for FileVault {
    #[instrument(skip_all, fields(key = %key))]
    fn put(&self, key: &str, data: &[u8]) -> Result<(), VaultError> {
        // Only a present but unusable file blocks the write; absence is fine.
        if let Err(err @ VaultError::UnusablePermissions { .. }) = self.exists(key) {
            return Err(err);
        }

        let record = self.seal(key, data)?;
        let bytes = record.to_bytes()?;
        write_record(&self.path_for(key), &bytes)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get(&self, key: &str) -> Result<Vec<u8>, VaultError> {
        let bytes = fs::read(self.path_for(key)).inspect_err(|err| debug!(%err, "read failed"))?;
        let record = Record::from_bytes(&bytes).inspect_err(|err| debug!(%err, "decode failed"))?;

        if !record.is_sealed() {
            return Ok(record.data);
        }
        self.open(key, record)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn delete(&self, key: &str) -> Result<(), VaultError> {
        let path = self.path_for(key);
        let removed = match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => remove_dir(&path),
            Ok(_) => fs::remove_file(&path),
            Err(err) => Err(err),
        };

        removed.map_err(|err| {
            debug!(%err, "delete failed");
            match err.kind() {
                io::ErrorKind::NotFound => VaultError::KeyDoesNotExist {
                    key: key.to_string(),
                },
                io::ErrorKind::DirectoryNotEmpty => VaultError::KeyNotEmpty {
                    key: key.to_string(),
                },
                _ => VaultError::Io(err),
            }
        })
    }

    #[instrument(skip_all, fields(key = %key))]
    fn list(&self, key: &str) -> Vec<String> {
        let entries = match fs::read_dir(self.path_for(key)) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(%err, "list failed");
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(%err, "list failed");
                    return Vec::new();
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let mut child = path::child_key(key, &name);
            if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                child.push(path::SEPARATOR);
            }
            found.push(child);
        }

        found.sort();
        found
    }

    fn exists(&self, key: &str) -> Result<bool, VaultError> {
        let meta = fs::metadata(self.path_for(key))?;
        if has_usable_permissions(&meta) {
            Ok(true)
        } else {
            Err(VaultError::UnusablePermissions {
                key: key.to_string(),
            })
        }
    }

    fn locker(&self) -> &KeyLocker {
        &self.locker
    }
}

#[cfg(unix)]
fn has_usable_permissions(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & REQUIRED_MODE == REQUIRED_MODE
}

#[cfg(not(unix))]
fn has_usable_permissions(meta: &fs::Metadata) -> bool {
    !meta.permissions().readonly()
}

/// Write `bytes` to `path` through a temp file in the same directory.
/// Parent directories are created only now, right before the file lands.
fn write_record(path: &Path, bytes: &[u8]) -> Result<(), VaultError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dirs(parent)?;

    let mut tmp = Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    set_file_mode(tmp.as_file())?;
    tmp.persist(path).map_err(|e| VaultError::Io(e.error))?;
    Ok(())
}

/// Remove an empty directory. Temp files left by interrupted writes do not
/// count as content.
fn remove_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir(dir) {
        Err(err) if err.kind() == io::ErrorKind::DirectoryNotEmpty && sweep_temp_files(dir)? => {
            fs::remove_dir(dir)
        }
        other => other,
    }
}

/// Delete leftover temp files in `dir`, reporting whether any were found.
fn sweep_temp_files(dir: &Path) -> io::Result<bool> {
    let mut swept = false;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            debug!(path = %entry.path().display(), "removing stale temp file");
            fs::remove_file(entry.path())?;
            swept = true;
        }
    }
    Ok(swept)
}

#[cfg(unix)]
fn create_dirs(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
}

#[cfg(not(unix))]
fn create_dirs(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn set_file_mode(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(FILE_MODE))
}

#[cfg(not(unix))]
fn set_file_mode(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
