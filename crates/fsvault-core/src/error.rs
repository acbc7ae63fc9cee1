use std::io;

use thiserror::Error;

/// Errors produced by vault implementations and the layers built on them.
///
/// Filesystem failures are carried untouched in [`VaultError::Io`]; a missing
/// key on `get`/`exists` surfaces as an `io::ErrorKind::NotFound` there rather
/// than as a dedicated variant.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Underlying filesystem failure, passed through unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Delete targeted a key with nothing stored at it.
    #[error("key does not exist")]
    KeyDoesNotExist { key: String },
    /// Delete targeted a directory key that still has children.
    #[error("key is not empty")]
    KeyNotEmpty { key: String },
    /// The key is present but lacks the owner read/write bits.
    #[error("key exists, but file has unusable permissions")]
    UnusablePermissions { key: String },
    /// Encryption key byte length is not 16, 24 or 32.
    #[error("invalid encryption key size {len}")]
    InvalidKeySize { len: usize },
    #[error("encrypt failed: {reason}")]
    Encrypt { reason: String },
    /// Authentication failed or the ciphertext is unusable under a key.
    #[error("decrypt failed: {reason}")]
    Decrypt { reason: String },
    /// A record is encrypted but the vault has no keys to try.
    #[error("record is encrypted but no encryption keys are configured")]
    NoEncryptionKeys,
    #[error("unsupported cipher: {cipher}")]
    UnsupportedCipher { cipher: String },
    /// Stored bytes are not a valid record.
    #[error("malformed record: {0}")]
    MalformedRecord(#[source] serde_json::Error),
    /// A map value payload could not be (de)serialized.
    #[error("invalid map payload at {key}: {source}")]
    MapPayload {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Closed classification of [`VaultError`] for callers that branch on the
/// kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotEmpty,
    PermissionDenied,
    InvalidKey,
    Encryption,
    Decryption,
    Malformed,
    Io,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Io(err) if err.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            VaultError::Io(_) => ErrorKind::Io,
            VaultError::KeyDoesNotExist { .. } => ErrorKind::NotFound,
            VaultError::KeyNotEmpty { .. } => ErrorKind::NotEmpty,
            VaultError::UnusablePermissions { .. } => ErrorKind::PermissionDenied,
            VaultError::InvalidKeySize { .. } => ErrorKind::InvalidKey,
            VaultError::Encrypt { .. } => ErrorKind::Encryption,
            VaultError::Decrypt { .. } | VaultError::NoEncryptionKeys => ErrorKind::Decryption,
            VaultError::UnsupportedCipher { .. }
            | VaultError::MalformedRecord(_)
            | VaultError::MapPayload { .. } => ErrorKind::Malformed,
        }
    }

    /// True when nothing is stored at the key.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Permanent errors will not go away on retry; the configuration must change.
    pub fn is_permanent(&self) -> bool {
        self.kind() == ErrorKind::InvalidKey
    }
}
