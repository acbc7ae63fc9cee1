use std::fmt;

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use tracing::warn;

use crate::envelope::is_supported_key_size;

/// Length of keys produced by [`generate_secret`] (AES-256).
pub const GENERATED_KEY_LEN: usize = 32;

/// Ordered encryption secrets. Index 0 is the primary key used for every new
/// write; all keys are tried, in order, when reading.
///
/// [`EncryptionKeys::new`] does not check lengths; an unsupported key is
/// rejected by the envelope when it is used.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncryptionKeys {
    keys: Vec<String>,
}

impl EncryptionKeys {
    /// Build from explicit secrets. Empty strings are ignored, so `[""]`
    /// leaves encryption disabled.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(Into::into)
                .filter(|key| !key.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list, as found in `FSVAULT_SECRET_KEYS`.
    pub fn parse(raw: &str) -> Self {
        Self::validated(raw.split(','))
    }

    /// Keep only usable entries from configuration input.
    ///
    /// Entries are trimmed; empty ones are skipped and entries whose length is
    /// not a supported AES key size are dropped with a warning.
    pub fn validated<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if is_supported_key_size(entry.len()) {
                keys.push(entry.to_string());
            } else {
                warn!(index, len = entry.len(), "invalid secret key length, ignoring");
            }
        }
        Self { keys }
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn primary(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// Never print key material.
impl fmt::Debug for EncryptionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeys")
            .field("count", &self.keys.len())
            .finish()
    }
}

/// Fresh random alphanumeric secret suitable as a primary key.
pub fn generate_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_KEY_LEN)
        .map(char::from)
        .collect()
}
