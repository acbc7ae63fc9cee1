//! On-disk record format and the authenticated encryption wrapped around it.
//!
//! Ciphertext layout is `nonce || ciphertext+tag`. The AES variant follows the
//! key length: 16, 24 or 32 bytes select AES-128, AES-192 or AES-256 in GCM.

use aes_gcm::{
    aead::{
        consts::U12,
        generic_array::{typenum::Unsigned, GenericArray},
        Aead, AeadCore, KeyInit, OsRng,
    },
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm,
};
use fsvault_core::VaultError;
use serde::{Deserialize, Serialize};

/// Cipher tag written for encrypted records.
pub const CIPHER_AES_GCM: &str = "AES-GCM";

/// Byte lengths accepted as encryption keys.
pub const SUPPORTED_KEY_SIZES: [usize; 3] = [16, 24, 32];

type Aes192Gcm = AesGcm<Aes192, U12>;

/// One stored value: cipher tag plus payload. An empty tag means the payload
/// is plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub cipher: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Record {
    pub fn plain(data: Vec<u8>) -> Self {
        Self {
            cipher: String::new(),
            data,
        }
    }

    pub fn sealed(data: Vec<u8>) -> Self {
        Self {
            cipher: CIPHER_AES_GCM.to_string(),
            data,
        }
    }

    pub fn is_sealed(&self) -> bool {
        !self.cipher.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        serde_json::to_vec(self).map_err(VaultError::MalformedRecord)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        serde_json::from_slice(bytes).map_err(VaultError::MalformedRecord)
    }
}

pub fn is_supported_key_size(len: usize) -> bool {
    SUPPORTED_KEY_SIZES.contains(&len)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    match Cipher::new(key)? {
        Cipher::Aes128(cipher) => seal(&cipher, plaintext),
        Cipher::Aes192(cipher) => seal(&cipher, plaintext),
        Cipher::Aes256(cipher) => seal(&cipher, plaintext),
    }
}

/// Verify and decrypt `sealed` under `key`. Tampering or a wrong key fails.
pub fn decrypt(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
    match Cipher::new(key)? {
        Cipher::Aes128(cipher) => open(&cipher, sealed),
        Cipher::Aes192(cipher) => open(&cipher, sealed),
        Cipher::Aes256(cipher) => open(&cipher, sealed),
    }
}

enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn new(key: &[u8]) -> Result<Self, VaultError> {
        let invalid = |_| VaultError::InvalidKeySize { len: key.len() };
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Cipher::Aes128).map_err(invalid),
            24 => Aes192Gcm::new_from_slice(key).map(Cipher::Aes192).map_err(invalid),
            32 => Aes256Gcm::new_from_slice(key).map(Cipher::Aes256).map_err(invalid),
            len => Err(VaultError::InvalidKeySize { len }),
        }
    }
}

fn seal<C: Aead + AeadCore>(cipher: &C, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| VaultError::Encrypt {
            reason: e.to_string(),
        })?;

    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open<C: Aead + AeadCore>(cipher: &C, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
    let nonce_len = C::NonceSize::USIZE;
    if sealed.len() < nonce_len {
        return Err(VaultError::Decrypt {
            reason: format!("ciphertext shorter than {nonce_len}-byte nonce"),
        });
    }

    let (nonce, ciphertext) = sealed.split_at(nonce_len);
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|e| VaultError::Decrypt {
            reason: e.to_string(),
        })
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    // A null payload is an empty one.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(D::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_128: &[u8] = b"sixteen-byte-key";
    const KEY_192: &[u8] = b"twenty-four-byte-key-abc";
    const KEY_256: &[u8] = b"eheheheheheheheheheheheheheheheh";

    #[test]
    fn every_supported_key_size_round_trips() {
        for key in [KEY_128, KEY_192, KEY_256] {
            let sealed = encrypt(key, b"some test data").expect("encrypt");
            assert_eq!(decrypt(key, &sealed).expect("decrypt"), b"some test data");
        }
    }

    #[test]
    fn sealed_layout_is_nonce_then_ciphertext_and_tag() {
        let sealed = encrypt(KEY_256, b"abc").expect("encrypt");
        assert_eq!(sealed.len(), 12 + 3 + 16);

        let again = encrypt(KEY_256, b"abc").expect("encrypt");
        assert_ne!(sealed[..12], again[..12], "each call draws a fresh nonce");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = encrypt(KEY_256, b"secret").expect("encrypt");
        let err = decrypt(b"mylongsecdddddwwwwdtmylongsecret", &sealed)
            .expect_err("wrong key must not decrypt");
        assert!(matches!(err, VaultError::Decrypt { .. }));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let mut sealed = encrypt(KEY_128, b"secret").expect("encrypt");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        let err = decrypt(KEY_128, &sealed).expect_err("tampering must be detected");
        assert!(matches!(err, VaultError::Decrypt { .. }));
    }

    #[test]
    fn truncated_input_is_a_decrypt_error() {
        let err = decrypt(KEY_128, b"short").expect_err("too short");
        assert!(matches!(err, VaultError::Decrypt { .. }));
    }

    #[test]
    fn unsupported_key_sizes_are_rejected() {
        let err = encrypt(b"tooshort", b"data").expect_err("8-byte key");
        assert!(matches!(err, VaultError::InvalidKeySize { len: 8 }));
        assert!(err.is_permanent());

        let err = decrypt(b"tooshort", b"data").expect_err("8-byte key");
        assert!(matches!(err, VaultError::InvalidKeySize { len: 8 }));
        assert!(!is_supported_key_size(8));
    }

    #[test]
    fn record_serializes_payload_as_base64() {
        let json = String::from_utf8(Record::plain(b"hi".to_vec()).to_bytes().expect("encode"))
            .expect("utf8");
        assert_eq!(json, r#"{"cipher":"","data":"aGk="}"#);

        let record = Record::from_bytes(br#"{"data":null}"#).expect("decode");
        assert!(!record.is_sealed());
        assert!(record.data.is_empty());
    }

    #[test]
    fn garbage_is_a_malformed_record() {
        let err = Record::from_bytes(b"{not json").expect_err("malformed");
        assert!(matches!(err, VaultError::MalformedRecord(_)));
    }
}
