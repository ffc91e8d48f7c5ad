//! AES-256-GCM encryption for tenant database credentials
//!
//! Tenant database passwords are stored in the central registry as
//! ciphertext. Encryption happens when a tenant is created or its
//! credentials rotate; decryption happens only inside the connection
//! router, immediately before a connection is configured. The plaintext
//! is never persisted, cached, or logged.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use thiserror::Error;

/// Encryption key for AES-256-GCM, loaded from `TENANT_ENCRYPTION_KEY`
#[derive(Clone)]
pub struct EncryptionKey {
    key: [u8; 32],
}

// No Debug derive: the key must not end up in logs via {:?}
impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encryption error types
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key: must be exactly 32 bytes (256 bits)")]
    InvalidKeyLength,

    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid ciphertext format")]
    InvalidCiphertextFormat,
}

impl EncryptionKey {
    /// Create a new encryption key from a 32-byte array
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create encryption key from a base64-encoded string
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(encoded)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Create encryption key from the `TENANT_ENCRYPTION_KEY` environment variable
    pub fn from_env() -> Result<Self, CryptoError> {
        let encoded =
            std::env::var("TENANT_ENCRYPTION_KEY").map_err(|_| CryptoError::InvalidKeyLength)?;
        Self::from_base64(&encoded)
    }
}

/// Encrypt a tenant database password
///
/// Returns base64-encoded ciphertext in the format `nonce:ciphertext`,
/// with a random 96-bit nonce per encryption.
pub fn encrypt(key: &EncryptionKey, plaintext: &str) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(&key.key).map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(format!(
        "{}:{}",
        BASE64.encode(nonce_bytes),
        BASE64.encode(&ciphertext)
    ))
}

/// Decrypt a password previously encrypted with [`encrypt`]
pub fn decrypt(key: &EncryptionKey, encrypted: &str) -> Result<String, CryptoError> {
    let (nonce_b64, ciphertext_b64) = encrypted
        .split_once(':')
        .ok_or(CryptoError::InvalidCiphertextFormat)?;
    if ciphertext_b64.contains(':') {
        return Err(CryptoError::InvalidCiphertextFormat);
    }

    let nonce_bytes = BASE64.decode(nonce_b64)?;
    if nonce_bytes.len() != 12 {
        return Err(CryptoError::InvalidCiphertextFormat);
    }
    let ciphertext = BASE64.decode(ciphertext_b64)?;

    let cipher = Aes256Gcm::new_from_slice(&key.key).map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EncryptionKey {
        EncryptionKey::new([0x42u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let encrypted = encrypt(&key, "tenant-db-password").unwrap();
        assert_eq!(decrypt(&key, &encrypted).unwrap(), "tenant-db-password");
    }

    #[test]
    fn test_nonce_is_random() {
        let key = test_key();
        let a = encrypt(&key, "same-input").unwrap();
        let b = encrypt(&key, "same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let encrypted = encrypt(&test_key(), "secret").unwrap();
        let other = EncryptionKey::new([0xffu8; 32]);
        assert!(matches!(
            decrypt(&other, &encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_decrypt_rejects_malformed_input() {
        let key = test_key();
        for bad in ["no-separator", "a:b:c", ""] {
            assert!(matches!(
                decrypt(&key, bad),
                Err(CryptoError::InvalidCiphertextFormat)
            ));
        }
    }

    #[test]
    fn test_key_from_base64_wrong_length() {
        let short = BASE64.encode([0x42u8; 16]);
        assert!(matches!(
            EncryptionKey::from_base64(&short),
            Err(CryptoError::InvalidKeyLength)
        ));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", test_key());
        assert_eq!(rendered, "EncryptionKey(..)");
    }
}
