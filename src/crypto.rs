//! Encryption and hashing capability
//!
//! The transformer stages never touch key material directly; they receive a
//! `CipherService` through the pipeline context. Production uses AES-256-GCM
//! with SHA-256 hashing; tests substitute a plaintext double.
//!
//! Ciphertext wire format: `v2:` prefix + base64(nonce || ciphertext). The
//! legacy format from releases before the encryption migration is the same
//! payload without the version prefix; `decrypt` accepts both.

use crate::error::{Result, SyncError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

const CIPHERTEXT_PREFIX: &str = "v2:";
const NONCE_LEN: usize = 12;

pub trait CipherService: Send + Sync {
    /// Encrypt to the current ciphertext format.
    fn encrypt(&self, plaintext: &[u8]) -> Result<String>;

    /// Decrypt either the current or the legacy ciphertext format.
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>>;

    /// Hex-encoded digest of `value`.
    fn hash(&self, value: &[u8]) -> String;
}

pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build from a hex-encoded 256-bit key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| SyncError::Crypto(format!("invalid encryption key: {}", e)))?;
        if bytes.len() != 32 {
            return Err(SyncError::Crypto(format!(
                "encryption key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }
}

impl CipherService for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SyncError::Crypto("encryption failed".to_string()))?;
        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&sealed);
        Ok(format!("{}{}", CIPHERTEXT_PREFIX, BASE64.encode(payload)))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let encoded = ciphertext
            .strip_prefix(CIPHERTEXT_PREFIX)
            .unwrap_or(ciphertext);
        let payload = BASE64
            .decode(encoded)
            .map_err(|e| SyncError::Crypto(format!("malformed ciphertext: {}", e)))?;
        if payload.len() <= NONCE_LEN {
            return Err(SyncError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| SyncError::Crypto("decryption failed".to_string()))
    }

    fn hash(&self, value: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value);
        hex::encode(hasher.finalize())
    }
}

/// Capability for deployments that hash tokens but never configured an
/// encryption key. Hashing works; any encrypt/decrypt call is a
/// configuration fault surfaced as an error.
pub struct HashOnlyCipher;

impl CipherService for HashOnlyCipher {
    fn encrypt(&self, _plaintext: &[u8]) -> Result<String> {
        Err(SyncError::Crypto(
            "no encryption key configured".to_string(),
        ))
    }

    fn decrypt(&self, _ciphertext: &str) -> Result<Vec<u8>> {
        Err(SyncError::Crypto(
            "no encryption key configured".to_string(),
        ))
    }

    fn hash(&self, value: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value);
        hex::encode(hasher.finalize())
    }
}
