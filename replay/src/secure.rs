//! AES-256-GCM protected JSON cache.
//!
//! Used for security metadata (account SIDs, administrator groups, farm
//! membership) that must not sit on disk in clear text. File layout:
//! `[nonce (12 bytes)][ciphertext]`.

use crate::cache::write_atomic;
use crate::error::{ReplayError, Result};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NONCE_LEN: usize = 12;

/// Encrypted JSON file.
#[derive(Clone)]
pub struct EncryptedCache {
    path: PathBuf,
    cipher: Arc<Aes256Gcm>,
}

impl std::fmt::Debug for EncryptedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EncryptedCache {
    /// Cache at `path` encrypted with a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Crypto`] if the key is not 32 bytes long.
    pub fn new(path: impl Into<PathBuf>, key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(ReplayError::Crypto(
                "Encryption key must be exactly 32 bytes (256 bits) for AES-256-GCM".to_string(),
            ));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| ReplayError::Crypto(format!("Failed to initialize AES-256-GCM cipher: {e}")))?;
        Ok(Self {
            path: path.into(),
            cipher: Arc::new(cipher),
        })
    }

    /// Same as [`EncryptedCache::new`] with a base64 (standard alphabet) key.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Crypto`] if the key is not valid base64 or not 32 bytes.
    pub fn from_base64_key(path: impl Into<PathBuf>, key: &str) -> Result<Self> {
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| ReplayError::Crypto(format!("Encryption key is not base64: {e}")))?;
        Self::new(path, &key)
    }

    /// Location of the encrypted file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decrypt and deserialize the cached value, `None` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, was written with another
    /// key, was tampered with, or does not hold a `T`.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.len() < NONCE_LEN {
            return Err(ReplayError::Crypto(
                "Encrypted data too short (missing nonce)".to_string(),
            ));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| ReplayError::Crypto(format!("Decryption failed: {e}")))?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    /// Serialize, encrypt under a fresh nonce and replace the file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, encryption or the write fails.
    pub async fn store<T: Serialize>(&self, value: &T) -> Result<()> {
        let plaintext = serde_json::to_vec(value)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| ReplayError::Crypto(format!("Encryption failed: {e}")))?;

        let mut data = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);
        write_atomic(&self.path, &data).await
    }
}
