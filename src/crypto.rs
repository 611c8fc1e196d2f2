//! Credential encryption at rest.
//!
//! AES-256-GCM with a fresh random nonce per value; the nonce is prefixed to
//! the sealed bytes and the whole blob is base64-encoded. Absent and empty
//! values pass through as `None` without touching the cipher, so an account
//! with no refresh token stays `NULL` in storage.

use crate::config::CONFIG;
use crate::error::HubError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

const NONCE_LEN: usize = 12;

pub struct CredentialCodec {
    cipher: Aes256Gcm,
}

impl CredentialCodec {
    /// Build the codec from a base64-encoded 32-byte key.
    pub fn new(key_b64: &str) -> Result<Self, HubError> {
        let key = B64
            .decode(key_b64)
            .map_err(|e| HubError::EncryptionConfig(format!("SECRET_KEY is not base64: {e}")))?;
        if key.len() != 32 {
            return Err(HubError::EncryptionConfig(format!(
                "SECRET_KEY must decode to 32 bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| HubError::EncryptionConfig(format!("invalid AES key: {e}")))?;
        Ok(Self { cipher })
    }

    /// Build from process configuration. A missing key is a startup error.
    pub fn from_config() -> Result<Self, HubError> {
        let key = CONFIG.secret_key.as_deref().ok_or_else(|| {
            HubError::EncryptionConfig(
                "DRIVEHUB_SECRET_KEY must be set for credential encryption".to_string(),
            )
        })?;
        Self::new(key)
    }

    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>, HubError> {
        let Some(value) = plaintext.filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, value.as_bytes())
            .map_err(|_| HubError::Crypto("encryption failed".to_string()))?;
        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&sealed);
        Ok(Some(B64.encode(combined)))
    }

    pub fn decrypt(&self, ciphertext: Option<&str>) -> Result<Option<String>, HubError> {
        let Some(value) = ciphertext.filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        let combined = B64
            .decode(value)
            .map_err(|e| HubError::Crypto(format!("ciphertext is not base64: {e}")))?;
        if combined.len() <= NONCE_LEN {
            return Err(HubError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let opened = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|_| HubError::Crypto("decryption failed".to_string()))?;
        let plaintext = String::from_utf8(opened)
            .map_err(|e| HubError::Crypto(format!("decrypted value is not utf-8: {e}")))?;
        Ok(Some(plaintext))
    }
}
