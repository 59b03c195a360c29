//! AES-256-GCM provider with PBKDF2 passphrase derivation.
//!
//! Output format is `nonce || ciphertext_with_tag`, nonce 12 bytes, tag 16.
//! Passphrase keys are derived with PBKDF2-HMAC-SHA256 over a random 32-byte
//! salt and 100_000 iterations. Key material is zeroized on drop.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use tfsafe_core::{TfSafeError, TfSafeResult};

use crate::provider::{EncryptionProvider, KeyInfo};

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count for passphrase-derived keys.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length for passphrase-derived keys.
pub const SALT_SIZE: usize = 32;

/// 256-bit key material, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct KeyMaterial([u8; 32]);

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial([REDACTED])")
    }
}

/// AES-256-GCM encryption provider.
pub struct AesProvider {
    key: KeyMaterial,
    cipher: Option<Aes256Gcm>,
    key_source: &'static str,
    info: KeyInfo,
}

impl AesProvider {
    /// Derives a key from a passphrase with PBKDF2-HMAC-SHA256.
    pub fn from_passphrase(passphrase: &str) -> TfSafeResult<Self> {
        if passphrase.is_empty() {
            return Err(TfSafeError::EncryptionFailed {
                reason: "passphrase cannot be empty".to_string(),
            });
        }

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);

        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut key);

        Ok(Self::build(key, "passphrase", "AES-256-GCM with PBKDF2 key derivation"))
    }

    /// Uses the provided 32-byte key directly.
    pub fn with_key(key: &[u8]) -> TfSafeResult<Self> {
        let key: [u8; 32] = key.try_into().map_err(|_| TfSafeError::EncryptionFailed {
            reason: format!("key must be 32 bytes for AES-256, got {}", key.len()),
        })?;
        Ok(Self::build(key, "provided", "AES-256-GCM with provided key"))
    }

    /// Generates a random key.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::build(key, "generated", "AES-256-GCM with randomly generated key")
    }

    fn build(key: [u8; 32], key_source: &'static str, description: &str) -> Self {
        Self {
            key: KeyMaterial(key),
            cipher: None,
            key_source,
            info: KeyInfo {
                kind: "AES".to_string(),
                key_id: None,
                algorithm: "AES-256-GCM".to_string(),
                key_size: 256,
                description: description.to_string(),
            },
        }
    }

    /// How this provider was keyed: `passphrase`, `provided`, or `generated`.
    pub fn key_source(&self) -> &'static str {
        self.key_source
    }

    fn cipher(&self) -> TfSafeResult<&Aes256Gcm> {
        self.cipher.as_ref().ok_or_else(|| TfSafeError::EncryptionFailed {
            reason: "encryption provider not initialized".to_string(),
        })
    }
}

impl EncryptionProvider for AesProvider {
    fn initialize(&mut self) -> TfSafeResult<()> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key.0).map_err(|e| TfSafeError::EncryptionFailed {
                reason: format!("failed to build AES-256-GCM cipher: {e}"),
            })?;
        self.cipher = Some(cipher);
        Ok(())
    }

    fn encrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| TfSafeError::EncryptionFailed {
                reason: format!("AES-GCM encryption failed: {e}"),
            })?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>> {
        let cipher = self.cipher()?;

        if data.len() < NONCE_SIZE {
            return Err(TfSafeError::EncryptionFailed {
                reason: "encrypted data too short".to_string(),
            });
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| TfSafeError::EncryptionFailed {
                reason: format!("AES-GCM decryption failed: {e}"),
            })
    }

    fn key_info(&self) -> KeyInfo {
        self.info.clone()
    }

    fn encrypts(&self) -> bool {
        true
    }
}
