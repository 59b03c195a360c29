//! Envelope encryption via a remote key-management service.
//!
//! The KMS wire protocol is out of scope; [`KmsClient`] is the contract the
//! provider consumes. The ciphertext blob is opaque to us and carries the key
//! identifier internally, so decryption takes no key id. Initialization
//! validates key access and that the key is enabled; a disabled key is a
//! fatal initialization failure.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use tfsafe_core::{TfSafeError, TfSafeResult};

use crate::provider::{EncryptionProvider, KeyInfo};

/// Result of describing a KMS key.
#[derive(Debug, Clone)]
pub struct KmsKeyDescriptor {
    /// Canonical key identifier.
    pub key_id: String,
    /// Whether the key is enabled for use.
    pub enabled: bool,
    /// Service-side description, when present.
    pub description: Option<String>,
}

/// Contract over the key-management service operations the provider needs.
pub trait KmsClient: Send + Sync {
    /// Describes a key, verifying access.
    fn describe_key(&self, key_id: &str) -> TfSafeResult<KmsKeyDescriptor>;

    /// Encrypts `plaintext` under `key_id`, returning an opaque blob.
    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> TfSafeResult<Vec<u8>>;

    /// Decrypts an opaque blob; the key id travels inside the blob.
    fn decrypt(&self, ciphertext: &[u8]) -> TfSafeResult<Vec<u8>>;
}

/// Encryption provider delegating to a [`KmsClient`].
pub struct KmsProvider {
    client: Box<dyn KmsClient>,
    key_id: String,
    region: String,
    info: KeyInfo,
    initialized: bool,
}

impl KmsProvider {
    /// Builds a provider over `client` for `key_id` in `region`.
    pub fn new(
        client: Box<dyn KmsClient>,
        key_id: impl Into<String>,
        region: impl Into<String>,
    ) -> TfSafeResult<Self> {
        let key_id = key_id.into();
        let region = region.into();
        if key_id.is_empty() {
            return Err(TfSafeError::EncryptionFailed {
                reason: "KMS key ID cannot be empty".to_string(),
            });
        }
        if region.is_empty() {
            return Err(TfSafeError::EncryptionFailed {
                reason: "KMS region cannot be empty".to_string(),
            });
        }

        let info = KeyInfo {
            kind: "KMS".to_string(),
            key_id: Some(key_id.clone()),
            algorithm: "KMS-ENVELOPE".to_string(),
            // The service manages key size.
            key_size: 0,
            description: format!("KMS encryption with key {key_id} in region {region}"),
        };

        Ok(Self {
            client,
            key_id,
            region,
            info,
            initialized: false,
        })
    }

    /// The configured region.
    pub fn region(&self) -> &str {
        &self.region
    }

    fn require_initialized(&self) -> TfSafeResult<()> {
        if !self.initialized {
            return Err(TfSafeError::EncryptionFailed {
                reason: "KMS provider not initialized".to_string(),
            });
        }
        Ok(())
    }
}

impl EncryptionProvider for KmsProvider {
    fn initialize(&mut self) -> TfSafeResult<()> {
        let descriptor = self.client.describe_key(&self.key_id)?;
        if !descriptor.enabled {
            return Err(TfSafeError::EncryptionFailed {
                reason: format!("KMS key {} is not enabled", self.key_id),
            });
        }

        self.info.key_id = Some(descriptor.key_id.clone());
        if let Some(desc) = descriptor.description {
            self.info.description = format!("KMS key: {desc}");
        }
        debug!(key_id = %descriptor.key_id, "KMS key validated");

        self.initialized = true;
        Ok(())
    }

    fn encrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>> {
        self.require_initialized()?;
        self.client.encrypt(&self.key_id, data)
    }

    fn decrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>> {
        self.require_initialized()?;
        self.client.decrypt(data)
    }

    fn key_info(&self) -> KeyInfo {
        self.info.clone()
    }

    fn encrypts(&self) -> bool {
        true
    }
}

/// Magic prefix of blobs produced by [`MemoryKmsClient`].
const MEMORY_BLOB_MAGIC: &[u8; 6] = b"TFKMS1";

/// Authentication tag length inside memory-client blobs.
const MEMORY_TAG_SIZE: usize = 32;

/// In-process KMS used by tests and local development.
///
/// Blobs are tamper-evident: `magic || kid_len || kid || body || tag` where
/// `body` is the plaintext masked with a keystream derived from the key id
/// and `tag` authenticates the whole blob.
pub struct MemoryKmsClient {
    keys: Mutex<HashMap<String, bool>>,
}

impl MemoryKmsClient {
    /// An empty client; register keys with [`MemoryKmsClient::add_key`].
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// A client holding one enabled key.
    pub fn with_key(key_id: impl Into<String>) -> Self {
        let client = Self::new();
        client.add_key(key_id, true);
        client
    }

    /// Registers a key, enabled or disabled.
    pub fn add_key(&self, key_id: impl Into<String>, enabled: bool) {
        self.keys.lock().unwrap().insert(key_id.into(), enabled);
    }

    /// Disables a registered key.
    pub fn disable_key(&self, key_id: &str) {
        self.keys.lock().unwrap().insert(key_id.to_string(), false);
    }

    fn key_state(&self, key_id: &str) -> TfSafeResult<bool> {
        self.keys
            .lock()
            .unwrap()
            .get(key_id)
            .copied()
            .ok_or_else(|| TfSafeError::EncryptionFailed {
                reason: format!("KMS key {key_id} does not exist"),
            })
    }

    fn keystream_byte(key_id: &str, index: usize) -> u8 {
        let block = index / 32;
        let digest = Sha256::digest([key_id.as_bytes(), block.to_le_bytes().as_slice()].concat());
        digest[index % 32]
    }

    fn tag(key_id: &str, body: &[u8]) -> [u8; MEMORY_TAG_SIZE] {
        let digest = Sha256::digest([MEMORY_BLOB_MAGIC.as_slice(), key_id.as_bytes(), body].concat());
        digest.into()
    }
}

impl Default for MemoryKmsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KmsClient for MemoryKmsClient {
    fn describe_key(&self, key_id: &str) -> TfSafeResult<KmsKeyDescriptor> {
        let enabled = self.key_state(key_id)?;
        Ok(KmsKeyDescriptor {
            key_id: key_id.to_string(),
            enabled,
            description: Some("in-memory key".to_string()),
        })
    }

    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> TfSafeResult<Vec<u8>> {
        if !self.key_state(key_id)? {
            return Err(TfSafeError::EncryptionFailed {
                reason: format!("KMS key {key_id} is not enabled"),
            });
        }

        let body: Vec<u8> = plaintext
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ Self::keystream_byte(key_id, i))
            .collect();

        let kid = key_id.as_bytes();
        let mut blob = Vec::with_capacity(
            MEMORY_BLOB_MAGIC.len() + 2 + kid.len() + body.len() + MEMORY_TAG_SIZE,
        );
        blob.extend_from_slice(MEMORY_BLOB_MAGIC);
        blob.extend_from_slice(&(kid.len() as u16).to_le_bytes());
        blob.extend_from_slice(kid);
        blob.extend_from_slice(&body);
        blob.extend_from_slice(&Self::tag(key_id, &body));
        Ok(blob)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> TfSafeResult<Vec<u8>> {
        let malformed = || TfSafeError::EncryptionFailed {
            reason: "malformed KMS ciphertext blob".to_string(),
        };

        let rest = ciphertext
            .strip_prefix(MEMORY_BLOB_MAGIC.as_slice())
            .ok_or_else(malformed)?;
        if rest.len() < 2 {
            return Err(malformed());
        }
        let kid_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let rest = &rest[2..];
        if rest.len() < kid_len + MEMORY_TAG_SIZE {
            return Err(malformed());
        }
        let key_id = std::str::from_utf8(&rest[..kid_len]).map_err(|_| malformed())?;
        let (body, tag) = rest[kid_len..].split_at(rest.len() - kid_len - MEMORY_TAG_SIZE);

        if tag != Self::tag(key_id, body) {
            return Err(TfSafeError::EncryptionFailed {
                reason: "KMS ciphertext failed authentication".to_string(),
            });
        }
        if !self.key_state(key_id)? {
            return Err(TfSafeError::EncryptionFailed {
                reason: format!("KMS key {key_id} is not enabled"),
            });
        }

        Ok(body
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ Self::keystream_byte(key_id, i))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(key_id: &str) -> KmsProvider {
        let client = MemoryKmsClient::with_key(key_id);
        let mut p = KmsProvider::new(Box::new(client), key_id, "us-west-2").unwrap();
        p.initialize().unwrap();
        p
    }

    #[test]
    fn test_round_trip() {
        let p = provider("alias/tf-safe");
        let wrapped = p.encrypt(b"state bytes").unwrap();
        assert_ne!(&wrapped[..], b"state bytes");
        assert_eq!(p.decrypt(&wrapped).unwrap(), b"state bytes");
    }

    #[test]
    fn test_blob_carries_key_id_internally() {
        let p = provider("alias/tf-safe");
        let wrapped = p.encrypt(b"x").unwrap();
        // Decryption never receives the key id from the caller.
        let client = MemoryKmsClient::with_key("alias/tf-safe");
        assert_eq!(client.decrypt(&wrapped).unwrap(), b"x");
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let p = provider("alias/tf-safe");
        let wrapped = p.encrypt(b"payload").unwrap();
        let mut tampered = wrapped.clone();
        let mid = tampered.len() / 2;
        tampered[mid] ^= 0x40;
        assert!(p.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_disabled_key_is_fatal_at_initialization() {
        let client = MemoryKmsClient::new();
        client.add_key("alias/frozen", false);
        let mut p = KmsProvider::new(Box::new(client), "alias/frozen", "us-west-2").unwrap();
        let err = p.initialize().unwrap_err();
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    fn test_missing_key_is_fatal_at_initialization() {
        let client = MemoryKmsClient::new();
        let mut p = KmsProvider::new(Box::new(client), "alias/ghost", "us-west-2").unwrap();
        assert!(p.initialize().is_err());
    }

    #[test]
    fn test_uninitialized_provider_refuses_work() {
        let client = MemoryKmsClient::with_key("alias/tf-safe");
        let p = KmsProvider::new(Box::new(client), "alias/tf-safe", "us-west-2").unwrap();
        assert!(p.encrypt(b"x").is_err());
    }

    #[test]
    fn test_empty_key_id_rejected() {
        let client = MemoryKmsClient::new();
        assert!(KmsProvider::new(Box::new(client), "", "us-west-2").is_err());
    }

    #[test]
    fn test_key_disabled_after_wrap_blocks_unwrap() {
        let client = MemoryKmsClient::with_key("alias/rotating");
        let wrapped = client.encrypt("alias/rotating", b"old state").unwrap();
        client.disable_key("alias/rotating");
        assert!(client.decrypt(&wrapped).is_err());
    }
}
