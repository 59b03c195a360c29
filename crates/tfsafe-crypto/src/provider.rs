//! The encryption capability contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use tfsafe_core::TfSafeResult;

/// Opaque descriptor of a provider's key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Provider kind: `AES`, `KMS`, or `None`.
    pub kind: String,
    /// Key identifier, when the provider has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Algorithm name, e.g. `AES-256-GCM`.
    pub algorithm: String,
    /// Key size in bits; `0` when the service manages the key.
    pub key_size: u32,
    /// Human-readable description.
    pub description: String,
}

/// Wrap/unwrap capability over backup payloads.
///
/// Providers are initialized before first use; initialization may contact
/// remote services and its failure is a fatal startup error.
pub trait EncryptionProvider: Send + Sync {
    /// Prepares the provider for use. May contact remote services.
    fn initialize(&mut self) -> TfSafeResult<()>;

    /// Wraps `data` for storage at rest.
    fn encrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>>;

    /// Unwraps data previously produced by [`EncryptionProvider::encrypt`].
    fn decrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>>;

    /// Descriptor of the key material in use.
    fn key_info(&self) -> KeyInfo;

    /// Whether wrapped payloads are actually ciphertext.
    fn encrypts(&self) -> bool;
}

impl fmt::Debug for dyn EncryptionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionProvider")
            .field("key_info", &self.key_info())
            .finish()
    }
}
