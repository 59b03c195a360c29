//! Pass-through provider used when encryption is disabled.

use tfsafe_core::TfSafeResult;

use crate::provider::{EncryptionProvider, KeyInfo};

/// Provider that stores payloads as-is.
///
/// Both paths return a defensive copy so callers can never alias the input
/// buffer through the output.
#[derive(Debug, Default)]
pub struct NoopProvider;

impl NoopProvider {
    /// Creates the pass-through provider.
    pub fn new() -> Self {
        Self
    }
}

impl EncryptionProvider for NoopProvider {
    fn initialize(&mut self) -> TfSafeResult<()> {
        Ok(())
    }

    fn encrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> TfSafeResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn key_info(&self) -> KeyInfo {
        KeyInfo {
            kind: "None".to_string(),
            key_id: None,
            algorithm: "None".to_string(),
            key_size: 0,
            description: "No encryption (pass-through)".to_string(),
        }
    }

    fn encrypts(&self) -> bool {
        false
    }
}
