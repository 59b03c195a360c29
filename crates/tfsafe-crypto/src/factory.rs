//! Provider selection from the configuration descriptor.
//!
//! Recognized kinds: `passphrase` (alias `aes`), `kms`, `none`. An empty or
//! unrecognized kind falls back to `none` only when empty; unknown kinds are
//! a configuration error. Providers come back initialized; initialization
//! failures propagate as fatal startup errors.

use tracing::info;

use tfsafe_core::{EncryptionConfig, TfSafeError, TfSafeResult};

use crate::aes::AesProvider;
use crate::kms::{KmsClient, KmsProvider};
use crate::noop::NoopProvider;
use crate::provider::EncryptionProvider;

/// Region used when the key identifier does not name one.
pub const DEFAULT_KMS_REGION: &str = "us-east-1";

/// Builds and initializes the provider selected by `config`.
///
/// The `kms` kind needs a client for the remote service; the caller supplies
/// it because the service SDK is outside this crate's scope.
pub fn create_provider(
    config: &EncryptionConfig,
    kms_client: Option<Box<dyn KmsClient>>,
) -> TfSafeResult<Box<dyn EncryptionProvider>> {
    match config.provider.as_str() {
        "aes" | "passphrase" => {
            if config.passphrase.is_empty() {
                return Err(TfSafeError::ConfigInvalid {
                    reason: "encryption.passphrase is required for passphrase encryption"
                        .to_string(),
                });
            }
            let mut provider = AesProvider::from_passphrase(&config.passphrase)?;
            provider.initialize()?;
            info!(kind = "AES", "encryption provider initialized");
            Ok(Box::new(provider))
        }

        "kms" => {
            if config.kms_key_id.is_empty() {
                return Err(TfSafeError::ConfigInvalid {
                    reason: "encryption.kms_key_id is required for KMS encryption".to_string(),
                });
            }
            let client = kms_client.ok_or_else(|| TfSafeError::ConfigInvalid {
                reason: "KMS encryption requires a key-management client".to_string(),
            })?;
            let region = extract_region_from_key_id(&config.kms_key_id)
                .unwrap_or_else(|| DEFAULT_KMS_REGION.to_string());
            let mut provider = KmsProvider::new(client, config.kms_key_id.clone(), region)?;
            provider.initialize()?;
            info!(kind = "KMS", key_id = %config.kms_key_id, "encryption provider initialized");
            Ok(Box::new(provider))
        }

        "none" | "" => Ok(Box::new(NoopProvider::new())),

        other => Err(TfSafeError::ConfigInvalid {
            reason: format!("unsupported encryption provider: {other}"),
        }),
    }
}

/// Pulls the region out of an ARN-shaped key identifier.
///
/// ARN layout: `arn:aws:kms:<region>:<account>:key/<id>`. Returns `None` for
/// bare key ids and aliases.
pub fn extract_region_from_key_id(key_id: &str) -> Option<String> {
    let mut parts = key_id.split(':');
    if parts.next()? != "arn" {
        return None;
    }
    let _partition = parts.next()?;
    if parts.next()? != "kms" {
        return None;
    }
    let region = parts.next()?;
    if region.is_empty() {
        None
    } else {
        Some(region.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::MemoryKmsClient;

    fn config(provider: &str) -> EncryptionConfig {
        EncryptionConfig {
            provider: provider.to_string(),
            kms_key_id: String::new(),
            passphrase: String::new(),
        }
    }

    #[test]
    fn test_empty_kind_defaults_to_none() {
        let provider = create_provider(&config(""), None).unwrap();
        assert_eq!(provider.key_info().kind, "None");
    }

    #[test]
    fn test_none_kind() {
        let provider = create_provider(&config("none"), None).unwrap();
        assert!(!provider.encrypts());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = create_provider(&config("rot13"), None).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn test_passphrase_and_aes_are_aliases() {
        for kind in ["aes", "passphrase"] {
            let mut cfg = config(kind);
            cfg.passphrase = "hunter2hunter2".to_string();
            let provider = create_provider(&cfg, None).unwrap();
            assert_eq!(provider.key_info().kind, "AES");
        }
    }

    #[test]
    fn test_passphrase_required() {
        assert!(create_provider(&config("passphrase"), None).is_err());
    }

    #[test]
    fn test_kms_requires_key_id_and_client() {
        let mut cfg = config("kms");
        assert!(create_provider(&cfg, None).is_err());

        cfg.kms_key_id = "alias/tf-safe".to_string();
        assert!(create_provider(&cfg, None).is_err());

        let client = MemoryKmsClient::with_key("alias/tf-safe");
        let provider = create_provider(&cfg, Some(Box::new(client))).unwrap();
        assert_eq!(provider.key_info().kind, "KMS");
    }

    #[test]
    fn test_region_extraction_from_arn() {
        assert_eq!(
            extract_region_from_key_id("arn:aws:kms:eu-central-1:123456789012:key/abc"),
            Some("eu-central-1".to_string())
        );
        assert_eq!(extract_region_from_key_id("alias/tf-safe"), None);
        assert_eq!(extract_region_from_key_id("arn:aws:s3:::bucket"), None);
    }

    #[test]
    fn test_disabled_key_fails_factory() {
        let client = MemoryKmsClient::new();
        client.add_key("alias/frozen", false);
        let mut cfg = config("kms");
        cfg.kms_key_id = "alias/frozen".to_string();
        let err = create_provider(&cfg, Some(Box::new(client))).unwrap_err();
        assert!(matches!(err, TfSafeError::EncryptionFailed { .. }));
    }
}
