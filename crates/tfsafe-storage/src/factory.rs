//! Backend construction from validated configuration.
//!
//! Selection is a tagged choice over a finite set of variants; nothing
//! outside this module inspects provider names.

use tfsafe_core::{LocalConfig, RemoteConfig, TfSafeError, TfSafeResult};

use crate::local::LocalStorage;
use crate::object_store::{MemoryObjectStore, ObjectStore};
use crate::remote::RemoteStorage;

/// Builds the local tier from its configuration.
pub fn create_local(config: LocalConfig) -> TfSafeResult<LocalStorage> {
    if config.path.is_empty() {
        return Err(TfSafeError::ConfigInvalid {
            reason: "local.path is required".to_string(),
        });
    }
    Ok(LocalStorage::new(config))
}

/// Builds the remote tier over the given object store.
pub fn create_remote(
    config: RemoteConfig,
    store: Box<dyn ObjectStore>,
) -> TfSafeResult<RemoteStorage> {
    if config.bucket.is_empty() {
        return Err(TfSafeError::ConfigInvalid {
            reason: "remote.bucket is required".to_string(),
        });
    }
    Ok(RemoteStorage::new(config, store))
}

/// Builds an object store for a provider name.
///
/// `memory` is the in-process store. The cloud providers (`s3`, `gcs`,
/// `azure`) need their service clients linked in by the embedding
/// application; this build recognizes the names but cannot construct them.
pub fn create_object_store(provider: &str) -> TfSafeResult<Box<dyn ObjectStore>> {
    match provider {
        "memory" => Ok(Box::new(MemoryObjectStore::new())),
        "s3" | "gcs" | "azure" => Err(TfSafeError::ConfigInvalid {
            reason: format!(
                "remote provider '{provider}' requires a linked object-store client; \
                 this build provides: memory"
            ),
        }),
        other => Err(TfSafeError::ConfigInvalid {
            reason: format!("unsupported remote provider: {other}"),
        }),
    }
}
