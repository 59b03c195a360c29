//! The storage tier contract.

use tfsafe_core::{BackupRecord, Cancellation, TfSafeResult};

/// Extension of payload files in every tier.
pub const BACKUP_FILE_EXTENSION: &str = ".bak";

/// Extension of sidecar metadata files on the local tier.
pub const METADATA_FILE_EXTENSION: &str = ".meta";

/// Contract implemented by every storage tier.
///
/// A tier owns the records it stores and its own catalog. Fingerprints are
/// verified on every retrieval; a mismatch surfaces as corruption, never as
/// silently different bytes.
pub trait StorageBackend: Send + Sync {
    /// Prepares the tier for use; failures are fatal.
    fn initialize(&self, cancel: &Cancellation) -> TfSafeResult<()>;

    /// Stores `data` under `id`, filling tier-owned fields of `record`
    /// (fingerprint when empty, size, tier tag, location).
    fn store(
        &self,
        cancel: &Cancellation,
        id: &str,
        data: &[u8],
        record: &mut BackupRecord,
    ) -> TfSafeResult<()>;

    /// Retrieves the payload and record for `id`, verifying the fingerprint.
    fn retrieve(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<(Vec<u8>, BackupRecord)>;

    /// Lists records in this tier, newest first. Ground truth for existence.
    fn list(&self, cancel: &Cancellation) -> TfSafeResult<Vec<BackupRecord>>;

    /// Removes `id` from this tier; absent entries are not an error.
    fn delete(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<()>;

    /// Whether `id` exists in this tier.
    fn exists(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<bool>;

    /// Tier tag recorded on stored backups (`local` or the provider name).
    fn kind(&self) -> &str;
}
