//! The backup engine: detect, wrap, fan out, list, validate, prune.
//!
//! The local tier is the durable unit: a remote store failure during backup
//! is logged and degrades the operation instead of failing it. Identifiers
//! have one-second granularity by contract; a collision is surfaced, never
//! silently disambiguated.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use tfsafe_core::{
    backup_id_at, file_exists, sha256_hex, BackupOptions, BackupRecord, Cancellation,
    RetentionConfig, TfSafeError, TfSafeResult,
};
use tfsafe_crypto::EncryptionProvider;
use tfsafe_storage::StorageBackend;

use crate::detector::StateDetector;
use crate::retention::RetentionPlanner;

/// Default deadline applied to each tier call.
pub const DEFAULT_TIER_TIMEOUT: Duration = Duration::from_secs(30);

/// What a retention pass deleted per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    /// Backups deleted from the local tier.
    pub local_deleted: usize,
    /// Backups deleted from the remote tier.
    pub remote_deleted: usize,
}

/// Builder for [`BackupEngine`].
pub struct BackupEngineBuilder {
    local: Option<Arc<dyn StorageBackend>>,
    remote: Option<Arc<dyn StorageBackend>>,
    encryption: Arc<dyn EncryptionProvider>,
    retention: RetentionConfig,
    tier_timeout: Duration,
}

impl BackupEngineBuilder {
    /// Starts a builder with the given encryption provider.
    pub fn new(encryption: Arc<dyn EncryptionProvider>) -> Self {
        Self {
            local: None,
            remote: None,
            encryption,
            retention: RetentionConfig {
                local_count: 10,
                remote_count: 50,
                max_age_days: 0,
            },
            tier_timeout: DEFAULT_TIER_TIMEOUT,
        }
    }

    /// Enables the local tier.
    pub fn local(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    /// Enables the remote tier.
    pub fn remote(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.remote = Some(backend);
        self
    }

    /// Sets the retention configuration.
    pub fn retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Overrides the per-tier call deadline.
    pub fn tier_timeout(mut self, timeout: Duration) -> Self {
        self.tier_timeout = timeout;
        self
    }

    /// Finishes the build. At least one tier must be enabled.
    pub fn build(self) -> TfSafeResult<BackupEngine> {
        if self.local.is_none() && self.remote.is_none() {
            return Err(TfSafeError::ConfigInvalid {
                reason: "at least one storage tier must be enabled".to_string(),
            });
        }
        Ok(BackupEngine {
            local: self.local,
            remote: self.remote,
            encryption: self.encryption,
            planner: RetentionPlanner::new(self.retention),
            detector: StateDetector::new(),
            tier_timeout: self.tier_timeout,
        })
    }
}

/// Stateless engine over injected tiers and the encryption provider.
pub struct BackupEngine {
    local: Option<Arc<dyn StorageBackend>>,
    remote: Option<Arc<dyn StorageBackend>>,
    encryption: Arc<dyn EncryptionProvider>,
    planner: RetentionPlanner,
    detector: StateDetector,
    tier_timeout: Duration,
}

impl BackupEngine {
    /// The engine's state detector.
    pub fn detector(&self) -> &StateDetector {
        &self.detector
    }

    /// The encryption provider in use.
    pub fn encryption(&self) -> &dyn EncryptionProvider {
        self.encryption.as_ref()
    }

    fn primary(&self) -> &Arc<dyn StorageBackend> {
        self.local
            .as_ref()
            .or(self.remote.as_ref())
            .expect("builder enforced at least one tier")
    }

    fn secondary(&self) -> Option<&Arc<dyn StorageBackend>> {
        match (&self.local, &self.remote) {
            (Some(_), Some(remote)) => Some(remote),
            _ => None,
        }
    }

    fn tier_cancel(&self, cancel: &Cancellation) -> Cancellation {
        cancel.child(self.tier_timeout)
    }

    fn resolve_state_file(&self, options: &BackupOptions) -> TfSafeResult<PathBuf> {
        match &options.state_file_path {
            Some(path) => Ok(path.clone()),
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|e| TfSafeError::io("resolve working directory", e))?;
                self.detector.locate(&cwd)
            }
        }
    }

    /// Creates a backup per `options` and returns the durable record.
    pub fn create_backup(
        &self,
        cancel: &Cancellation,
        options: &BackupOptions,
    ) -> TfSafeResult<BackupRecord> {
        let state_path = match self.resolve_state_file(options) {
            Ok(path) => path,
            Err(err @ TfSafeError::ArtifactMissing { .. }) if !options.force => return Err(err),
            // The empty-backup warning below owns this path.
            Err(TfSafeError::ArtifactMissing { .. }) => {
                PathBuf::from(tfsafe_core::DEFAULT_STATE_FILE)
            }
            Err(err) => return Err(err),
        };

        let state_data = if file_exists(&state_path) {
            std::fs::read(&state_path)
                .map_err(|e| TfSafeError::io(format!("read {}", state_path.display()), e))?
        } else if options.force {
            warn!(path = %state_path.display(), "state file missing, creating empty backup");
            Vec::new()
        } else {
            return Err(TfSafeError::ArtifactMissing {
                path: state_path.display().to_string(),
            });
        };

        let wrapped = self.encryption.encrypt(&state_data)?;

        // One identifier per second by contract; truncate before formatting.
        let now = Utc
            .timestamp_opt(Utc::now().timestamp(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        let id = backup_id_at(now);

        let primary = self.primary();
        if primary.exists(&self.tier_cancel(cancel), &id)? {
            return Err(TfSafeError::StorageIo {
                operation: "create backup".to_string(),
                reason: format!(
                    "backup {id} already exists; identifiers have one-second granularity, retry after the current second"
                ),
            });
        }

        let mut record = BackupRecord {
            id: id.clone(),
            timestamp: now,
            size: wrapped.len() as u64,
            checksum: sha256_hex(&wrapped),
            storage_type: primary.kind().to_string(),
            encrypted: self.encryption.encrypts(),
            file_path: state_path.display().to_string(),
            description: options.description.clone(),
        };

        primary.store(&self.tier_cancel(cancel), &id, &wrapped, &mut record)?;

        if let Some(secondary) = self.secondary() {
            let mut remote_record = record.clone();
            match secondary.store(&self.tier_cancel(cancel), &id, &wrapped, &mut remote_record) {
                Ok(()) => info!(%id, tier = secondary.kind(), "backup mirrored"),
                Err(err) => {
                    // The local copy is the durable unit; a remote failure
                    // degrades the operation instead of failing it.
                    warn!(%id, tier = secondary.kind(), error = %err, "remote store failed");
                }
            }
        }

        info!(%id, path = %state_path.display(), "backup created");
        Ok(record)
    }

    /// Union of the enabled tiers' records, newest first.
    ///
    /// When both tiers hold an identifier the returned record is the local
    /// one with the remote location appended to its `file_path`.
    pub fn list_backups(&self, cancel: &Cancellation) -> TfSafeResult<Vec<BackupRecord>> {
        let mut merged: std::collections::HashMap<String, BackupRecord> =
            std::collections::HashMap::new();

        if let Some(local) = &self.local {
            for record in local.list(&self.tier_cancel(cancel))? {
                merged.insert(record.id.clone(), record);
            }
        }

        if let Some(remote) = &self.remote {
            match remote.list(&self.tier_cancel(cancel)) {
                Ok(records) => {
                    for record in records {
                        match merged.get_mut(&record.id) {
                            Some(existing) => {
                                existing.file_path =
                                    format!("{}, {}", existing.file_path, record.file_path);
                            }
                            None => {
                                merged.insert(record.id.clone(), record);
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, "failed to list remote backups"),
            }
        }

        let mut records: Vec<BackupRecord> = merged.into_values().collect();
        tfsafe_core::record::sort_newest_first(&mut records);
        debug!(count = records.len(), "listed backups");
        Ok(records)
    }

    /// Record for `id`, trying local first, then remote.
    pub fn get_backup(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<BackupRecord> {
        self.retrieve_backup(cancel, id).map(|(_, record)| record)
    }

    /// Payload and record for `id`, trying local first, then remote.
    ///
    /// The returned payload is still wrapped; callers unwrap through the
    /// encryption provider when `record.encrypted` is set.
    pub fn retrieve_backup(
        &self,
        cancel: &Cancellation,
        id: &str,
    ) -> TfSafeResult<(Vec<u8>, BackupRecord)> {
        let mut first_error = None;

        for tier in [self.local.as_ref(), self.remote.as_ref()].into_iter().flatten() {
            match tier.retrieve(&self.tier_cancel(cancel), id) {
                Ok(found) => return Ok(found),
                Err(err) => {
                    debug!(id, tier = tier.kind(), error = %err, "tier retrieval failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| TfSafeError::NotFound { id: id.to_string() }))
    }

    /// Unwraps a retrieved payload according to its record.
    pub fn unwrap_payload(&self, data: &[u8], record: &BackupRecord) -> TfSafeResult<Vec<u8>> {
        if !record.encrypted {
            return Ok(data.to_vec());
        }
        if !self.encryption.encrypts() {
            return Err(TfSafeError::EncryptionFailed {
                reason: format!(
                    "backup {} is encrypted but no encryption provider is configured",
                    record.id
                ),
            });
        }
        self.encryption.decrypt(data)
    }

    /// Verifies `id` against its recorded fingerprint and length.
    ///
    /// Tries local first; if local fails and remote is enabled, remote is
    /// tried before giving up. A mismatch surfaces as corruption.
    pub fn validate_backup(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<()> {
        let mut first_error = None;

        for tier in [self.local.as_ref(), self.remote.as_ref()].into_iter().flatten() {
            match self.validate_in_tier(cancel, id, tier.as_ref()) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(id, tier = tier.kind(), error = %err, "tier validation failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| TfSafeError::NotFound { id: id.to_string() }))
    }

    fn validate_in_tier(
        &self,
        cancel: &Cancellation,
        id: &str,
        tier: &dyn StorageBackend,
    ) -> TfSafeResult<()> {
        let (data, record) = tier.retrieve(&self.tier_cancel(cancel), id)?;
        crate::restore::validate_integrity(&data, &record)?;
        debug!(id, tier = tier.kind(), "backup validated");
        Ok(())
    }

    /// Runs retention per enabled tier.
    ///
    /// Local failures are fatal; remote failures are logged and the pass
    /// still succeeds.
    pub fn apply_retention(&self, cancel: &Cancellation) -> TfSafeResult<RetentionOutcome> {
        let now = Utc::now();
        let mut outcome = RetentionOutcome::default();

        if let Some(local) = &self.local {
            let records = local.list(&self.tier_cancel(cancel))?;
            for record in self.planner.plan_local(&records, now) {
                local.delete(&self.tier_cancel(cancel), &record.id)?;
                info!(id = %record.id, tier = "local", "pruned backup");
                outcome.local_deleted += 1;
            }
        }

        if let Some(remote) = &self.remote {
            match self.apply_remote_retention(cancel, remote.as_ref(), now) {
                Ok(deleted) => outcome.remote_deleted = deleted,
                Err(err) => warn!(error = %err, "remote retention pass failed"),
            }
        }

        if outcome.local_deleted + outcome.remote_deleted > 0 {
            info!(
                local = outcome.local_deleted,
                remote = outcome.remote_deleted,
                "retention pass complete"
            );
        }
        Ok(outcome)
    }

    fn apply_remote_retention(
        &self,
        cancel: &Cancellation,
        remote: &dyn StorageBackend,
        now: chrono::DateTime<Utc>,
    ) -> TfSafeResult<usize> {
        let records = remote.list(&self.tier_cancel(cancel))?;
        let mut deleted = 0;
        for record in self.planner.plan_remote(&records, now) {
            match remote.delete(&self.tier_cancel(cancel), &record.id) {
                Ok(()) => {
                    info!(id = %record.id, tier = remote.kind(), "pruned backup");
                    deleted += 1;
                }
                Err(err) => warn!(id = %record.id, error = %err, "failed to prune remote backup"),
            }
        }
        Ok(deleted)
    }
}
