//! Restore with pre-restore checkpointing and rollback.
//!
//! The sequence is fixed: validate the backup everywhere it lives, snapshot
//! the current state file if asked, retrieve, unwrap, and replace the target
//! atomically. A failed replacement rolls back from the checkpoint; when the
//! rollback itself fails the surfaced error names both causes.

use std::path::Path;

use tracing::{debug, error, info};

use tfsafe_core::{
    atomic_write, ensure_dir, file_exists, sha256_hex, BackupOptions, BackupRecord, Cancellation,
    RestoreOptions, TfSafeError, TfSafeResult,
};

use crate::engine::BackupEngine;

/// Mode of restored state files.
const RESTORED_FILE_MODE: u32 = 0o644;

/// Seam over the final replacement write, so failure paths are testable.
pub trait ArtifactWriter: Send + Sync {
    /// Atomically replaces `path` with `data`.
    fn write(&self, path: &Path, data: &[u8], mode: u32) -> TfSafeResult<()>;
}

/// Production writer over [`atomic_write`].
#[derive(Debug, Default)]
pub struct AtomicArtifactWriter;

impl ArtifactWriter for AtomicArtifactWriter {
    fn write(&self, path: &Path, data: &[u8], mode: u32) -> TfSafeResult<()> {
        atomic_write(path, data, mode)
    }
}

/// Restore engine over a [`BackupEngine`].
pub struct RestoreEngine<'a> {
    engine: &'a BackupEngine,
    writer: Box<dyn ArtifactWriter>,
}

impl<'a> RestoreEngine<'a> {
    /// Restore engine with the production atomic writer.
    pub fn new(engine: &'a BackupEngine) -> Self {
        Self {
            engine,
            writer: Box::new(AtomicArtifactWriter),
        }
    }

    /// Restore engine with an injected writer. Used by tests to exercise the
    /// rollback paths.
    pub fn with_writer(engine: &'a BackupEngine, writer: Box<dyn ArtifactWriter>) -> Self {
        Self { engine, writer }
    }

    /// Restores a backup per `options`.
    pub fn restore(&self, cancel: &Cancellation, options: &RestoreOptions) -> TfSafeResult<()> {
        let id = &options.backup_id;
        info!(%id, target = %options.target_path.display(), "starting restore");

        // Fail fast if the backup is absent or corrupted in every tier.
        self.engine.validate_backup(cancel, id)?;

        let checkpoint = if options.create_checkpoint && file_exists(&options.target_path) {
            let record = self.create_checkpoint(cancel, &options.target_path)?;
            info!(checkpoint = %record.id, "created pre-restore backup");
            Some(record)
        } else {
            None
        };

        let (wrapped, record) = self.engine.retrieve_backup(cancel, id)?;
        let payload = self.engine.unwrap_payload(&wrapped, &record)?;

        if let Some(parent) = options.target_path.parent() {
            ensure_dir(parent)?;
        }

        if let Err(restore_err) = self
            .writer
            .write(&options.target_path, &payload, RESTORED_FILE_MODE)
        {
            return match &checkpoint {
                Some(checkpoint) => {
                    error!(%id, error = %restore_err, "restore failed, rolling back");
                    match self.rollback(cancel, checkpoint, &options.target_path) {
                        Ok(()) => {
                            info!(checkpoint = %checkpoint.id, "rolled back to pre-restore state");
                            Err(restore_err)
                        }
                        Err(rollback_err) => Err(TfSafeError::StorageIo {
                            operation: "restore".to_string(),
                            reason: format!(
                                "restore failed: {restore_err}; rollback from {} also failed: {rollback_err}",
                                checkpoint.id
                            ),
                        }),
                    }
                }
                None => Err(restore_err),
            };
        }

        info!(%id, target = %options.target_path.display(), size = payload.len(), "restore complete");
        Ok(())
    }

    fn create_checkpoint(
        &self,
        cancel: &Cancellation,
        target: &Path,
    ) -> TfSafeResult<BackupRecord> {
        let options = BackupOptions {
            state_file_path: Some(target.to_path_buf()),
            description: format!(
                "Pre-restore backup created at {}",
                chrono::Utc::now().to_rfc3339()
            ),
            force: false,
        };
        self.engine.create_backup(cancel, &options)
    }

    fn rollback(
        &self,
        cancel: &Cancellation,
        checkpoint: &BackupRecord,
        target: &Path,
    ) -> TfSafeResult<()> {
        let (wrapped, record) = self.engine.retrieve_backup(cancel, &checkpoint.id)?;
        let payload = self.engine.unwrap_payload(&wrapped, &record)?;
        self.writer.write(target, &payload, RESTORED_FILE_MODE)
    }
}

/// Re-checks retrieved bytes against their record.
///
/// Length and fingerprint must match, the identifier and fingerprint must be
/// non-empty, and the timestamp must be a real instant.
pub fn validate_integrity(data: &[u8], record: &BackupRecord) -> TfSafeResult<()> {
    if record.id.is_empty() {
        return Err(TfSafeError::StorageCorrupted {
            id: "<unknown>".to_string(),
            reason: "record has an empty identifier".to_string(),
        });
    }
    if record.checksum.is_empty() {
        return Err(TfSafeError::StorageCorrupted {
            id: record.id.clone(),
            reason: "record has an empty fingerprint".to_string(),
        });
    }
    if record.timestamp.timestamp() == 0 {
        return Err(TfSafeError::StorageCorrupted {
            id: record.id.clone(),
            reason: "record has a zero timestamp".to_string(),
        });
    }
    if data.len() as u64 != record.size {
        return Err(TfSafeError::StorageCorrupted {
            id: record.id.clone(),
            reason: format!(
                "size mismatch (expected {} bytes, got {})",
                record.size,
                data.len()
            ),
        });
    }
    let actual = sha256_hex(data);
    if actual != record.checksum {
        return Err(TfSafeError::StorageCorrupted {
            id: record.id.clone(),
            reason: format!(
                "checksum mismatch (expected {}, got {})",
                record.checksum, actual
            ),
        });
    }
    debug!(id = %record.id, "integrity validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BackupEngineBuilder;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tfsafe_core::LocalConfig;
    use tfsafe_crypto::NoopProvider;
    use tfsafe_storage::{LocalStorage, StorageBackend};

    const P1: &[u8] = br#"{"version":4,"terraform_version":"1.0.0","serial":1}"#;
    const P2: &[u8] = br#"{"version":4,"terraform_version":"1.0.0","serial":2}"#;

    struct Env {
        _dir: TempDir,
        state_path: PathBuf,
        engine: BackupEngine,
    }

    fn env() -> Env {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("terraform.tfstate");
        fs::write(&state_path, P1).unwrap();

        let storage = LocalStorage::new(LocalConfig {
            enabled: true,
            path: dir.path().join("backups").display().to_string(),
            retention_count: 10,
        });
        storage.initialize(&Cancellation::none()).unwrap();

        let engine = BackupEngineBuilder::new(Arc::new(NoopProvider::new()))
            .local(Arc::new(storage) as Arc<dyn StorageBackend>)
            .build()
            .unwrap();

        Env {
            _dir: dir,
            state_path,
            engine,
        }
    }

    fn backup_of(env: &Env) -> BackupRecord {
        env.engine
            .create_backup(
                &Cancellation::none(),
                &BackupOptions {
                    state_file_path: Some(env.state_path.clone()),
                    description: String::new(),
                    force: false,
                },
            )
            .unwrap()
    }

    /// Writer failing the first `failures` calls, delegating afterwards.
    struct FlakyWriter {
        failures: AtomicUsize,
        inner: AtomicArtifactWriter,
    }

    impl FlakyWriter {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                inner: AtomicArtifactWriter,
            }
        }
    }

    impl ArtifactWriter for FlakyWriter {
        fn write(&self, path: &Path, data: &[u8], mode: u32) -> TfSafeResult<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TfSafeError::StorageIo {
                    operation: "write state file".to_string(),
                    reason: "injected write failure".to_string(),
                });
            }
            self.inner.write(path, data, mode)
        }
    }

    #[test]
    fn test_restore_replaces_target() {
        let env = env();
        let cancel = Cancellation::none();
        let backup = backup_of(&env);

        fs::write(&env.state_path, P2).unwrap();

        let restore = RestoreEngine::new(&env.engine);
        restore
            .restore(
                &cancel,
                &RestoreOptions {
                    backup_id: backup.id.clone(),
                    target_path: env.state_path.clone(),
                    create_checkpoint: false,
                    force: true,
                },
            )
            .unwrap();

        assert_eq!(fs::read(&env.state_path).unwrap(), P1);
    }

    #[test]
    fn test_restore_missing_backup_fails_fast() {
        let env = env();
        let restore = RestoreEngine::new(&env.engine);
        let err = restore
            .restore(
                &Cancellation::none(),
                &RestoreOptions::new("terraform.tfstate.2020-01-01T00:00:00Z"),
            )
            .unwrap_err();
        assert!(matches!(err, TfSafeError::NotFound { .. }));
    }

    #[test]
    fn test_checkpoint_created_before_overwrite() {
        let env = env();
        let cancel = Cancellation::none();
        let backup = backup_of(&env);

        // The engine serializes snapshot creation at one-second granularity.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(&env.state_path, P2).unwrap();

        let restore = RestoreEngine::new(&env.engine);
        restore
            .restore(
                &cancel,
                &RestoreOptions {
                    backup_id: backup.id.clone(),
                    target_path: env.state_path.clone(),
                    create_checkpoint: true,
                    force: true,
                },
            )
            .unwrap();

        assert_eq!(fs::read(&env.state_path).unwrap(), P1);

        let listed = env.engine.list_backups(&cancel).unwrap();
        assert_eq!(listed.len(), 2);
        let checkpoint = listed
            .iter()
            .find(|r| r.id != backup.id)
            .expect("checkpoint exists");
        assert!(checkpoint.description.starts_with("Pre-restore backup"));

        let (data, record) = env.engine.retrieve_backup(&cancel, &checkpoint.id).unwrap();
        assert_eq!(env.engine.unwrap_payload(&data, &record).unwrap(), P2);
    }

    #[test]
    fn test_failed_write_rolls_back_to_checkpoint() {
        let env = env();
        let cancel = Cancellation::none();
        let backup = backup_of(&env);

        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(&env.state_path, P2).unwrap();

        let restore = RestoreEngine::with_writer(&env.engine, Box::new(FlakyWriter::new(1)));
        let err = restore
            .restore(
                &cancel,
                &RestoreOptions {
                    backup_id: backup.id.clone(),
                    target_path: env.state_path.clone(),
                    create_checkpoint: true,
                    force: true,
                },
            )
            .unwrap_err();

        assert!(err.to_string().contains("injected write failure"));
        // Rollback restored the pre-restore bytes.
        assert_eq!(fs::read(&env.state_path).unwrap(), P2);
    }

    #[test]
    fn test_double_failure_surfaces_both_causes() {
        let env = env();
        let cancel = Cancellation::none();
        let backup = backup_of(&env);

        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(&env.state_path, P2).unwrap();

        let restore = RestoreEngine::with_writer(&env.engine, Box::new(FlakyWriter::new(2)));
        let err = restore
            .restore(
                &cancel,
                &RestoreOptions {
                    backup_id: backup.id.clone(),
                    target_path: env.state_path.clone(),
                    create_checkpoint: true,
                    force: true,
                },
            )
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("restore failed"));
        assert!(msg.contains("rollback"));
        assert!(msg.contains("injected write failure"));
    }

    #[test]
    fn test_no_checkpoint_failure_surfaces_write_error_only() {
        let env = env();
        let backup = backup_of(&env);
        fs::write(&env.state_path, P2).unwrap();

        let restore = RestoreEngine::with_writer(&env.engine, Box::new(FlakyWriter::new(1)));
        let err = restore
            .restore(
                &Cancellation::none(),
                &RestoreOptions {
                    backup_id: backup.id,
                    target_path: env.state_path.clone(),
                    create_checkpoint: false,
                    force: true,
                },
            )
            .unwrap_err();

        assert!(!err.to_string().contains("rollback"));
        assert_eq!(fs::read(&env.state_path).unwrap(), P2);
    }

    #[test]
    fn test_validate_integrity_contract() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let data = b"payload".to_vec();
        let good = BackupRecord {
            id: "terraform.tfstate.2024-06-01T00:00:00Z".to_string(),
            timestamp: ts,
            size: data.len() as u64,
            checksum: sha256_hex(&data),
            storage_type: "local".to_string(),
            encrypted: false,
            file_path: String::new(),
            description: String::new(),
        };
        validate_integrity(&data, &good).unwrap();

        let mut bad = good.clone();
        bad.size += 1;
        assert!(validate_integrity(&data, &bad).is_err());

        let mut bad = good.clone();
        bad.checksum = sha256_hex(b"other");
        assert!(validate_integrity(&data, &bad).is_err());

        let mut bad = good.clone();
        bad.checksum.clear();
        assert!(validate_integrity(&data, &bad).is_err());

        let mut bad = good.clone();
        bad.id.clear();
        assert!(validate_integrity(&data, &bad).is_err());

        let mut bad = good;
        bad.timestamp = Utc.timestamp_opt(0, 0).single().unwrap();
        assert!(validate_integrity(&data, &bad).is_err());
    }
}
