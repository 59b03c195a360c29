//! Local directory tier.
//!
//! Layout under the configured directory (owner-only mode): per backup a
//! sidecar pair `<id>.bak` (payload as stored) and `<id>.meta` (the record as
//! JSON), plus a single `index.json` catalog. The catalog is an optimization;
//! the directory scan in `list()` is ground truth, and `rebuild_index()`
//! reconciles the two.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use tfsafe_core::{
    atomic_write, ensure_dir, file_exists, parse_backup_id, sha256_hex, BackupCatalog,
    BackupRecord, Cancellation, LocalConfig, TfSafeError, TfSafeResult,
};

use crate::backend::{StorageBackend, BACKUP_FILE_EXTENSION, METADATA_FILE_EXTENSION};

/// Name of the catalog file inside the backup directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Filesystem-backed storage tier.
pub struct LocalStorage {
    config: LocalConfig,
}

impl LocalStorage {
    /// Builds the tier over `config`; call `initialize` before use.
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    /// The backup directory.
    pub fn path(&self) -> &Path {
        Path::new(&self.config.path)
    }

    fn backup_path(&self, id: &str) -> PathBuf {
        self.path().join(format!("{id}{BACKUP_FILE_EXTENSION}"))
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.path().join(format!("{id}{METADATA_FILE_EXTENSION}"))
    }

    fn index_path(&self) -> PathBuf {
        self.path().join(INDEX_FILE_NAME)
    }

    fn read_record(&self, path: &Path) -> TfSafeResult<BackupRecord> {
        let data =
            fs::read(path).map_err(|e| TfSafeError::io(format!("read {}", path.display()), e))?;
        serde_json::from_slice(&data).map_err(|e| TfSafeError::StorageIo {
            operation: format!("parse {}", path.display()),
            reason: e.to_string(),
        })
    }

    /// Loads the catalog, or an empty one when the file is absent.
    pub fn catalog(&self) -> TfSafeResult<BackupCatalog> {
        let path = self.index_path();
        if !file_exists(&path) {
            return Ok(BackupCatalog::empty());
        }
        let data =
            fs::read(&path).map_err(|e| TfSafeError::io(format!("read {}", path.display()), e))?;
        serde_json::from_slice(&data).map_err(|e| TfSafeError::StorageIo {
            operation: format!("parse {}", path.display()),
            reason: e.to_string(),
        })
    }

    fn write_catalog(&self, catalog: &BackupCatalog) -> TfSafeResult<()> {
        let data = serde_json::to_vec_pretty(catalog).map_err(|e| TfSafeError::StorageIo {
            operation: "serialize catalog".to_string(),
            reason: e.to_string(),
        })?;
        atomic_write(&self.index_path(), &data, 0o600)
    }

    fn update_index(&self, record: &BackupRecord) -> TfSafeResult<()> {
        let mut catalog = self.catalog()?;
        catalog.upsert(record.clone());
        self.write_catalog(&catalog)
    }

    fn remove_from_index(&self, id: &str) -> TfSafeResult<()> {
        if !file_exists(&self.index_path()) {
            return Ok(());
        }
        let mut catalog = self.catalog()?;
        catalog.remove(id);
        self.write_catalog(&catalog)
    }

    /// Rescans the directory and rewrites the catalog from storage truth.
    ///
    /// Entries whose payload file is gone are dropped. Orphan payloads whose
    /// sidecar metadata is missing or unreadable get a record reconstructed
    /// from the stored bytes: fingerprint recomputed, size from the file,
    /// instant parsed from the identifier (file mtime as a fallback).
    pub fn rebuild_index(&self, cancel: &Cancellation) -> TfSafeResult<BackupCatalog> {
        cancel.check("rebuild index")?;

        let mut catalog = BackupCatalog::empty();
        let entries = match fs::read_dir(self.path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.write_catalog(&catalog)?;
                return Ok(catalog);
            }
            Err(e) => return Err(TfSafeError::io(format!("read {}", self.config.path), e)),
        };

        for entry in entries.filter_map(|e| e.ok()) {
            cancel.check("rebuild index")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_suffix(BACKUP_FILE_EXTENSION) else {
                continue;
            };
            let payload_path = entry.path();

            let record = match self.read_record(&self.metadata_path(id)) {
                Ok(mut record) => {
                    if record.checksum.is_empty() {
                        record.checksum = tfsafe_core::sha256_file(&payload_path)?;
                    }
                    record
                }
                Err(_) => {
                    warn!(id, "metadata missing or unreadable, reconstructing from payload");
                    self.reconstruct_record(id, &payload_path)?
                }
            };
            catalog.upsert(record);
        }

        self.write_catalog(&catalog)?;
        info!(entries = catalog.backups.len(), "local catalog rebuilt");
        Ok(catalog)
    }

    fn reconstruct_record(&self, id: &str, payload_path: &Path) -> TfSafeResult<BackupRecord> {
        let meta = fs::metadata(payload_path)
            .map_err(|e| TfSafeError::io(format!("stat {}", payload_path.display()), e))?;
        let timestamp = parse_backup_id(id)
            .or_else(|| meta.modified().ok().map(chrono::DateTime::from))
            .unwrap_or_else(Utc::now);
        Ok(BackupRecord {
            id: id.to_string(),
            timestamp,
            size: meta.len(),
            checksum: tfsafe_core::sha256_file(payload_path)?,
            storage_type: self.kind().to_string(),
            encrypted: false,
            file_path: payload_path.display().to_string(),
            description: String::new(),
        })
    }
}

impl StorageBackend for LocalStorage {
    fn initialize(&self, cancel: &Cancellation) -> TfSafeResult<()> {
        cancel.check("initialize local storage")?;
        ensure_dir(self.path())?;

        // Backups are secrets; the directory is owner-only.
        fs::set_permissions(self.path(), fs::Permissions::from_mode(0o700))
            .map_err(|e| TfSafeError::io(format!("set mode on {}", self.config.path), e))?;

        info!(path = %self.config.path, "local storage initialized");
        Ok(())
    }

    fn store(
        &self,
        cancel: &Cancellation,
        id: &str,
        data: &[u8],
        record: &mut BackupRecord,
    ) -> TfSafeResult<()> {
        cancel.check("store")?;

        let backup_path = self.backup_path(id);
        let metadata_path = self.metadata_path(id);

        if record.checksum.is_empty() {
            record.checksum = sha256_hex(data);
        }
        record.size = data.len() as u64;
        record.storage_type = self.kind().to_string();
        record.file_path = backup_path.display().to_string();

        atomic_write(&backup_path, data, 0o600)?;

        let metadata_bytes = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&backup_path);
                return Err(TfSafeError::StorageIo {
                    operation: format!("serialize metadata for {id}"),
                    reason: e.to_string(),
                });
            }
        };
        if let Err(e) = atomic_write(&metadata_path, &metadata_bytes, 0o600) {
            // Without its sidecar the payload would list as an orphan; drop it.
            let _ = fs::remove_file(&backup_path);
            return Err(e);
        }

        if let Err(e) = self.update_index(record) {
            warn!(id, error = %e, "failed to update backup index");
        }

        info!(
            id,
            size = record.size,
            checksum = &record.checksum[..8.min(record.checksum.len())],
            "backup stored"
        );
        Ok(())
    }

    fn retrieve(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<(Vec<u8>, BackupRecord)> {
        cancel.check("retrieve")?;

        let backup_path = self.backup_path(id);
        if !file_exists(&backup_path) {
            return Err(TfSafeError::NotFound { id: id.to_string() });
        }

        let record = self.read_record(&self.metadata_path(id))?;
        let data = fs::read(&backup_path)
            .map_err(|e| TfSafeError::io(format!("read {}", backup_path.display()), e))?;

        let actual = sha256_hex(&data);
        if actual != record.checksum {
            return Err(TfSafeError::StorageCorrupted {
                id: id.to_string(),
                reason: format!(
                    "checksum mismatch (expected {}, got {})",
                    record.checksum, actual
                ),
            });
        }

        debug!(id, "backup retrieved");
        Ok((data, record))
    }

    fn list(&self, cancel: &Cancellation) -> TfSafeResult<Vec<BackupRecord>> {
        cancel.check("list")?;

        let entries = match fs::read_dir(self.path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TfSafeError::io(format!("read {}", self.config.path), e)),
        };

        let mut records = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(METADATA_FILE_EXTENSION) {
                continue;
            }
            match self.read_record(&entry.path()) {
                Ok(record) => records.push(record),
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable metadata file"),
            }
        }

        tfsafe_core::record::sort_newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<()> {
        cancel.check("delete")?;

        for path in [self.backup_path(id), self.metadata_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(TfSafeError::io(format!("remove {}", path.display()), e)),
            }
        }

        if let Err(e) = self.remove_from_index(id) {
            warn!(id, error = %e, "failed to update backup index after deletion");
        }

        info!(id, "backup deleted");
        Ok(())
    }

    fn exists(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<bool> {
        cancel.check("exists")?;
        Ok(file_exists(&self.backup_path(id)))
    }

    fn kind(&self) -> &str {
        "local"
    }
}
