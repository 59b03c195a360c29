//! Remote object-store tier.
//!
//! Every remote call runs under a bounded retry loop (3 attempts, backoff of
//! `1s * (attempt_index + 1)`). Payloads strictly larger than 5 MiB go
//! through multipart upload; an in-progress upload is explicitly aborted on
//! any failure or cancellation. Each object carries the backup record in a
//! namespaced metadata side-channel so the catalog can always be
//! reconstructed from a listing.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tfsafe_core::{
    parse_backup_id, sha256_hex, BackupCatalog, BackupRecord, Cancellation, RemoteConfig,
    TfSafeError, TfSafeResult,
};

use crate::backend::{StorageBackend, BACKUP_FILE_EXTENSION};
use crate::object_store::{ObjectStore, UploadedPart};

/// Payloads strictly larger than this use multipart upload (5 MiB).
pub const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Hard cap on attempts per remote call.
pub const MAX_ATTEMPTS: usize = 3;

/// Namespace prefix of the metadata side-channel keys.
pub const METADATA_PREFIX: &str = "tf-safe-";

/// Base delay for exponential backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Key used by the initialization write/delete probe.
const PROBE_KEY: &str = "test-connectivity";

/// Backoff before retrying after a failure of attempt `attempt_index`
/// (0-based): `1s * (attempt_index + 1)`.
pub fn retry_delay(attempt_index: usize) -> Duration {
    RETRY_BASE_DELAY * (attempt_index as u32 + 1)
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Storage tier over an [`ObjectStore`] contract.
pub struct RemoteStorage {
    config: RemoteConfig,
    store: Box<dyn ObjectStore>,
    sleeper: Sleeper,
}

impl RemoteStorage {
    /// Builds the tier over `store`; call `initialize` before use.
    pub fn new(config: RemoteConfig, store: Box<dyn ObjectStore>) -> Self {
        Self::with_sleeper(config, store, Box::new(|d| std::thread::sleep(d)))
    }

    /// Like [`RemoteStorage::new`] with an injectable backoff sleeper.
    pub fn with_sleeper(config: RemoteConfig, store: Box<dyn ObjectStore>, sleeper: Sleeper) -> Self {
        Self {
            config,
            store,
            sleeper,
        }
    }

    fn object_key(&self, id: &str) -> String {
        format!("{}{}{}", self.config.prefix, id, BACKUP_FILE_EXTENSION)
    }

    fn id_from_key(&self, key: &str) -> Option<String> {
        key.strip_prefix(self.config.prefix.as_str())
            .and_then(|k| k.strip_suffix(BACKUP_FILE_EXTENSION))
            .map(str::to_string)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}://{}/{}", self.config.provider, self.config.bucket, key)
    }

    fn metadata_for(record: &BackupRecord) -> BTreeMap<String, String> {
        BTreeMap::from([
            (format!("{METADATA_PREFIX}id"), record.id.clone()),
            (
                format!("{METADATA_PREFIX}timestamp"),
                record.timestamp.to_rfc3339(),
            ),
            (format!("{METADATA_PREFIX}checksum"), record.checksum.clone()),
            (
                format!("{METADATA_PREFIX}encrypted"),
                record.encrypted.to_string(),
            ),
            (format!("{METADATA_PREFIX}size"), record.size.to_string()),
        ])
    }

    fn record_from_metadata(
        &self,
        id: &str,
        key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<BackupRecord> {
        let timestamp = match metadata.get(&format!("{METADATA_PREFIX}timestamp")) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| TfSafeError::StorageIo {
                    operation: format!("parse metadata for {id}"),
                    reason: format!("invalid timestamp '{raw}': {e}"),
                })?,
            // Metadata lost; the identifier still carries the instant.
            None => parse_backup_id(id).ok_or_else(|| TfSafeError::StorageIo {
                operation: format!("parse metadata for {id}"),
                reason: "timestamp metadata missing".to_string(),
            })?,
        };

        let size = metadata
            .get(&format!("{METADATA_PREFIX}size"))
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let encrypted = metadata
            .get(&format!("{METADATA_PREFIX}encrypted"))
            .map(|s| s == "true")
            .unwrap_or(false);
        let checksum = metadata
            .get(&format!("{METADATA_PREFIX}checksum"))
            .cloned()
            .unwrap_or_default();

        Ok(BackupRecord {
            id: id.to_string(),
            timestamp,
            size,
            checksum,
            storage_type: self.kind().to_string(),
            encrypted,
            file_path: self.object_url(key),
            description: String::new(),
        })
    }

    fn with_retry<T>(
        &self,
        cancel: &Cancellation,
        operation: &str,
        mut call: impl FnMut() -> TfSafeResult<T>,
    ) -> TfSafeResult<T> {
        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            cancel.check(operation)?;
            match call() {
                Ok(value) => return Ok(value),
                Err(err @ TfSafeError::Cancelled { .. }) => return Err(err),
                Err(err) => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        let delay = retry_delay(attempt);
                        warn!(
                            operation,
                            attempt = attempt + 1,
                            delay_secs = delay.as_secs(),
                            error = %err,
                            "remote call failed, retrying"
                        );
                        (self.sleeper)(delay);
                    }
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.expect("at least one attempt ran");
        Err(TfSafeError::StorageIo {
            operation: operation.to_string(),
            reason: format!("failed after {MAX_ATTEMPTS} attempts: {last}"),
        })
    }

    fn multipart_upload(
        &self,
        cancel: &Cancellation,
        key: &str,
        data: &[u8],
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<()> {
        let upload_id =
            self.with_retry(cancel, "create multipart upload", || {
                self.store.create_multipart(key, metadata)
            })?;

        let mut parts: Vec<UploadedPart> = Vec::new();
        let mut part_number: u32 = 1;
        for chunk in data.chunks(MULTIPART_THRESHOLD) {
            if let Err(err) = cancel.check("upload part") {
                self.abort_upload(key, &upload_id);
                return Err(err);
            }
            match self.with_retry(cancel, "upload part", || {
                self.store.upload_part(key, &upload_id, part_number, chunk)
            }) {
                Ok(part) => parts.push(part),
                Err(err) => {
                    self.abort_upload(key, &upload_id);
                    return Err(err);
                }
            }
            part_number += 1;
        }

        if let Err(err) = self.with_retry(cancel, "complete multipart upload", || {
            self.store.complete_multipart(key, &upload_id, &parts)
        }) {
            self.abort_upload(key, &upload_id);
            return Err(err);
        }

        info!(key, size = data.len(), parts = parts.len(), "multipart upload complete");
        Ok(())
    }

    fn abort_upload(&self, key: &str, upload_id: &str) {
        if let Err(err) = self.store.abort_multipart(key, upload_id) {
            warn!(key, upload_id, error = %err, "failed to abort multipart upload");
        }
    }

    /// Reconstructs this tier's catalog from a listing.
    pub fn catalog(&self, cancel: &Cancellation) -> TfSafeResult<BackupCatalog> {
        let mut catalog = BackupCatalog::empty();
        for record in self.list(cancel)? {
            catalog.upsert(record);
        }
        Ok(catalog)
    }
}

impl StorageBackend for RemoteStorage {
    fn initialize(&self, cancel: &Cancellation) -> TfSafeResult<()> {
        let probe_key = self.object_key(PROBE_KEY);
        let probe_meta = BTreeMap::from([(
            format!("{METADATA_PREFIX}probe"),
            "connectivity".to_string(),
        )]);

        self.with_retry(cancel, "write connectivity probe", || {
            self.store.put(&probe_key, b"tf-safe connectivity test", &probe_meta)
        })?;
        self.with_retry(cancel, "delete connectivity probe", || {
            self.store.delete(&probe_key)
        })?;

        info!(
            provider = %self.config.provider,
            bucket = %self.config.bucket,
            "remote storage initialized"
        );
        Ok(())
    }

    fn store(
        &self,
        cancel: &Cancellation,
        id: &str,
        data: &[u8],
        record: &mut BackupRecord,
    ) -> TfSafeResult<()> {
        let key = self.object_key(id);

        if record.checksum.is_empty() {
            record.checksum = sha256_hex(data);
        }
        record.size = data.len() as u64;
        record.storage_type = self.kind().to_string();
        record.file_path = self.object_url(&key);

        let metadata = Self::metadata_for(record);

        if data.len() > MULTIPART_THRESHOLD {
            self.multipart_upload(cancel, &key, data, &metadata)?;
        } else {
            self.with_retry(cancel, "store", || self.store.put(&key, data, &metadata))?;
        }

        info!(id, %key, size = record.size, "backup stored remotely");
        Ok(())
    }

    fn retrieve(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<(Vec<u8>, BackupRecord)> {
        let key = self.object_key(id);
        let (data, metadata) =
            self.with_retry(cancel, "retrieve", || self.store.get(&key))?;

        let mut record = self.record_from_metadata(id, &key, &metadata)?;

        let actual = sha256_hex(&data);
        if record.checksum.is_empty() {
            // Side-channel lost its fingerprint; the stored bytes are all we
            // have to go on.
            record.checksum = actual;
        } else if actual != record.checksum {
            return Err(TfSafeError::StorageCorrupted {
                id: id.to_string(),
                reason: format!(
                    "checksum mismatch (expected {}, got {})",
                    record.checksum, actual
                ),
            });
        }
        record.size = data.len() as u64;

        debug!(id, "backup retrieved from remote");
        Ok((data, record))
    }

    fn list(&self, cancel: &Cancellation) -> TfSafeResult<Vec<BackupRecord>> {
        let summaries = self.with_retry(cancel, "list", || {
            self.store.list(&self.config.prefix)
        })?;

        let mut records = Vec::new();
        for summary in summaries {
            if !summary.key.ends_with(BACKUP_FILE_EXTENSION) {
                continue;
            }
            let Some(id) = self.id_from_key(&summary.key) else {
                continue;
            };
            let attrs = match self.with_retry(cancel, "head", || self.store.head(&summary.key)) {
                Ok(Some(attrs)) => attrs,
                Ok(None) => continue,
                Err(err) => {
                    warn!(key = %summary.key, error = %err, "skipping object without readable metadata");
                    continue;
                }
            };
            match self.record_from_metadata(&id, &summary.key, &attrs.metadata) {
                Ok(mut record) => {
                    record.size = summary.size;
                    records.push(record);
                }
                Err(err) => {
                    warn!(key = %summary.key, error = %err, "skipping object with unparseable metadata");
                }
            }
        }

        tfsafe_core::record::sort_newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<()> {
        let key = self.object_key(id);
        self.with_retry(cancel, "delete", || self.store.delete(&key))?;
        info!(id, "backup deleted from remote");
        Ok(())
    }

    fn exists(&self, cancel: &Cancellation, id: &str) -> TfSafeResult<bool> {
        let key = self.object_key(id);
        let attrs = self.with_retry(cancel, "exists", || self.store.head(&key))?;
        Ok(attrs.is_some())
    }

    fn kind(&self) -> &str {
        &self.config.provider
    }
}
