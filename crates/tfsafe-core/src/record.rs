//! Backup records, catalogs, and the identifier format.
//!
//! Identifiers are a contract: the literal prefix `terraform.tfstate.`
//! followed by the creation instant in RFC3339 (UTC, second resolution,
//! `Z` suffix). They sort lexicographically in creation order, which the
//! retention and listing code relies on for deterministic tie-breaking.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Literal prefix of every backup identifier.
pub const BACKUP_ID_PREFIX: &str = "terraform.tfstate.";

/// Default name of the protected state file.
pub const DEFAULT_STATE_FILE: &str = "terraform.tfstate";

/// Catalog schema version written into `index.json`.
pub const CATALOG_VERSION: &str = "1.0";

/// Timestamp layout inside backup identifiers (RFC3339, UTC, seconds).
const BACKUP_ID_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Builds the backup identifier for a creation instant.
///
/// The instant is truncated to whole seconds; sub-second precision never
/// reaches the identifier.
pub fn backup_id_at(at: DateTime<Utc>) -> String {
    format!("{}{}", BACKUP_ID_PREFIX, at.format(BACKUP_ID_TIME_FORMAT))
}

/// Parses the creation instant out of a backup identifier.
///
/// Returns `None` when the prefix or the RFC3339 suffix does not match the
/// contract.
pub fn parse_backup_id(id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.strip_prefix(BACKUP_ID_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_ID_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Immutable record describing one stored backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Identifier, `terraform.tfstate.<RFC3339>`.
    pub id: String,
    /// Creation instant (UTC).
    pub timestamp: DateTime<Utc>,
    /// Payload length in bytes, as stored at rest.
    pub size: u64,
    /// SHA-256 over the bytes as stored at rest, lowercase hex.
    pub checksum: String,
    /// Tier that stored this record (`local` or the remote provider name).
    pub storage_type: String,
    /// Whether the stored payload is an encryption envelope.
    pub encrypted: bool,
    /// Where the payload lives: a filesystem path or an object URL.
    pub file_path: String,
    /// Free-text description supplied at snapshot time.
    #[serde(default)]
    pub description: String,
}

impl BackupRecord {
    /// Age of this backup relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

/// Options for creating a backup.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Explicit state file path; the detector resolves one when absent.
    pub state_file_path: Option<std::path::PathBuf>,
    /// Free-text description recorded on the backup.
    pub description: String,
    /// Proceed with an empty payload when the state file is absent.
    pub force: bool,
}

/// Options for restoring a backup.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Identifier of the backup to restore.
    pub backup_id: String,
    /// Target path; defaults to `terraform.tfstate`.
    pub target_path: std::path::PathBuf,
    /// Snapshot the current state file before overwriting it.
    pub create_checkpoint: bool,
    /// Skip interactive confirmation.
    pub force: bool,
}

impl RestoreOptions {
    /// Options restoring `backup_id` to the default state file path, with a
    /// pre-restore checkpoint.
    pub fn new(backup_id: impl Into<String>) -> Self {
        Self {
            backup_id: backup_id.into(),
            target_path: std::path::PathBuf::from(DEFAULT_STATE_FILE),
            create_checkpoint: true,
            force: false,
        }
    }
}

/// Per-tier catalog, persisted as `index.json` on the local tier and
/// reconstructed from listings on remote tiers.
///
/// The catalog is authoritative for listings but not for existence; the
/// storage tier is. Reconciliation drops entries whose backing object is
/// gone and reconstructs entries from orphan objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCatalog {
    /// Catalog schema version.
    pub version: String,
    /// Records keyed by identifier. Identifiers sort chronologically, so the
    /// map iterates oldest-first.
    pub backups: BTreeMap<String, BackupRecord>,
    /// When the catalog was last rewritten.
    pub last_sync: DateTime<Utc>,
}

impl BackupCatalog {
    /// An empty catalog stamped now.
    pub fn empty() -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            backups: BTreeMap::new(),
            last_sync: Utc::now(),
        }
    }

    /// Inserts or replaces a record and refreshes `last_sync`.
    pub fn upsert(&mut self, record: BackupRecord) {
        self.backups.insert(record.id.clone(), record);
        self.last_sync = Utc::now();
    }

    /// Removes a record and refreshes `last_sync`.
    pub fn remove(&mut self, id: &str) {
        self.backups.remove(id);
        self.last_sync = Utc::now();
    }
}

/// Sorts records newest-first, breaking instant ties by identifier.
pub fn sort_newest_first(records: &mut [BackupRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(ts: DateTime<Utc>) -> BackupRecord {
        BackupRecord {
            id: backup_id_at(ts),
            timestamp: ts,
            size: 49,
            checksum: "ab".repeat(32),
            storage_type: "local".to_string(),
            encrypted: false,
            file_path: "terraform.tfstate".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_backup_id_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 16, 20, 5).unwrap();
        assert_eq!(backup_id_at(ts), "terraform.tfstate.2024-03-07T16:20:05Z");
    }

    #[test]
    fn test_backup_id_round_trip() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let id = backup_id_at(ts);
        assert_eq!(parse_backup_id(&id), Some(ts));
    }

    #[test]
    fn test_parse_rejects_foreign_ids() {
        assert!(parse_backup_id("terraform.tfstate.backup").is_none());
        assert!(parse_backup_id("2024-03-07T16:20:05Z").is_none());
        assert!(parse_backup_id("terraform.tfstate.2024-03-07 16:20:05").is_none());
    }

    #[test]
    fn test_ids_sort_with_time() {
        let a = backup_id_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let b = backup_id_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap());
        assert!(a < b);
    }

    #[test]
    fn test_sort_newest_first() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let mut records = vec![record_at(t0), record_at(t1)];
        sort_newest_first(&mut records);
        assert_eq!(records[0].timestamp, t1);
        assert_eq!(records[1].timestamp, t0);
    }

    #[test]
    fn test_catalog_serialization_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 16, 20, 5).unwrap();
        let mut catalog = BackupCatalog::empty();
        catalog.upsert(record_at(ts));

        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["version"], "1.0");
        assert!(json["backups"]["terraform.tfstate.2024-03-07T16:20:05Z"].is_object());
        assert!(json["last_sync"].is_string());
    }
}
