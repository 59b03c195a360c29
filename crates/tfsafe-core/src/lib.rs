#![warn(missing_docs)]

//! tf-safe core: shared entities, error taxonomy, and filesystem primitives.
//!
//! This crate holds everything the other tf-safe crates agree on: the backup
//! record and catalog types, the structured error taxonomy, the configuration
//! schema, atomic filesystem helpers, and the cancellation token threaded
//! through storage operations.

pub mod cancel;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod record;

pub use cancel::Cancellation;
pub use config::{
    CommandConfig, CommandsConfig, Config, EncryptionConfig, LocalConfig, LoggingConfig,
    RemoteConfig, RetentionConfig, DEFAULT_CONFIG_FILE, DEFAULT_GLOBAL_CONFIG, DEFAULT_LOCAL_PATH,
    MIN_RETENTION_COUNT,
};
pub use error::{ErrorReport, TfSafeError, TfSafeResult};
pub use fsutil::{atomic_write, ensure_dir, file_exists, sha256_file, sha256_hex};
pub use record::{
    backup_id_at, parse_backup_id, BackupCatalog, BackupOptions, BackupRecord, RestoreOptions,
    BACKUP_ID_PREFIX, CATALOG_VERSION, DEFAULT_STATE_FILE,
};
