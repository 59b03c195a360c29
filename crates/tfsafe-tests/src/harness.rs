//! Shared fixtures for the integration scenarios.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use tfsafe_core::{BackupOptions, BackupRecord, Cancellation, LocalConfig, RemoteConfig};
use tfsafe_crypto::{EncryptionProvider, NoopProvider};
use tfsafe_engine::{BackupEngine, BackupEngineBuilder};
use tfsafe_storage::{LocalStorage, MemoryObjectStore, RemoteStorage, StorageBackend};

/// The state payload from the create-and-validate scenario.
pub const SCENARIO_STATE: &[u8] = br#"{"version":4,"terraform_version":"1.0.0","serial":1}"#;

/// A scratch project directory with a state file and a backup directory.
pub struct TestEnv {
    /// Owns the scratch directory for the test's lifetime.
    pub dir: TempDir,
    /// Path of the state file inside the scratch directory.
    pub state_path: PathBuf,
}

impl TestEnv {
    /// Scratch environment holding the scenario state payload.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create scratch directory");
        let state_path = dir.path().join("terraform.tfstate");
        std::fs::write(&state_path, SCENARIO_STATE).expect("seed state file");
        Self { dir, state_path }
    }

    /// Overwrites the state file.
    pub fn write_state(&self, data: &[u8]) {
        std::fs::write(&self.state_path, data).expect("overwrite state file");
    }

    /// Path of a stored backup payload in the local tier.
    pub fn backup_payload_path(&self, id: &str) -> PathBuf {
        self.dir.path().join("backups").join(format!("{id}.bak"))
    }

    /// An initialized local backend in this environment.
    pub fn local_backend(&self) -> Arc<dyn StorageBackend> {
        let storage = LocalStorage::new(LocalConfig {
            enabled: true,
            path: self.dir.path().join("backups").display().to_string(),
            retention_count: 10,
        });
        storage
            .initialize(&Cancellation::none())
            .expect("initialize local backend");
        Arc::new(storage)
    }

    /// A local-only engine without encryption.
    pub fn engine(&self) -> Arc<BackupEngine> {
        self.engine_with(Arc::new(NoopProvider::new()))
    }

    /// A local-only engine over the given provider.
    pub fn engine_with(&self, provider: Arc<dyn EncryptionProvider>) -> Arc<BackupEngine> {
        Arc::new(
            BackupEngineBuilder::new(provider)
                .local(self.local_backend())
                .build()
                .expect("build engine"),
        )
    }

    /// A dual-tier engine over an in-process object store, plus the store
    /// handle for stats and failure injection.
    pub fn dual_engine(&self) -> (Arc<BackupEngine>, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let remote = RemoteStorage::with_sleeper(
            RemoteConfig {
                enabled: true,
                provider: "s3".to_string(),
                bucket: "tf-backups".to_string(),
                region: "us-west-2".to_string(),
                prefix: "states/".to_string(),
            },
            Box::new(store.clone()),
            Box::new(|_| {}),
        );
        let engine = Arc::new(
            BackupEngineBuilder::new(Arc::new(NoopProvider::new()))
                .local(self.local_backend())
                .remote(Arc::new(remote))
                .build()
                .expect("build dual-tier engine"),
        );
        (engine, store)
    }

    /// Creates a backup of the environment's state file.
    pub fn backup(&self, engine: &BackupEngine, description: &str) -> BackupRecord {
        engine
            .create_backup(
                &Cancellation::none(),
                &BackupOptions {
                    state_file_path: Some(self.state_path.clone()),
                    description: description.to_string(),
                    force: false,
                },
            )
            .expect("create backup")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits out the current identifier second, so the next backup gets a fresh
/// identifier.
pub fn next_second() {
    std::thread::sleep(std::time::Duration::from_millis(1100));
}
