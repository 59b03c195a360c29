//! Hierarchical configuration loading.
//!
//! Merge order, lowest to highest precedence: built-in defaults, the global
//! file (`~/.tf-safe/config.yaml`), the project file (`./.tf-safe.yaml`),
//! then an explicit `--config` file. Within a present source, unset scalars
//! do not override lower-priority values; booleans always do.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tfsafe_core::{Config, TfSafeError, TfSafeResult, DEFAULT_CONFIG_FILE, DEFAULT_GLOBAL_CONFIG};

/// One source of configuration data.
pub trait ConfigSource {
    /// Loads this source's overlay; `None` when the source is absent.
    fn load(&self) -> TfSafeResult<Option<Config>>;

    /// Merge priority; higher wins.
    fn priority(&self) -> u32;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;
}

/// A YAML file source.
pub struct FileSource {
    path: PathBuf,
    priority: u32,
    name: String,
}

impl FileSource {
    /// File source at `path` with the given priority.
    pub fn new(path: impl Into<PathBuf>, priority: u32, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            priority,
            name: name.into(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> TfSafeResult<Option<Config>> {
        let path = expand_home(&self.path);
        if !path.is_file() {
            return Ok(None);
        }
        let data = std::fs::read(&path)
            .map_err(|e| TfSafeError::io(format!("read {}", path.display()), e))?;
        let overlay: Config =
            serde_yaml::from_slice(&data).map_err(|e| TfSafeError::ConfigInvalid {
                reason: format!("failed to parse {}: {e}", path.display()),
            })?;
        debug!(source = %self.name, path = %path.display(), "loaded configuration source");
        Ok(Some(overlay))
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Loads and merges configuration from ordered sources.
#[derive(Default)]
pub struct ConfigLoader {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigLoader {
    /// An empty loader.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// The standard source stack, optionally topped by `--config`.
    pub fn with_standard_sources(explicit: Option<&Path>) -> Self {
        let mut loader = Self::new();
        loader.add_source(Box::new(FileSource::new(
            PathBuf::from("~").join(DEFAULT_GLOBAL_CONFIG),
            10,
            "global config",
        )));
        loader.add_source(Box::new(FileSource::new(
            DEFAULT_CONFIG_FILE,
            20,
            "project config",
        )));
        if let Some(path) = explicit {
            loader.add_source(Box::new(FileSource::new(path, 30, "explicit config")));
        }
        loader
    }

    /// Appends a source.
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        self.sources.push(source);
    }

    /// Merges all sources over the built-in defaults.
    ///
    /// A source that fails to load is skipped with a warning; the remaining
    /// sources still apply.
    pub fn load(&self) -> Config {
        let mut config = Config::standard();

        let mut order: Vec<&dyn ConfigSource> = self.sources.iter().map(|s| s.as_ref()).collect();
        order.sort_by_key(|s| s.priority());

        for source in order {
            match source.load() {
                Ok(Some(overlay)) => config = merge_configs(&config, &overlay),
                Ok(None) => {}
                Err(err) => warn!(source = source.name(), error = %err, "skipping config source"),
            }
        }

        config
    }
}

/// Merges `overlay` over `base`: non-zero scalars override, booleans from a
/// present source always override.
pub fn merge_configs(base: &Config, overlay: &Config) -> Config {
    let mut result = base.clone();

    if !overlay.local.path.is_empty() {
        result.local.path = overlay.local.path.clone();
    }
    if overlay.local.retention_count > 0 {
        result.local.retention_count = overlay.local.retention_count;
    }
    result.local.enabled = overlay.local.enabled;

    if !overlay.remote.provider.is_empty() {
        result.remote.provider = overlay.remote.provider.clone();
    }
    if !overlay.remote.bucket.is_empty() {
        result.remote.bucket = overlay.remote.bucket.clone();
    }
    if !overlay.remote.region.is_empty() {
        result.remote.region = overlay.remote.region.clone();
    }
    if !overlay.remote.prefix.is_empty() {
        result.remote.prefix = overlay.remote.prefix.clone();
    }
    result.remote.enabled = overlay.remote.enabled;

    if !overlay.encryption.provider.is_empty() {
        result.encryption.provider = overlay.encryption.provider.clone();
    }
    if !overlay.encryption.kms_key_id.is_empty() {
        result.encryption.kms_key_id = overlay.encryption.kms_key_id.clone();
    }
    if !overlay.encryption.passphrase.is_empty() {
        result.encryption.passphrase = overlay.encryption.passphrase.clone();
    }

    if overlay.retention.local_count > 0 {
        result.retention.local_count = overlay.retention.local_count;
    }
    if overlay.retention.remote_count > 0 {
        result.retention.remote_count = overlay.retention.remote_count;
    }
    if overlay.retention.max_age_days > 0 {
        result.retention.max_age_days = overlay.retention.max_age_days;
    }

    if !overlay.logging.level.is_empty() {
        result.logging.level = overlay.logging.level.clone();
    }
    if !overlay.logging.format.is_empty() {
        result.logging.format = overlay.logging.format.clone();
    }

    result.commands.apply.auto_backup = overlay.commands.apply.auto_backup;
    result.commands.plan.auto_backup = overlay.commands.plan.auto_backup;
    result.commands.destroy.auto_backup = overlay.commands.destroy.auto_backup;

    result
}

fn expand_home(path: &Path) -> PathBuf {
    let Some(rest) = path.strip_prefix("~").ok() else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
