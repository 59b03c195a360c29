//! Configuration schema and validation.
//!
//! `Config::default()` is the zero value that YAML overlays deserialize into;
//! [`Config::standard`] is the documented default configuration the loader
//! starts from before merging overlays. Keeping the two apart preserves the
//! merge semantics: a scalar absent from an overlay stays zero and does not
//! override a lower-priority value, while booleans from a present source
//! always override.

use serde::{Deserialize, Serialize};

use crate::error::{TfSafeError, TfSafeResult};

/// Minimum per-tier retention the engine never violates.
pub const MIN_RETENTION_COUNT: usize = 3;

/// Default local backup directory.
pub const DEFAULT_LOCAL_PATH: &str = ".tfstate_snapshots";

/// Project-level configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".tf-safe.yaml";

/// Global configuration file, relative to the home directory.
pub const DEFAULT_GLOBAL_CONFIG: &str = ".tf-safe/config.yaml";

/// Complete tf-safe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local tier settings.
    pub local: LocalConfig,
    /// Remote tier settings.
    pub remote: RemoteConfig,
    /// Encryption provider settings.
    pub encryption: EncryptionConfig,
    /// Retention policy settings.
    pub retention: RetentionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Per-command automatic backup settings.
    pub commands: CommandsConfig,
}

/// Local tier settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Whether the local tier is enabled.
    pub enabled: bool,
    /// Backup directory, created with owner-only mode.
    pub path: String,
    /// Target number of local backups to retain.
    pub retention_count: usize,
}

/// Remote tier settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Whether the remote tier is enabled.
    pub enabled: bool,
    /// Object-store provider (`s3`, `gcs`, `azure`).
    pub provider: String,
    /// Bucket or container name.
    pub bucket: String,
    /// Provider region, where applicable.
    pub region: String,
    /// Key prefix applied to every object.
    pub prefix: String,
}

/// Encryption provider settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Provider kind: `passphrase` (alias `aes`), `kms`, or `none`.
    pub provider: String,
    /// Key identifier for the `kms` provider.
    pub kms_key_id: String,
    /// Passphrase for the `passphrase` provider.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub passphrase: String,
}

/// Retention policy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Target number of local backups to retain.
    pub local_count: usize,
    /// Target number of remote backups to retain.
    pub remote_count: usize,
    /// Age cap in days; `0` disables age-based retention.
    pub max_age_days: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Log format: `text` or `json`.
    pub format: String,
}

/// Per-command automatic backup settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Settings for `terraform apply`.
    pub apply: CommandConfig,
    /// Settings for `terraform plan`.
    pub plan: CommandConfig,
    /// Settings for `terraform destroy`.
    pub destroy: CommandConfig,
}

/// Settings for one wrapped command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Whether pre/post backups run automatically for this command.
    pub auto_backup: bool,
}

impl Config {
    /// The documented default configuration.
    pub fn standard() -> Self {
        Self {
            local: LocalConfig {
                enabled: true,
                path: DEFAULT_LOCAL_PATH.to_string(),
                retention_count: 10,
            },
            remote: RemoteConfig {
                enabled: false,
                provider: "s3".to_string(),
                bucket: String::new(),
                region: "us-west-2".to_string(),
                prefix: String::new(),
            },
            encryption: EncryptionConfig {
                provider: "aes".to_string(),
                kms_key_id: String::new(),
                passphrase: String::new(),
            },
            retention: RetentionConfig {
                local_count: 10,
                remote_count: 50,
                max_age_days: 90,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
            commands: CommandsConfig {
                apply: CommandConfig { auto_backup: true },
                // Plan does not modify state.
                plan: CommandConfig { auto_backup: false },
                destroy: CommandConfig { auto_backup: true },
            },
        }
    }

    /// Validates the merged configuration.
    pub fn validate(&self) -> TfSafeResult<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.local.enabled {
            if self.local.path.is_empty() {
                problems.push("local.path is required when local storage is enabled".to_string());
            }
            if self.local.retention_count < MIN_RETENTION_COUNT {
                problems.push(format!(
                    "local.retention_count must be at least {MIN_RETENTION_COUNT}"
                ));
            }
        }

        if self.remote.enabled {
            if self.remote.provider.is_empty() {
                problems
                    .push("remote.provider is required when remote storage is enabled".to_string());
            }
            if self.remote.bucket.is_empty() {
                problems
                    .push("remote.bucket is required when remote storage is enabled".to_string());
            }
            if self.remote.provider == "s3" && self.remote.region.is_empty() {
                problems.push("remote.region is required for the s3 provider".to_string());
            }
        }

        match self.encryption.provider.as_str() {
            "kms" if self.kms_key_id_missing() => {
                problems.push("encryption.kms_key_id is required when using KMS".to_string());
            }
            "aes" | "passphrase" if self.encryption.passphrase.is_empty() => {
                problems.push(
                    "encryption.passphrase is required when using passphrase encryption"
                        .to_string(),
                );
            }
            _ => {}
        }

        if self.retention.local_count < MIN_RETENTION_COUNT {
            problems.push(format!(
                "retention.local_count must be at least {MIN_RETENTION_COUNT}"
            ));
        }
        if self.retention.remote_count < 1 {
            problems.push("retention.remote_count must be at least 1".to_string());
        }

        if !self.logging.level.is_empty()
            && !matches!(self.logging.level.as_str(), "debug" | "info" | "warn" | "error")
        {
            problems.push(format!("logging.level '{}' is not recognized", self.logging.level));
        }
        if !self.logging.format.is_empty()
            && !matches!(self.logging.format.as_str(), "text" | "json")
        {
            problems.push(format!(
                "logging.format '{}' is not recognized",
                self.logging.format
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TfSafeError::ConfigInvalid {
                reason: problems.join("; "),
            })
        }
    }

    fn kms_key_id_missing(&self) -> bool {
        self.encryption.kms_key_id.is_empty()
    }
}
