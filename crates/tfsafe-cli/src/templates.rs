//! Configuration templates for `tf-safe init`.

use tfsafe_core::{
    CommandConfig, CommandsConfig, Config, EncryptionConfig, LocalConfig, LoggingConfig,
    RemoteConfig, RetentionConfig,
};

/// A named configuration template.
pub struct ConfigTemplate {
    /// Template name as accepted by `--template`.
    pub name: &'static str,
    /// One-line description shown in errors and help.
    pub description: &'static str,
    /// The configuration the template produces.
    pub config: Config,
}

/// All templates, in display order.
pub fn available_templates() -> Vec<ConfigTemplate> {
    vec![
        ConfigTemplate {
            name: "default",
            description: "Standard configuration with local backups and AES encryption",
            config: default_template(),
        },
        ConfigTemplate {
            name: "minimal",
            description: "Minimal configuration with only local backups, no encryption",
            config: minimal_template(),
        },
        ConfigTemplate {
            name: "enterprise",
            description: "Enterprise configuration with S3 remote storage and KMS encryption",
            config: enterprise_template(),
        },
        ConfigTemplate {
            name: "local-only",
            description: "Local-only configuration with enhanced retention",
            config: local_only_template(),
        },
        ConfigTemplate {
            name: "cloud-native",
            description: "Cloud-native configuration optimized for CI/CD pipelines",
            config: cloud_native_template(),
        },
    ]
}

/// Looks a template up by name.
pub fn template(name: &str) -> Option<Config> {
    available_templates()
        .into_iter()
        .find(|t| t.name == name)
        .map(|t| t.config)
}

fn standard_commands() -> CommandsConfig {
    CommandsConfig {
        apply: CommandConfig { auto_backup: true },
        plan: CommandConfig { auto_backup: false },
        destroy: CommandConfig { auto_backup: true },
    }
}

fn default_template() -> Config {
    Config::standard()
}

fn minimal_template() -> Config {
    Config {
        local: LocalConfig {
            enabled: true,
            path: ".tfstate_snapshots".to_string(),
            retention_count: 5,
        },
        remote: RemoteConfig::default(),
        encryption: EncryptionConfig {
            provider: "none".to_string(),
            ..EncryptionConfig::default()
        },
        retention: RetentionConfig {
            local_count: 5,
            remote_count: 10,
            max_age_days: 30,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
        },
        commands: standard_commands(),
    }
}

fn enterprise_template() -> Config {
    Config {
        local: LocalConfig {
            enabled: true,
            path: ".tfstate_snapshots".to_string(),
            retention_count: 20,
        },
        remote: RemoteConfig {
            enabled: true,
            provider: "s3".to_string(),
            bucket: "your-terraform-backups".to_string(),
            region: "us-west-2".to_string(),
            prefix: "terraform-state/".to_string(),
        },
        encryption: EncryptionConfig {
            provider: "kms".to_string(),
            kms_key_id:
                "arn:aws:kms:us-west-2:123456789012:key/12345678-1234-1234-1234-123456789012"
                    .to_string(),
            passphrase: String::new(),
        },
        retention: RetentionConfig {
            local_count: 20,
            remote_count: 100,
            max_age_days: 365,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
        },
        commands: standard_commands(),
    }
}

fn local_only_template() -> Config {
    Config {
        local: LocalConfig {
            enabled: true,
            path: ".tfstate_snapshots".to_string(),
            retention_count: 50,
        },
        remote: RemoteConfig::default(),
        encryption: EncryptionConfig {
            provider: "aes".to_string(),
            ..EncryptionConfig::default()
        },
        retention: RetentionConfig {
            local_count: 50,
            remote_count: 10,
            max_age_days: 180,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
        },
        commands: standard_commands(),
    }
}

fn cloud_native_template() -> Config {
    Config {
        // CI/CD runners are ephemeral; everything lives remotely.
        local: LocalConfig::default(),
        remote: RemoteConfig {
            enabled: true,
            provider: "s3".to_string(),
            bucket: "ci-terraform-backups".to_string(),
            region: "us-west-2".to_string(),
            prefix: "projects/".to_string(),
        },
        encryption: EncryptionConfig {
            provider: "kms".to_string(),
            // Filled in by the operator.
            kms_key_id: String::new(),
            passphrase: String::new(),
        },
        retention: RetentionConfig {
            local_count: 3,
            remote_count: 200,
            max_age_days: 730,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
        },
        commands: standard_commands(),
    }
}
