//! Command implementations over the engines.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use tfsafe_core::{
    BackupOptions, Cancellation, Config, RestoreOptions, TfSafeError, TfSafeResult,
};
use tfsafe_crypto::{create_provider, EncryptionProvider};
use tfsafe_engine::{BackupEngine, BackupEngineBuilder, RestoreEngine};
use tfsafe_storage::{create_local, create_object_store, create_remote, StorageBackend};
use tfsafe_terraform::{BackupHook, LoggingHook, TerraformWrapper};

use crate::output;
use crate::templates;

/// Builds the backup engine from a validated configuration.
pub fn build_engine(config: &Config) -> TfSafeResult<Arc<BackupEngine>> {
    let cancel = Cancellation::none();

    let encryption: Arc<dyn EncryptionProvider> =
        Arc::from(create_provider(&config.encryption, None)?);

    let mut builder =
        BackupEngineBuilder::new(encryption).retention(config.retention.clone());

    if config.local.enabled {
        let local = create_local(config.local.clone())?;
        local.initialize(&cancel)?;
        builder = builder.local(Arc::new(local) as Arc<dyn StorageBackend>);
    }

    if config.remote.enabled {
        let store = create_object_store(&config.remote.provider)?;
        let remote = create_remote(config.remote.clone(), store)?;
        remote.initialize(&cancel)?;
        builder = builder.remote(Arc::new(remote) as Arc<dyn StorageBackend>);
    }

    builder.build().map(Arc::new)
}

fn require_local(config: &Config) -> TfSafeResult<()> {
    if !config.local.enabled {
        return Err(TfSafeError::ConfigInvalid {
            reason: "local storage is disabled in configuration".to_string(),
        });
    }
    Ok(())
}

/// `tf-safe backup [path]`.
pub fn run_backup(
    config: &Config,
    path: Option<PathBuf>,
    description: String,
    force: bool,
    dry_run: bool,
) -> TfSafeResult<()> {
    config.validate()?;
    require_local(config)?;

    let engine = build_engine(config)?;
    let cancel = Cancellation::none();

    if dry_run {
        let detector = engine.detector();
        let state_path = match &path {
            Some(p) => p.clone(),
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|e| TfSafeError::io("resolve working directory", e))?;
                detector.locate(&cwd)?
            }
        };
        detector.validate(&state_path)?;
        let info = detector.describe(&state_path)?;
        println!("DRY RUN: would back up {}", info.path.display());
        println!("  Size:      {}", output::format_size(info.size));
        if let Some(version) = &info.terraform_version {
            println!("  Terraform: {version}");
        }
        if let Some(serial) = info.serial {
            println!("  Serial:    {serial}");
        }
        return Ok(());
    }

    let record = engine.create_backup(
        &cancel,
        &BackupOptions {
            state_file_path: path,
            description: description.clone(),
            force,
        },
    )?;

    println!("Backup created successfully:");
    println!("  ID:        {}", record.id);
    println!("  Timestamp: {}", record.timestamp.to_rfc3339());
    println!("  Size:      {} bytes", record.size);
    println!("  Checksum:  {}", record.checksum);
    println!("  Storage:   {}", record.storage_type);
    if record.encrypted {
        println!("  Encrypted: Yes");
    }
    if !description.is_empty() {
        println!("  Description: {description}");
    }

    match engine.apply_retention(&cancel) {
        Ok(outcome) if outcome.local_deleted + outcome.remote_deleted > 0 => {
            println!(
                "Retention: deleted {} local and {} remote backup(s)",
                outcome.local_deleted, outcome.remote_deleted
            );
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to apply retention policies"),
    }

    Ok(())
}

/// `tf-safe list`.
pub fn run_list(config: &Config, format: &str, storage: &str, limit: usize) -> TfSafeResult<()> {
    if !matches!(storage, "all" | "local" | "remote") {
        return Err(TfSafeError::ConfigInvalid {
            reason: format!("invalid storage filter '{storage}'. Valid filters: all, local, remote"),
        });
    }

    config.validate()?;
    require_local(config)?;

    let engine = build_engine(config)?;
    let mut records = engine.list_backups(&Cancellation::none())?;

    match storage {
        "local" => records.retain(|r| r.storage_type == "local"),
        "remote" => records.retain(|r| r.storage_type != "local"),
        _ => {}
    }

    if limit > 0 && records.len() > limit {
        records.truncate(limit);
    }

    print!("{}", output::render(&records, format)?);
    Ok(())
}

/// `tf-safe restore <id>`.
pub fn run_restore(
    config: &Config,
    backup_id: String,
    target: PathBuf,
    force: bool,
    no_backup: bool,
) -> TfSafeResult<()> {
    config.validate()?;
    require_local(config)?;

    if !force && !confirm(&format!(
        "Restore backup {backup_id} to {}? This overwrites the current state file.",
        target.display()
    ))? {
        println!("Restore cancelled.");
        return Ok(());
    }

    let engine = build_engine(config)?;
    let restore = RestoreEngine::new(&engine);
    restore.restore(
        &Cancellation::none(),
        &RestoreOptions {
            backup_id: backup_id.clone(),
            target_path: target.clone(),
            create_checkpoint: !no_backup,
            force,
        },
    )?;

    println!("Restored backup {backup_id} to {}", target.display());
    Ok(())
}

/// `tf-safe init`.
pub fn run_init(
    interactive: bool,
    force: bool,
    template_name: &str,
    output_path: &Path,
) -> TfSafeResult<()> {
    if output_path.exists() && !force {
        return Err(TfSafeError::ConfigInvalid {
            reason: format!(
                "configuration file {} already exists. Use --force to overwrite",
                output_path.display()
            ),
        });
    }

    let config = if interactive {
        interactive_config()?
    } else {
        templates::template(template_name).ok_or_else(|| {
            let names: Vec<&str> = templates::available_templates()
                .iter()
                .map(|t| t.name)
                .collect();
            TfSafeError::ConfigInvalid {
                reason: format!(
                    "unknown template: {template_name}. Available templates: {}",
                    names.join(", ")
                ),
            }
        })?
    };

    save_config(&config, output_path)?;
    println!("Configuration file created: {}", output_path.display());

    match config.validate() {
        Ok(()) => println!("Configuration is valid"),
        Err(err) => {
            println!("Warning: configuration validation failed: {err}");
            println!("Please review and correct the configuration file.");
        }
    }

    println!();
    println!("Next steps:");
    println!("  1. Review {}", output_path.display());
    println!("  2. Run 'tf-safe backup' to create your first backup");
    println!("  3. Use 'tf-safe apply' instead of 'terraform apply' for automatic backups");
    Ok(())
}

/// `tf-safe apply|plan|destroy [args...]`: returns the exit code to
/// propagate.
pub fn run_passthrough(config: &Config, command: &str, args: &[String]) -> TfSafeResult<i32> {
    config.validate()?;

    let engine = build_engine(config)?;
    let mut wrapper = TerraformWrapper::new();
    wrapper.add_hook(Box::new(LoggingHook::new(config.logging.level == "debug")));
    wrapper.add_hook(Box::new(BackupHook::new(
        engine,
        config.commands.clone(),
        config.local.enabled,
    )));

    wrapper.execute(&Cancellation::none(), command, args)
}

fn save_config(config: &Config, path: &Path) -> TfSafeResult<()> {
    let data = serde_yaml::to_string(config).map_err(|e| TfSafeError::ConfigInvalid {
        reason: format!("failed to serialize configuration: {e}"),
    })?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tfsafe_core::ensure_dir(parent)?;
        }
    }
    std::fs::write(path, data)
        .map_err(|e| TfSafeError::io(format!("write {}", path.display()), e))
}

fn confirm(question: &str) -> TfSafeResult<bool> {
    print!("{question} [y/N]: ");
    std::io::stdout()
        .flush()
        .map_err(|e| TfSafeError::io("flush stdout", e))?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| TfSafeError::io("read confirmation", e))?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn interactive_config() -> TfSafeResult<Config> {
    println!("Interactive tf-safe configuration setup");
    println!("Press Enter to use the default values shown in [brackets]");
    println!();

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut config = Config::standard();

    println!("Local storage");
    config.local.enabled = prompt_bool(&mut lines, "Enable local backups", config.local.enabled)?;
    if config.local.enabled {
        config.local.path = prompt_string(&mut lines, "Local backup directory", &config.local.path)?;
        config.local.retention_count = prompt_usize(
            &mut lines,
            "Number of local backups to keep",
            config.local.retention_count,
        )?;
    }
    println!();

    println!("Remote storage");
    config.remote.enabled =
        prompt_bool(&mut lines, "Enable remote backups", config.remote.enabled)?;
    if config.remote.enabled {
        config.remote.provider = prompt_choice(
            &mut lines,
            "Remote storage provider",
            &["s3", "gcs", "azure"],
            &config.remote.provider,
        )?;
        config.remote.bucket = prompt_string(&mut lines, "Bucket name", &config.remote.bucket)?;
        if config.remote.provider == "s3" {
            config.remote.region = prompt_string(&mut lines, "Region", &config.remote.region)?;
        }
        config.remote.prefix =
            prompt_string(&mut lines, "Backup prefix (optional)", &config.remote.prefix)?;
    }
    println!();

    println!("Encryption");
    config.encryption.provider = prompt_choice(
        &mut lines,
        "Encryption provider",
        &["none", "aes", "kms", "passphrase"],
        &config.encryption.provider,
    )?;
    match config.encryption.provider.as_str() {
        "kms" => {
            config.encryption.kms_key_id =
                prompt_string(&mut lines, "KMS key ID or ARN", &config.encryption.kms_key_id)?;
        }
        "aes" | "passphrase" => {
            config.encryption.passphrase =
                prompt_string(&mut lines, "Encryption passphrase", "")?;
        }
        _ => {}
    }
    println!();

    println!("Retention");
    config.retention.local_count = prompt_usize(
        &mut lines,
        "Local backup retention count",
        config.retention.local_count,
    )?;
    if config.remote.enabled {
        config.retention.remote_count = prompt_usize(
            &mut lines,
            "Remote backup retention count",
            config.retention.remote_count,
        )?;
    }
    config.retention.max_age_days = prompt_usize(
        &mut lines,
        "Maximum backup age (days)",
        config.retention.max_age_days as usize,
    )? as u32;
    println!();

    println!("Logging");
    config.logging.level = prompt_choice(
        &mut lines,
        "Log level",
        &["debug", "info", "warn", "error"],
        &config.logging.level,
    )?;
    config.logging.format = prompt_choice(
        &mut lines,
        "Log format",
        &["text", "json"],
        &config.logging.format,
    )?;

    Ok(config)
}

type StdinLines<'a> = std::io::Lines<std::io::StdinLock<'a>>;

fn read_answer(lines: &mut StdinLines<'_>) -> TfSafeResult<String> {
    match lines.next() {
        Some(line) => Ok(line
            .map_err(|e| TfSafeError::io("read prompt answer", e))?
            .trim()
            .to_string()),
        None => Ok(String::new()),
    }
}

fn prompt_string(
    lines: &mut StdinLines<'_>,
    prompt: &str,
    default: &str,
) -> TfSafeResult<String> {
    print!("{prompt} [{default}]: ");
    std::io::stdout()
        .flush()
        .map_err(|e| TfSafeError::io("flush stdout", e))?;
    let answer = read_answer(lines)?;
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}

fn prompt_bool(lines: &mut StdinLines<'_>, prompt: &str, default: bool) -> TfSafeResult<bool> {
    let shown = if default { "y" } else { "n" };
    let answer = prompt_string(lines, &format!("{prompt} (y/n)"), shown)?.to_lowercase();
    Ok(matches!(answer.as_str(), "y" | "yes"))
}

fn prompt_usize(lines: &mut StdinLines<'_>, prompt: &str, default: usize) -> TfSafeResult<usize> {
    let answer = prompt_string(lines, prompt, &default.to_string())?;
    Ok(answer.parse().unwrap_or(default))
}

fn prompt_choice(
    lines: &mut StdinLines<'_>,
    prompt: &str,
    choices: &[&str],
    default: &str,
) -> TfSafeResult<String> {
    let shown = format!("{prompt} ({})", choices.join("/"));
    let answer = prompt_string(lines, &shown, default)?;
    if choices.contains(&answer.as_str()) {
        Ok(answer)
    } else {
        Ok(default.to_string())
    }
}
