//! Command hooks: automatic backups and logging around terraform runs.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use tfsafe_core::{
    BackupOptions, BackupRecord, Cancellation, CommandsConfig, TfSafeError, TfSafeResult,
};
use tfsafe_engine::BackupEngine;

/// Commands that modify state and default to automatic backups when not
/// explicitly configured.
const MODIFYING_COMMANDS: [&str; 6] = ["apply", "destroy", "import", "refresh", "taint", "untaint"];

/// Three-entry capability the wrapper drives around each command.
pub trait CommandHook: Send + Sync {
    /// Runs before the command; may return a checkpoint record.
    fn pre_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
    ) -> TfSafeResult<Option<BackupRecord>>;

    /// Runs after a successful command, receiving the pre-record if any.
    fn post_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
        pre_record: Option<&BackupRecord>,
    ) -> TfSafeResult<Option<BackupRecord>>;

    /// Runs when the command exits non-zero. Best-effort cleanup.
    fn on_error(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
        error: &TfSafeError,
    ) -> TfSafeResult<()>;
}

impl<T: CommandHook + ?Sized> CommandHook for Arc<T> {
    fn pre_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
    ) -> TfSafeResult<Option<BackupRecord>> {
        (**self).pre_execute(cancel, command, args)
    }

    fn post_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
        pre_record: Option<&BackupRecord>,
    ) -> TfSafeResult<Option<BackupRecord>> {
        (**self).post_execute(cancel, command, args, pre_record)
    }

    fn on_error(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
        error: &TfSafeError,
    ) -> TfSafeResult<()> {
        (**self).on_error(cancel, command, args, error)
    }
}

/// Hook creating pre/post backups for state-mutating commands.
pub struct BackupHook {
    engine: Arc<BackupEngine>,
    commands: CommandsConfig,
    local_enabled: bool,
}

impl BackupHook {
    /// Hook over `engine`, governed by the per-command configuration.
    pub fn new(engine: Arc<BackupEngine>, commands: CommandsConfig, local_enabled: bool) -> Self {
        Self {
            engine,
            commands,
            local_enabled,
        }
    }

    fn should_backup(&self, command: &str) -> bool {
        match command {
            "apply" => self.commands.apply.auto_backup,
            "plan" => self.commands.plan.auto_backup,
            "destroy" => self.commands.destroy.auto_backup,
            other => MODIFYING_COMMANDS.contains(&other),
        }
    }

    fn snapshot(
        &self,
        cancel: &Cancellation,
        phase: &str,
        command: &str,
    ) -> TfSafeResult<Option<BackupRecord>> {
        let cwd = std::env::current_dir()
            .map_err(|e| TfSafeError::io("resolve working directory", e))?;
        let state_path = match self.engine.detector().locate(&cwd) {
            Ok(path) => path,
            Err(TfSafeError::ArtifactMissing { .. }) => {
                warn!(command, phase, "no state file found for automatic backup");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let options = BackupOptions {
            state_file_path: Some(state_path),
            description: format!("{phase}-{command} backup at {}", Utc::now().to_rfc3339()),
            force: false,
        };
        let record = self.engine.create_backup(cancel, &options)?;
        info!(id = %record.id, command, phase, "automatic backup created");
        Ok(Some(record))
    }
}

impl CommandHook for BackupHook {
    fn pre_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        _args: &[String],
    ) -> TfSafeResult<Option<BackupRecord>> {
        if !self.should_backup(command) || !self.local_enabled {
            return Ok(None);
        }
        self.snapshot(cancel, "Pre", command)
    }

    fn post_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        _args: &[String],
        _pre_record: Option<&BackupRecord>,
    ) -> TfSafeResult<Option<BackupRecord>> {
        if !self.should_backup(command) || !self.local_enabled {
            return Ok(None);
        }

        let record = self.snapshot(cancel, "Post", command)?;

        // The post-command snapshot is the natural point to prune.
        if let Err(err) = self.engine.apply_retention(cancel) {
            warn!(command, error = %err, "retention pass after backup failed");
        }

        Ok(record)
    }

    fn on_error(
        &self,
        _cancel: &Cancellation,
        command: &str,
        _args: &[String],
        error: &TfSafeError,
    ) -> TfSafeResult<()> {
        warn!(command, error = %error, "terraform command failed");
        Ok(())
    }
}

/// Hook narrating command execution at info level.
pub struct LoggingHook {
    verbose: bool,
}

impl LoggingHook {
    /// Logging hook; silent unless `verbose`.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandHook for LoggingHook {
    fn pre_execute(
        &self,
        _cancel: &Cancellation,
        command: &str,
        args: &[String],
    ) -> TfSafeResult<Option<BackupRecord>> {
        if self.verbose {
            info!(command, ?args, "executing terraform");
        }
        Ok(None)
    }

    fn post_execute(
        &self,
        _cancel: &Cancellation,
        command: &str,
        args: &[String],
        _pre_record: Option<&BackupRecord>,
    ) -> TfSafeResult<Option<BackupRecord>> {
        if self.verbose {
            info!(command, ?args, "completed terraform");
        }
        Ok(None)
    }

    fn on_error(
        &self,
        _cancel: &Cancellation,
        command: &str,
        args: &[String],
        error: &TfSafeError,
    ) -> TfSafeResult<()> {
        if self.verbose {
            info!(command, ?args, error = %error, "terraform failed");
        }
        Ok(())
    }
}
