//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Terraform state file protection and backup tool.
///
/// tf-safe protects terraform.tfstate files through automated, encrypted,
/// integrity-verified backups across a local directory and an optional
/// remote object store, and restores them atomically with rollback.
#[derive(Parser)]
#[command(name = "tf-safe", version, about, long_about = None)]
pub struct Cli {
    /// Explicit configuration file (highest-priority source).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (debug-level logging).
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Create a tf-safe configuration file.
    Init {
        /// Prompt for common options instead of using a template.
        #[arg(short, long)]
        interactive: bool,
        /// Overwrite an existing configuration file.
        #[arg(short, long)]
        force: bool,
        /// Template: default, minimal, enterprise, local-only, cloud-native.
        #[arg(short, long, default_value = "default")]
        template: String,
        /// Output configuration file path.
        #[arg(short, long, default_value = ".tf-safe.yaml")]
        output: PathBuf,
    },

    /// Create a backup of the Terraform state file.
    Backup {
        /// State file to back up; auto-detected when omitted.
        path: Option<PathBuf>,
        /// Free-text description recorded on the backup.
        #[arg(short, long, default_value = "")]
        description: String,
        /// Create an empty backup when the state file is missing.
        #[arg(long)]
        force: bool,
        /// Show what would be done without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// List available backups.
    List {
        /// Output format: table, json, or yaml.
        #[arg(short, long, default_value = "table")]
        format: String,
        /// Filter by tier: all, local, or remote.
        #[arg(short, long, default_value = "all")]
        storage: String,
        /// Limit number of results (0 = no limit).
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Restore a backup over the Terraform state file.
    Restore {
        /// Identifier of the backup to restore.
        backup_id: String,
        /// Target path for the restored state file.
        #[arg(long, default_value = "terraform.tfstate")]
        target: PathBuf,
        /// Skip the interactive confirmation.
        #[arg(long)]
        force: bool,
        /// Skip the pre-restore checkpoint backup.
        #[arg(long)]
        no_backup: bool,
    },

    /// Run `terraform apply` bracketed by automatic backups.
    Apply {
        /// Arguments passed through to terraform unchanged.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run `terraform plan` bracketed by automatic backups.
    Plan {
        /// Arguments passed through to terraform unchanged.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run `terraform destroy` bracketed by automatic backups.
    Destroy {
        /// Arguments passed through to terraform unchanged.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}
