//! tf-safe binary entry point.
//!
//! Exit codes: 0 on success, the terraform exit code on passthrough
//! commands, 1 on any other fatal error.

mod cli;
mod commands;
mod config_loader;
mod output;
mod templates;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tfsafe_core::{Config, ErrorReport, TfSafeError, TfSafeResult};

use crate::cli::{Cli, Command};
use crate::config_loader::ConfigLoader;

fn main() {
    let cli = Cli::parse();
    let config = ConfigLoader::with_standard_sources(cli.config.as_deref()).load();
    init_logging(&config, cli.verbose);

    let code = match run(&cli, &config) {
        Ok(code) => code,
        Err(err) => {
            report_error(&config, &err);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli, config: &Config) -> TfSafeResult<i32> {
    match &cli.command {
        Command::Init {
            interactive,
            force,
            template,
            output,
        } => {
            commands::run_init(*interactive, *force, template, output)?;
            Ok(0)
        }

        Command::Backup {
            path,
            description,
            force,
            dry_run,
        } => {
            commands::run_backup(config, path.clone(), description.clone(), *force, *dry_run)?;
            Ok(0)
        }

        Command::List {
            format,
            storage,
            limit,
        } => {
            commands::run_list(config, format, storage, *limit)?;
            Ok(0)
        }

        Command::Restore {
            backup_id,
            target,
            force,
            no_backup,
        } => {
            commands::run_restore(config, backup_id.clone(), target.clone(), *force, *no_backup)?;
            Ok(0)
        }

        Command::Apply { args } => commands::run_passthrough(config, "apply", args),
        Command::Plan { args } => commands::run_passthrough(config, "plan", args),
        Command::Destroy { args } => commands::run_passthrough(config, "destroy", args),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else if config.logging.level.is_empty() {
        "info"
    } else {
        &config.logging.level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn report_error(config: &Config, err: &TfSafeError) {
    if config.logging.format == "json" {
        let report = ErrorReport::from_error(err);
        if let Ok(body) = serde_json::to_string(&report) {
            eprintln!("{body}");
            return;
        }
    }
    eprintln!("Error: {err}");
}
