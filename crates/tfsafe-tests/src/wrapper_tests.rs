//! Wrapper exit-code propagation with real backups around the fixture tool.

#![cfg(test)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tfsafe_core::{BackupOptions, BackupRecord, Cancellation, TfSafeError, TfSafeResult};
use tfsafe_engine::BackupEngine;
use tfsafe_terraform::{CommandHook, TerraformWrapper};

use crate::harness::TestEnv;

/// Writes an executable standing in for terraform that answers the version
/// query and exits with `exit_code` for everything else.
fn fixture(env: &TestEnv, exit_code: i32) -> PathBuf {
    let path = env.dir.path().join("terraform");
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then\n  echo '{{\"terraform_version\":\"1.5.0\"}}'\n  exit 0\nfi\nexit {exit_code}\n"
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Hook backing pre/post snapshots with a real engine over an explicit
/// state file path.
struct SnapshotHook {
    engine: Arc<BackupEngine>,
    state_path: PathBuf,
    post_calls: AtomicUsize,
    error_calls: AtomicUsize,
}

impl SnapshotHook {
    fn new(engine: Arc<BackupEngine>, state_path: PathBuf) -> Self {
        Self {
            engine,
            state_path,
            post_calls: AtomicUsize::new(0),
            error_calls: AtomicUsize::new(0),
        }
    }
}

impl CommandHook for SnapshotHook {
    fn pre_execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        _args: &[String],
    ) -> TfSafeResult<Option<BackupRecord>> {
        let record = self.engine.create_backup(
            cancel,
            &BackupOptions {
                state_file_path: Some(self.state_path.clone()),
                description: format!("Pre-{command} backup"),
                force: false,
            },
        )?;
        Ok(Some(record))
    }

    fn post_execute(
        &self,
        _cancel: &Cancellation,
        _command: &str,
        _args: &[String],
        _pre_record: Option<&BackupRecord>,
    ) -> TfSafeResult<Option<BackupRecord>> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn on_error(
        &self,
        _cancel: &Cancellation,
        _command: &str,
        _args: &[String],
        _error: &TfSafeError,
    ) -> TfSafeResult<()> {
        self.error_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_passthrough_exit_code_scenario() {
    let env = TestEnv::new();
    let engine = env.engine();
    let hook = Arc::new(SnapshotHook::new(engine.clone(), env.state_path.clone()));

    let mut wrapper = TerraformWrapper::with_binary(fixture(&env, 2));
    wrapper.add_hook(Box::new(hook.clone()));

    let code = wrapper
        .execute(&Cancellation::none(), "apply", &[])
        .unwrap();

    // The tool's status propagates unchanged.
    assert_eq!(code, 2);
    // The pre-record was emitted: exactly one backup exists.
    let listed = engine.list_backups(&Cancellation::none()).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].description.starts_with("Pre-apply backup"));
    // Error hooks ran once; post hooks never did.
    assert_eq!(hook.error_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hook.post_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_successful_run_reaches_post_hooks() {
    let env = TestEnv::new();
    let engine = env.engine();
    let hook = Arc::new(SnapshotHook::new(engine.clone(), env.state_path.clone()));

    let mut wrapper = TerraformWrapper::with_binary(fixture(&env, 0));
    wrapper.add_hook(Box::new(hook.clone()));

    let code = wrapper
        .execute(&Cancellation::none(), "apply", &[])
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(hook.post_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hook.error_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_incompatible_fixture_blocks_execution() {
    let env = TestEnv::new();
    let path = env.dir.path().join("terraform");
    fs::write(
        &path,
        "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then\n  echo 'Terraform v0.11.0'\n  exit 0\nfi\nexit 0\n",
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    let wrapper = TerraformWrapper::with_binary(path);
    let err = wrapper
        .execute(&Cancellation::none(), "apply", &[])
        .unwrap_err();
    assert!(matches!(err, TfSafeError::ToolIncompatible { .. }));
}
