//! Driving the terraform binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use tfsafe_core::{Cancellation, TfSafeError, TfSafeResult};
use tfsafe_engine::StateDetector;

use crate::hooks::CommandHook;
use crate::version::{is_version_compatible, parse_version_output, MIN_TERRAFORM_VERSION};

/// Name of the external binary on the search path.
const TERRAFORM_BINARY: &str = "terraform";

/// Wrapper holding an ordered sequence of hooks over the terraform binary.
pub struct TerraformWrapper {
    binary_override: Option<PathBuf>,
    hooks: Vec<Box<dyn CommandHook>>,
    detector: StateDetector,
}

impl TerraformWrapper {
    /// Wrapper resolving `terraform` from the search path.
    pub fn new() -> Self {
        Self {
            binary_override: None,
            hooks: Vec::new(),
            detector: StateDetector::new(),
        }
    }

    /// Wrapper driving an explicit binary instead of searching the path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary_override: Some(binary.into()),
            ..Self::new()
        }
    }

    /// Appends a hook; hooks run in insertion order.
    pub fn add_hook(&mut self, hook: Box<dyn CommandHook>) {
        self.hooks.push(hook);
    }

    fn resolve_binary(&self) -> TfSafeResult<PathBuf> {
        if let Some(path) = &self.binary_override {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(TfSafeError::ToolMissing)
            };
        }
        find_in_path(TERRAFORM_BINARY).ok_or(TfSafeError::ToolMissing)
    }

    /// Detected terraform version string.
    pub fn version(&self) -> TfSafeResult<String> {
        let binary = self.resolve_binary()?;

        let json_output = Command::new(&binary)
            .args(["version", "-json"])
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).into_owned());

        // Old binaries answer the -json query with the plain banner, so the
        // structured output doubles as the regex fallback text.
        let plain_output = match &json_output {
            Some(out) => out.clone(),
            None => {
                let out = Command::new(&binary)
                    .arg("version")
                    .output()
                    .map_err(|e| TfSafeError::io("run terraform version", e))?;
                String::from_utf8_lossy(&out.stdout).into_owned()
            }
        };

        parse_version_output(json_output.as_deref(), &plain_output)
    }

    /// Verifies the binary exists and meets the version minimum.
    pub fn check_binary(&self) -> TfSafeResult<()> {
        let version = self.version()?;
        if !is_version_compatible(&version, MIN_TERRAFORM_VERSION) {
            return Err(TfSafeError::ToolIncompatible {
                found: version,
                minimum: MIN_TERRAFORM_VERSION.to_string(),
            });
        }
        debug!(%version, "terraform binary accepted");
        Ok(())
    }

    /// Runs `terraform <command> <args...>` bracketed by the hooks.
    ///
    /// Returns the child's exit status unchanged; the caller decides what to
    /// do with a non-zero code. Hook errors after the spawn are logged, not
    /// raised.
    pub fn execute(
        &self,
        cancel: &Cancellation,
        command: &str,
        args: &[String],
    ) -> TfSafeResult<i32> {
        let binary = self.resolve_binary()?;
        self.check_binary()?;

        // Some commands legitimately run without existing state.
        if let Ok(cwd) = std::env::current_dir() {
            if let Err(err) = self.detector.locate(&cwd) {
                warn!(error = %err, "could not detect state file");
            }
        }

        let mut pre_record = None;
        for hook in &self.hooks {
            if let Some(record) = hook.pre_execute(cancel, command, args)? {
                pre_record.get_or_insert(record);
            }
        }

        info!(command, ?args, "spawning terraform");
        let status = Command::new(&binary)
            .arg(command)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| TfSafeError::io(format!("spawn {}", binary.display()), e))?;

        if !status.success() {
            let code = status.code().unwrap_or(1);
            let failure = TfSafeError::ToolFailed {
                command: command.to_string(),
                code,
            };
            for hook in &self.hooks {
                if let Err(err) = hook.on_error(cancel, command, args, &failure) {
                    warn!(command, error = %err, "error hook failed");
                }
            }
            return Ok(code);
        }

        for hook in &self.hooks {
            if let Err(err) = hook.post_execute(cancel, command, args, pre_record.as_ref()) {
                warn!(command, error = %err, "post-execution hook failed");
            }
        }

        Ok(0)
    }
}

impl Default for TerraformWrapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Searches the `PATH` environment for an executable named `name`.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
