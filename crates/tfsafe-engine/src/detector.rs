//! Terraform state file detection and surface validation.
//!
//! Validation is deliberately shallow: the file must parse as JSON and carry
//! `version`, `terraform_version`, and `serial`; a `resources` key, when
//! present, must be an array. Nothing else about the document is inspected.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use tfsafe_core::{TfSafeError, TfSafeResult, DEFAULT_STATE_FILE};

/// Keys a state file must carry to pass surface validation.
const REQUIRED_KEYS: [&str; 3] = ["version", "terraform_version", "serial"];

/// Sibling file the detector must ignore.
const STATE_BACKUP_FILE: &str = "terraform.tfstate.backup";

/// Information reported by [`StateDetector::describe`].
#[derive(Debug, Clone)]
pub struct StateFileInfo {
    /// Absolute path of the state file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Last modification instant.
    pub modified: DateTime<Utc>,
    /// `terraform_version` from the document, when it parses.
    pub terraform_version: Option<String>,
    /// `serial` from the document, when it parses.
    pub serial: Option<u64>,
    /// `lineage` from the document, when it parses.
    pub lineage: Option<String>,
}

/// Locates, validates, and describes Terraform state files.
#[derive(Debug, Default)]
pub struct StateDetector {
    /// File names recognized as state files, in preference order.
    candidates: Vec<&'static str>,
}

impl StateDetector {
    /// Detector recognizing the default `terraform.tfstate` name.
    pub fn new() -> Self {
        Self {
            candidates: vec![DEFAULT_STATE_FILE],
        }
    }

    /// Searches `dir` for a state file and returns its absolute path.
    ///
    /// `terraform.tfstate.backup` never counts. More than one plausible
    /// candidate is an error rather than a silent pick.
    pub fn locate(&self, dir: &Path) -> TfSafeResult<PathBuf> {
        let mut found = Vec::new();
        for name in &self.candidates {
            debug_assert_ne!(*name, STATE_BACKUP_FILE);
            let path = dir.join(name);
            if path.is_file() {
                found.push(path);
            }
        }

        match found.len() {
            0 => Err(TfSafeError::ArtifactMissing {
                path: dir.display().to_string(),
            }),
            1 => {
                let path = found.remove(0);
                debug!(path = %path.display(), "state file detected");
                Ok(absolutize(path))
            }
            _ => Err(TfSafeError::ArtifactInvalid {
                path: dir.display().to_string(),
                reason: format!(
                    "multiple state files found: {}",
                    found
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }

    /// Checks that `path` holds a valid Terraform state file.
    pub fn validate(&self, path: &Path) -> TfSafeResult<()> {
        let doc = self.parse(path)?;
        let object = doc.as_object().ok_or_else(|| TfSafeError::ArtifactInvalid {
            path: path.display().to_string(),
            reason: "document is not a JSON object".to_string(),
        })?;

        for key in REQUIRED_KEYS {
            if !object.contains_key(key) {
                return Err(TfSafeError::ArtifactInvalid {
                    path: path.display().to_string(),
                    reason: format!("missing required key '{key}'"),
                });
            }
        }

        if let Some(resources) = object.get("resources") {
            if !resources.is_array() {
                return Err(TfSafeError::ArtifactInvalid {
                    path: path.display().to_string(),
                    reason: "'resources' is not an array".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Reports size, mtime, and parsed header fields of a state file.
    pub fn describe(&self, path: &Path) -> TfSafeResult<StateFileInfo> {
        let meta = fs::metadata(path)
            .map_err(|e| TfSafeError::io(format!("stat {}", path.display()), e))?;
        let modified = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        let mut info = StateFileInfo {
            path: absolutize(path.to_path_buf()),
            size: meta.len(),
            modified,
            terraform_version: None,
            serial: None,
            lineage: None,
        };

        if let Ok(doc) = self.parse(path) {
            info.terraform_version = doc
                .get("terraform_version")
                .and_then(Value::as_str)
                .map(str::to_string);
            info.serial = doc.get("serial").and_then(Value::as_u64);
            info.lineage = doc.get("lineage").and_then(Value::as_str).map(str::to_string);
        }

        Ok(info)
    }

    fn parse(&self, path: &Path) -> TfSafeResult<Value> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TfSafeError::ArtifactMissing {
                path: path.display().to_string(),
            },
            _ => TfSafeError::io(format!("read {}", path.display()), e),
        })?;

        if data.is_empty() {
            return Err(TfSafeError::ArtifactInvalid {
                path: path.display().to_string(),
                reason: "file is empty".to_string(),
            });
        }

        serde_json::from_slice(&data).map_err(|e| TfSafeError::ArtifactInvalid {
            path: path.display().to_string(),
            reason: format!("invalid JSON: {e}"),
        })
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }
}
