//! Error taxonomy for the tf-safe workspace.
//!
//! One enum covers every failure kind the engines can surface. Variants carry
//! the operation and the identifier or path involved so that user-visible
//! messages name what was being done to what. `ErrorReport` is the
//! serializable projection (code, message, details, timestamp) used by the
//! CLI's JSON output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias used across the tf-safe crates.
pub type TfSafeResult<T> = Result<T, TfSafeError>;

/// Error variants for all tf-safe operations.
#[derive(Debug, Error)]
pub enum TfSafeError {
    /// The merged configuration is invalid or incomplete.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        /// Why validation rejected the configuration.
        reason: String,
    },

    /// No Terraform state file was found where one was expected.
    #[error("state file not found: {path}")]
    ArtifactMissing {
        /// The path or directory that was searched.
        path: String,
    },

    /// The file exists but is not a valid Terraform state file.
    #[error("not a valid Terraform state file: {path}: {reason}")]
    ArtifactInvalid {
        /// The offending file.
        path: String,
        /// What surface validation rejected.
        reason: String,
    },

    /// An I/O failure in a storage tier, local or remote.
    #[error("storage failure during {operation}: {reason}")]
    StorageIo {
        /// The operation that failed (store, retrieve, list, ...).
        operation: String,
        /// The underlying cause.
        reason: String,
    },

    /// Stored bytes no longer match the recorded fingerprint or length.
    #[error("backup {id} is corrupted: {reason}")]
    StorageCorrupted {
        /// The backup identifier.
        id: String,
        /// Mismatch details, including expected and actual values.
        reason: String,
    },

    /// An encryption provider failed to initialize, wrap, or unwrap.
    #[error("encryption failure: {reason}")]
    EncryptionFailed {
        /// The underlying cause.
        reason: String,
    },

    /// The terraform executable is not on the search path.
    #[error("terraform binary not found in PATH")]
    ToolMissing,

    /// The terraform executable is older than the supported minimum.
    #[error("terraform version {found} is not supported (minimum: {minimum})")]
    ToolIncompatible {
        /// The detected version.
        found: String,
        /// The minimum supported version.
        minimum: String,
    },

    /// The terraform executable ran but exited non-zero.
    #[error("terraform {command} exited with status {code}")]
    ToolFailed {
        /// The subcommand that was run.
        command: String,
        /// The child's exit status.
        code: i32,
    },

    /// A backup identifier that does not exist in any enabled tier.
    #[error("backup not found: {id}")]
    NotFound {
        /// The requested identifier.
        id: String,
    },

    /// The filesystem refused access.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: String,
    },

    /// The caller's cancellation token fired or its deadline passed.
    #[error("operation cancelled: {operation}")]
    Cancelled {
        /// The operation that was interrupted.
        operation: String,
    },
}

impl TfSafeError {
    /// Wraps an `std::io::Error` as a storage failure for `operation`.
    pub fn io(operation: impl Into<String>, err: std::io::Error) -> Self {
        let operation = operation.into();
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return TfSafeError::PermissionDenied { path: operation };
        }
        TfSafeError::StorageIo {
            operation,
            reason: err.to_string(),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            TfSafeError::ConfigInvalid { .. } => "CONFIG_ERROR",
            TfSafeError::ArtifactMissing { .. } | TfSafeError::ArtifactInvalid { .. } => {
                "VALIDATION_ERROR"
            }
            TfSafeError::StorageIo { .. } | TfSafeError::StorageCorrupted { .. } => "STORAGE_ERROR",
            TfSafeError::EncryptionFailed { .. } => "ENCRYPTION_ERROR",
            TfSafeError::ToolMissing
            | TfSafeError::ToolIncompatible { .. }
            | TfSafeError::ToolFailed { .. } => "TERRAFORM_ERROR",
            TfSafeError::NotFound { .. } => "NOT_FOUND",
            TfSafeError::PermissionDenied { .. } => "PERMISSION_ERROR",
            TfSafeError::Cancelled { .. } => "CANCELLED",
        }
    }

    /// True for the transient kinds the remote tier retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TfSafeError::StorageIo { .. })
    }
}

/// Serializable projection of a [`TfSafeError`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable error code, e.g. `STORAGE_ERROR`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Additional context, empty when none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    /// Builds a report from an error, stamping the current time.
    pub fn from_error(err: &TfSafeError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a report with extra detail text.
    pub fn with_details(err: &TfSafeError, details: impl Into<String>) -> Self {
        Self {
            details: details.into(),
            ..Self::from_error(err)
        }
    }
}
