//! Terraform version detection and comparison.
//!
//! The structured query (`terraform version -json`) is preferred; the plain
//! output falls back to a conservative regex. Versions compare as numeric
//! triples, so `0.13.0` beats `0.9.9`.

use regex::Regex;
use serde_json::Value;

use tfsafe_core::{TfSafeError, TfSafeResult};

/// Oldest terraform release the wrapper supports.
pub const MIN_TERRAFORM_VERSION: &str = "0.12.0";

/// Extracts the version string from `terraform version` output.
///
/// `json_output` is the structured form when the binary supports it;
/// `plain_output` is the first line of the classic form.
pub fn parse_version_output(json_output: Option<&str>, plain_output: &str) -> TfSafeResult<String> {
    if let Some(json) = json_output {
        if let Ok(doc) = serde_json::from_str::<Value>(json) {
            if let Some(version) = doc.get("terraform_version").and_then(Value::as_str) {
                return Ok(version.to_string());
            }
        }
    }

    let pattern = Regex::new(r"Terraform v(\d+\.\d+\.\d+)").expect("static pattern compiles");
    pattern
        .captures(plain_output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| TfSafeError::ToolIncompatible {
            found: plain_output.trim().to_string(),
            minimum: MIN_TERRAFORM_VERSION.to_string(),
        })
}

/// Whether `version` is at least `minimum`, comparing the three numeric
/// components in order.
pub fn is_version_compatible(version: &str, minimum: &str) -> bool {
    match (parse_triple(version), parse_triple(minimum)) {
        (Some(v), Some(m)) => v >= m,
        _ => false,
    }
}

fn parse_triple(version: &str) -> Option<(u64, u64, u64)> {
    let trimmed = version.trim().trim_start_matches('v');
    // Pre-release suffixes like 1.6.0-beta1 count as the release itself.
    let core = trimmed.split('-').next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some((major, minor, patch))
}
