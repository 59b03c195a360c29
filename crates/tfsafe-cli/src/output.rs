//! Rendering backup listings for the terminal.

use serde::Serialize;

use tfsafe_core::{BackupRecord, TfSafeError, TfSafeResult};

/// JSON/YAML envelope of a listing.
#[derive(Serialize)]
pub struct ListOutput<'a> {
    /// The listed records.
    pub backups: &'a [BackupRecord],
    /// Number of records.
    pub total: usize,
}

/// Renders records in the requested format.
pub fn render(records: &[BackupRecord], format: &str) -> TfSafeResult<String> {
    match format {
        "table" => Ok(render_table(records)),
        "json" => serde_json::to_string_pretty(&ListOutput {
            backups: records,
            total: records.len(),
        })
        .map_err(|e| TfSafeError::ConfigInvalid {
            reason: format!("failed to serialize listing: {e}"),
        }),
        "yaml" => serde_yaml::to_string(&ListOutput {
            backups: records,
            total: records.len(),
        })
        .map_err(|e| TfSafeError::ConfigInvalid {
            reason: format!("failed to serialize listing: {e}"),
        }),
        other => Err(TfSafeError::ConfigInvalid {
            reason: format!("invalid format '{other}'. Valid formats: table, json, yaml"),
        }),
    }
}

fn render_table(records: &[BackupRecord]) -> String {
    if records.is_empty() {
        return "No backups found.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<38} {:<20} {:<10} {:<10} {:<10} {:<10}\n",
        "BACKUP ID", "TIMESTAMP", "SIZE", "STORAGE", "ENCRYPTED", "CHECKSUM"
    ));
    out.push_str(&format!(
        "{:-<38} {:-<20} {:-<10} {:-<10} {:-<10} {:-<10}\n",
        "", "", "", "", "", ""
    ));

    for record in records {
        let encrypted = if record.encrypted { "Yes" } else { "No" };
        let checksum = if record.checksum.len() > 10 {
            format!("{}..", &record.checksum[..8])
        } else {
            record.checksum.clone()
        };
        out.push_str(&format!(
            "{:<38} {:<20} {:<10} {:<10} {:<10} {:<10}\n",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            format_size(record.size),
            record.storage_type,
            encrypted,
            checksum
        ));
    }

    out.push_str(&format!("\nTotal: {} backup(s)\n", records.len()));
    out
}

/// Human-readable byte size, 1024-based.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}
