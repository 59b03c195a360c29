//! Filesystem primitives: atomic writes, checksums, directory handling.
//!
//! The atomic write goes through a temp file in the target's directory so the
//! final rename stays on one filesystem. The rename is the commit point:
//! readers observe either the old bytes or the new bytes, never a partial
//! state.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{TfSafeError, TfSafeResult};

/// Read buffer size for streaming checksums.
const CHECKSUM_BUF_SIZE: usize = 64 * 1024;

/// Creates `path` recursively with mode `0755` if it does not exist.
pub fn ensure_dir(path: &Path) -> TfSafeResult<()> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|e| TfSafeError::io(format!("create directory {}", path.display()), e))
}

/// Whether `path` exists (any file type).
pub fn file_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Writes `data` to `path` atomically with the given file mode.
///
/// The bytes land in a temp file next to the target, are fsynced, get the
/// requested mode, and are renamed over the target. On any error before the
/// rename the temp file is removed.
pub fn atomic_write(path: &Path, data: &[u8], mode: u32) -> TfSafeResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| TfSafeError::io(format!("create temp file in {}", dir.display()), e))?;
    tmp.write_all(data)
        .map_err(|e| TfSafeError::io(format!("write temp file for {}", path.display()), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TfSafeError::io(format!("sync temp file for {}", path.display()), e))?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .map_err(|e| TfSafeError::io(format!("set mode on {}", path.display()), e))?;

    // Commit point. NamedTempFile removes the temp file on drop if this fails.
    tmp.persist(path)
        .map_err(|e| TfSafeError::io(format!("rename into {}", path.display()), e.error))?;
    Ok(())
}

/// SHA-256 over an in-memory buffer, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)
}

/// SHA-256 over a file's contents, lowercase hex. Streams in 64 KiB chunks.
pub fn sha256_file(path: &Path) -> TfSafeResult<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| TfSafeError::io(format!("open {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHECKSUM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| TfSafeError::io(format!("read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
