//! Owner-only atomic JSON file I/O.
//!
//! Every persisted file in a node's state dir goes through these helpers:
//! write to a sibling temp file, fsync-free rename into place, mode 0o600.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use soulprint_core::error::SoulprintError;

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SoulprintError> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .map_err(|e| SoulprintError::Storage(format!("{}: {e}", path.display())))?;
    let value =
        serde_json::from_str(&json).map_err(|e| SoulprintError::Serialization(e.to_string()))?;
    Ok(Some(value))
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SoulprintError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SoulprintError::Serialization(e.to_string()))?;
    write_bytes_atomic(path, json.as_bytes())
}

/// Atomically replace `path` with pre-serialized bytes.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), SoulprintError> {
    let dir = path
        .parent()
        .ok_or_else(|| SoulprintError::Storage(format!("{}: no parent dir", path.display())))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| SoulprintError::Storage(format!("{}: {e}", dir.display())))?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|e| SoulprintError::Storage(format!("{}: {e}", tmp.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| SoulprintError::Storage(e.to_string()))?;
    }
    std::fs::rename(&tmp, path)
        .map_err(|e| SoulprintError::Storage(format!("{}: {e}", path.display())))?;
    Ok(())
}
