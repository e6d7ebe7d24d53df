//! Filesystem utilities.
//!
//! Crash-tolerant writes for settings and exported artifacts, plus the path
//! checks applied to user-supplied inputs and outputs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Path Validation
// =============================================================================

/// Checks that `path` names an existing local file
///
/// URLs are rejected; sources are always read from disk.
pub fn validate_input_file(path: &Path, label: &str) -> CoreResult<PathBuf> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(CoreError::InvalidInput(format!("{label} is empty")));
    }
    if text.contains("://") {
        return Err(CoreError::InvalidInput(format!(
            "{label} must be a local file, got {text}"
        )));
    }
    if !path.exists() {
        return Err(CoreError::InvalidInput(format!(
            "{label} not found: {}",
            path.display()
        )));
    }
    if path.is_dir() {
        return Err(CoreError::InvalidInput(format!(
            "{label} is a directory: {}",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

/// Prepares `path` for writing: creates missing parents, refuses directories
pub fn prepare_output_path(path: &Path, label: &str) -> CoreResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(CoreError::InvalidInput(format!("{label} is empty")));
    }
    if path.is_dir() {
        return Err(CoreError::InvalidInput(format!(
            "{label} points to a directory: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path.to_path_buf())
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` using an atomic replace pattern.
///
/// The bytes go to a sibling `.tmp` file which is synced and then renamed
/// over the destination. An existing destination is moved aside to `.bak`
/// first and restored if the swap fails.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = sibling(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    replace(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| suffix.to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

fn replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Rename over an existing file is not reliable on Windows.
    let bak = sibling(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}
