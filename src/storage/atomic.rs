use crate::storage::StorageResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Replaces `target` with `bytes` without ever exposing a half-written file
///
/// # Write Flow
///
/// 1. Write `bytes` to `staging` and fsync it (best effort)
/// 2. Copy the current `target` to `backup`, if one is given and exists
/// 3. Rename `staging` over `target`
/// 4. If the rename fails, copy `staging` to `target` and delete `staging`
///
/// # Arguments
///
/// * `target` - Final file path
/// * `staging` - Temporary file in the same directory as `target`
/// * `bytes` - New file contents
/// * `backup` - Where to keep the previous contents of `target`
pub fn write_atomic(
    target: &Path,
    staging: &Path,
    bytes: &[u8],
    backup: Option<&Path>,
) -> StorageResult<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    {
        let mut file = File::create(staging)?;
        file.write_all(bytes)?;
        if let Err(e) = file.sync_all() {
            tracing::debug!("fsync of {} failed: {}", staging.display(), e);
        }
    }

    if let Some(backup) = backup {
        if target.exists() {
            if let Err(e) = fs::copy(target, backup) {
                tracing::warn!("Could not back up {}: {}", target.display(), e);
            }
        }
    }

    if let Err(e) = fs::rename(staging, target) {
        tracing::debug!(
            "Rename {} -> {} failed ({}), falling back to copy",
            staging.display(),
            target.display(),
            e
        );
        fs::copy(staging, target)?;
        if let Err(e) = fs::remove_file(staging) {
            tracing::debug!("Could not remove {}: {}", staging.display(), e);
        }
    }

    Ok(())
}
