//! Free disk space checks
//!
//! The install root usually does not exist yet when space is checked, so
//! the query falls back to its parent and then to the current directory.

use crate::error::{InstallError, Result};
use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Pick the directory whose filesystem answers for `target`.
pub fn probe_path(target: &Path) -> PathBuf {
    if target.exists() {
        return target.to_path_buf();
    }
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && parent.exists() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Free space available to unprivileged users at `target`, in gigabytes.
pub fn free_space_gb(target: &Path) -> Result<f64> {
    let probe = probe_path(target);
    let stat = statvfs(&probe).map_err(|e| {
        InstallError::fatal(format!(
            "Failed to check disk space at {}: {}",
            probe.display(),
            e
        ))
    })?;

    #[allow(clippy::unnecessary_cast)] // field widths differ between platforms
    let free_bytes = stat.blocks_available() as u64 * stat.block_size() as u64;
    let free_gb = free_bytes as f64 / BYTES_PER_GB;

    tracing::debug!("Free space at {}: {:.2} GB", probe.display(), free_gb);
    Ok(free_gb)
}

/// Fail unless at least `required_gb` is free at `target`.
pub fn ensure_free_space(target: &Path, required_gb: f64) -> Result<f64> {
    let free_gb = free_space_gb(target)?;
    if free_gb < required_gb {
        return Err(InstallError::fatal(format!(
            "Not enough disk space. Free: {:.2} GB, required: {:.2} GB",
            free_gb, required_gb
        )));
    }
    Ok(free_gb)
}
