//! Install record persistence
//!
//! One JSON record per installed application lives in a logs directory:
//!
//! ```text
//! <logs dir>/<slug>-install.json
//! ```
//!
//! The slug (lowercased name, spaces replaced by hyphens) is the only link
//! between a record and its file. There is no separate index, so two
//! applications whose names normalize to the same slug share one file and
//! the later install overwrites the earlier record.
//!
//! Records are written through a temporary file in the same directory and
//! then renamed into place, so a crash leaves either the old record or the
//! new one, never a truncated file.

use crate::config_file::slugify;
use crate::error::{InstallError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name suffix shared by every manifest
pub const MANIFEST_SUFFIX: &str = "-install.json";

/// Name of the logs directory next to the uninstaller
pub const LOGS_DIR_NAME: &str = "logs";

/// What was installed and where.
///
/// `install_path` is the exclusive key for later deletion: the uninstaller
/// removes exactly this tree and never derives it any other way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    #[serde(rename = "game_name")]
    pub app_name: String,
    pub install_path: PathBuf,
    pub install_date: DateTime<Local>,
    #[serde(default, with = "empty_path")]
    pub desktop_file: Option<PathBuf>,
    #[serde(default, with = "empty_path")]
    pub menu_file: Option<PathBuf>,
    #[serde(default)]
    pub installer_path: PathBuf,
    #[serde(default)]
    pub installer_dir: PathBuf,
    #[serde(default)]
    pub uninstaller_path: PathBuf,
}

impl InstallRecord {
    /// Slug used for the manifest file name
    pub fn slug(&self) -> String {
        slugify(&self.app_name)
    }
}

/// Optional paths are stored as `""` when absent.
mod empty_path {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::path::PathBuf;

    pub fn serialize<S: Serializer>(value: &Option<PathBuf>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(path) => s.serialize_str(&path.to_string_lossy()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<PathBuf>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok((!raw.is_empty()).then(|| PathBuf::from(raw)))
    }
}

/// Reads and writes install records in one logs directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    logs_dir: PathBuf,
}

impl ManifestStore {
    /// Store rooted at an explicit logs directory
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Store for the logs directory adjacent to the running executable
    pub fn beside_executable() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| InstallError::fatal(format!("{} has no parent", exe.display())))?;
        Ok(Self::new(dir.join(LOGS_DIR_NAME)))
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Deterministic manifest path for an application name
    pub fn path_for(&self, app_name: &str) -> PathBuf {
        self.logs_dir
            .join(format!("{}{}", slugify(app_name), MANIFEST_SUFFIX))
    }

    /// List manifest files, sorted by path.
    ///
    /// A missing logs directory means nothing is installed.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.logs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Logs directory not found: {}", self.logs_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name();
            if is_file && name.to_string_lossy().ends_with(MANIFEST_SUFFIX) {
                manifests.push(entry.path());
            }
        }
        manifests.sort();
        Ok(manifests)
    }

    /// Parse one manifest file
    pub fn load(&self, path: &Path) -> Result<InstallRecord> {
        let content = fs::read_to_string(path).map_err(|e| InstallError::malformed(path, e))?;
        serde_json::from_str(&content).map_err(|e| InstallError::malformed(path, e))
    }

    /// Persist a record, creating the logs directory if needed.
    pub fn save(&self, record: &InstallRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.logs_dir)?;

        let path = self.path_for(&record.app_name);
        let json = serde_json::to_string_pretty(record)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.logs_dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| InstallError::Io(e.error))?;

        set_mode(&path, 0o644);
        tracing::info!("Install record saved to {}", path.display());
        Ok(path)
    }

    /// Remove the manifest for a record. Already-missing files are fine.
    pub fn delete(&self, record: &InstallRecord) -> Result<()> {
        let path = self.path_for(&record.app_name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed install record {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        tracing::warn!("Failed to set mode on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}
