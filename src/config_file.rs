//! Installation configuration loading and validation.
//!
//! The configuration is authored alongside the game bundle (`config.json`
//! next to the installer) and is treated as immutable input for one run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Patterns marked executable when the configuration does not list its own.
pub const DEFAULT_EXEC_PATTERNS: &[&str] = &["*.sh", "*.bin", "*.x86", "*.x86_64"];

fn default_exec_patterns() -> Vec<String> {
    DEFAULT_EXEC_PATTERNS.iter().map(|p| (*p).to_string()).collect()
}

/// Fields of the generated `.desktop` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopEntryConfig {
    pub name: String,
    pub exec: String,
    pub icon: String,
    pub categories: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub terminal: bool,
    pub comment: String,
}

/// Installation configuration for one bundled application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    /// Install root (absolute once chosen)
    pub install_path: PathBuf,
    pub icon_path: PathBuf,
    pub banner_path: PathBuf,
    /// Zip archives extracted in order
    pub game_assets: Vec<PathBuf>,
    pub dll_path: PathBuf,
    /// Primary executable, relative to the install root
    pub exec_path: PathBuf,
    /// Directories (relative to the install root) scanned for executables
    pub exec_dirs: Vec<PathBuf>,
    /// Name globs that force the executable bit
    pub exec_patterns: Vec<String>,
    pub desktop_entry: DesktopEntryConfig,
    pub min_required_space_gb: f64,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            install_path: PathBuf::new(),
            icon_path: PathBuf::new(),
            banner_path: PathBuf::new(),
            game_assets: Vec::new(),
            dll_path: PathBuf::new(),
            exec_path: PathBuf::new(),
            exec_dirs: Vec::new(),
            exec_patterns: default_exec_patterns(),
            desktop_entry: DesktopEntryConfig::default(),
            min_required_space_gb: 0.0,
        }
    }
}

impl InstallationConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.install_path.as_os_str().is_empty() {
            anyhow::bail!("Install path must be specified");
        }

        if self.game_assets.is_empty() {
            anyhow::bail!("At least one game asset archive must be listed");
        }

        if self.desktop_entry.name.trim().is_empty() {
            anyhow::bail!("Desktop entry name must be specified");
        }

        if !self.min_required_space_gb.is_finite() || self.min_required_space_gb < 0.0 {
            anyhow::bail!(
                "Minimum required space must be a non-negative number (got {})",
                self.min_required_space_gb
            );
        }

        if self.exec_path.is_absolute() {
            anyhow::bail!("Executable path must be relative to the install root");
        }

        for pattern in &self.exec_patterns {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid executable pattern {:?}", pattern))?;
        }

        Ok(())
    }

    /// Application slug: lowercased name with spaces replaced by hyphens.
    ///
    /// Names both the manifest file and the `.desktop` file.
    pub fn app_slug(&self) -> String {
        slugify(&self.desktop_entry.name)
    }

    /// Return a copy installing into `<dir>/<application name>`.
    pub fn with_target_dir(&self, dir: &Path) -> Self {
        Self {
            install_path: dir.join(&self.desktop_entry.name),
            ..self.clone()
        }
    }

    /// Resolve relative archive paths against the installer directory.
    pub fn resolve_assets(&self, installer_dir: &Path) -> Vec<PathBuf> {
        self.game_assets
            .iter()
            .map(|asset| {
                if asset.is_absolute() {
                    asset.clone()
                } else {
                    installer_dir.join(asset)
                }
            })
            .collect()
    }
}

/// Lowercase a display name and replace spaces with hyphens.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}
