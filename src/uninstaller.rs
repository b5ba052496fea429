//! Manifest-driven removal
//!
//! Reverses one installation in four ordered steps:
//!
//! ```text
//! 1. menu shortcut       (failure logged, continue)
//! 2. desktop shortcut    (failure logged, continue)
//! 3. install root        (failure is fatal, steps 4 skipped)
//! 4. refresh caches, delete manifest
//! ```
//!
//! Removal is synchronous and single-threaded. Shortcuts always go before
//! the install tree.

use crate::desktop::{DesktopDirs, DesktopRefresh, SystemRefresh};
use crate::error::{InstallError, Result};
use crate::manifest::{InstallRecord, ManifestStore};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use strum::{Display, EnumCount, EnumIter};

/// One step of a removal, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumCount)]
pub enum UninstallStep {
    #[strum(serialize = "Removing menu shortcut")]
    MenuShortcut,
    #[strum(serialize = "Removing desktop shortcut")]
    DesktopShortcut,
    #[strum(serialize = "Removing installed files")]
    InstallRoot,
    #[strum(serialize = "Refreshing caches and removing install record")]
    Cleanup,
}

impl UninstallStep {
    /// 1-based position, for `step n/4` style reporting
    pub fn number(self) -> usize {
        self as usize + 1
    }
}

/// What a finished removal did
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<PathBuf>,
    /// Problems in steps 1, 2 and 4
    pub warnings: Vec<String>,
}

/// Lists install records and removes installations.
pub struct Uninstaller {
    store: ManifestStore,
    dirs: Option<DesktopDirs>,
    refresh: Box<dyn DesktopRefresh>,
}

impl Uninstaller {
    pub fn new(store: ManifestStore) -> Self {
        Self {
            store,
            dirs: DesktopDirs::from_environment(),
            refresh: Box::new(SystemRefresh),
        }
    }

    pub fn with_desktop_dirs(mut self, dirs: Option<DesktopDirs>) -> Self {
        self.dirs = dirs;
        self
    }

    pub fn with_refresh(mut self, refresh: Box<dyn DesktopRefresh>) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Load every readable record. Malformed manifests are logged and skipped.
    pub fn discover(&self) -> Result<Vec<(PathBuf, InstallRecord)>> {
        let mut records = Vec::new();
        for path in self.store.list()? {
            match self.store.load(&path) {
                Ok(record) => records.push((path, record)),
                Err(e) => tracing::warn!("Skipping manifest: {}", e),
            }
        }
        tracing::debug!("Discovered {} installed application(s)", records.len());
        Ok(records)
    }

    /// Find a record by application name (case-insensitive) or slug.
    pub fn find(&self, name: &str) -> Result<Option<InstallRecord>> {
        let wanted = name.trim();
        Ok(self
            .discover()?
            .into_iter()
            .map(|(_, record)| record)
            .find(|r| r.app_name.eq_ignore_ascii_case(wanted) || r.slug() == wanted))
    }

    /// Run the four removal steps, calling `on_step` after each one.
    ///
    /// # Errors
    ///
    /// Only a failure to remove the install root is returned; the cleanup
    /// step is skipped in that case and the manifest stays in place.
    pub fn uninstall<F>(&self, record: &InstallRecord, mut on_step: F) -> Result<UninstallReport>
    where
        F: FnMut(UninstallStep),
    {
        let mut report = UninstallReport::default();
        tracing::info!("Uninstalling {} from {}", record.app_name, record.install_path.display());

        remove_shortcut(record.menu_file.as_deref(), &mut report);
        on_step(UninstallStep::MenuShortcut);

        remove_shortcut(record.desktop_file.as_deref(), &mut report);
        on_step(UninstallStep::DesktopShortcut);

        remove_install_root(&record.install_path)?;
        report.removed.push(record.install_path.clone());
        on_step(UninstallStep::InstallRoot);

        match &self.dirs {
            Some(dirs) => self.refresh.refresh_caches(dirs),
            None => tracing::debug!("Home directory unknown; cache refresh skipped"),
        }
        if let Err(e) = self.store.delete(record) {
            let msg = format!("Failed to remove install record: {}", e);
            tracing::warn!("{}", msg);
            report.warnings.push(msg);
        }
        on_step(UninstallStep::Cleanup);

        tracing::info!("{} uninstalled", record.app_name);
        Ok(report)
    }
}

fn remove_shortcut(path: Option<&Path>, report: &mut UninstallReport) {
    let Some(path) = path else {
        return;
    };
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed {}", path.display());
            report.removed.push(path.to_path_buf());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("Shortcut already gone: {}", path.display());
        }
        Err(e) => {
            let msg = format!("Failed to remove {}: {}", path.display(), e);
            tracing::warn!("{}", msg);
            report.warnings.push(msg);
        }
    }
}

fn remove_install_root(root: &Path) -> Result<()> {
    // Never walk up from a damaged record into `/` or a relative cwd
    if !root.is_absolute() || root.parent().is_none() {
        return Err(InstallError::fatal(format!(
            "Refusing to remove install path {:?}",
            root
        )));
    }

    match fs::remove_dir_all(root) {
        Ok(()) => {
            tracing::info!("Removed {}", root.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("Install directory already gone: {}", root.display());
            Ok(())
        }
        Err(e) => Err(InstallError::fatal(format!(
            "Failed to remove {}: {}",
            root.display(),
            e
        ))),
    }
}
