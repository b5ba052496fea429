//! Installer orchestration
//!
//! Sequences one installation run:
//!
//! ```text
//! Installer::preflight()   open archives, count entries, check free space
//!     ↓
//! PreparedInstall::run()   create install root, extract, finalize
//!   or ::spawn()           same, with extraction on a worker thread
//! ```
//!
//! All fatal errors are returned synchronously from `preflight`, `run` or
//! `spawn` before any archive member is written. Once extraction starts the
//! run always reaches `Done`; per-entry and finalization problems are
//! reported to the observer as warnings.

use crate::config_file::InstallationConfig;
use crate::desktop::{self, DesktopDirs, DesktopRefresh, SystemRefresh};
use crate::disk;
use crate::error::{InstallError, Result};
use crate::events::{ChannelObserver, EventStream, InstallEvent, InstallObserver};
use crate::extract::{ArchiveSet, EntryOutcome};
use crate::install_state::{InstallStage, StageTracker};
use crate::manifest::{InstallRecord, LOGS_DIR_NAME, ManifestStore};
use crate::permissions::{self, ExecutableClassifier};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread::{self, JoinHandle};

/// File name of the companion uninstaller, both next to the installer and
/// inside the install root.
pub const UNINSTALLER_NAME: &str = "uninstaller";

/// Everything one installation run needs, owned by the caller.
pub struct InstallContext {
    pub config: InstallationConfig,
    /// Running installer binary (recorded in the manifest)
    pub installer_path: PathBuf,
    /// Directory holding the bundle: archives, icon, staged uninstaller
    pub installer_dir: PathBuf,
    /// Whether to write menu and desktop shortcuts
    pub create_shortcuts: bool,
    /// Per-user directories for shortcuts; None if no home is known
    pub desktop_dirs: Option<DesktopDirs>,
    pub refresh: Box<dyn DesktopRefresh>,
}

impl std::fmt::Debug for InstallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallContext")
            .field("install_path", &self.config.install_path)
            .field("installer_dir", &self.installer_dir)
            .field("create_shortcuts", &self.create_shortcuts)
            .finish_non_exhaustive()
    }
}

impl InstallContext {
    /// Context for an installer binary at `installer_path`.
    ///
    /// Shortcuts are enabled, desktop directories come from the current
    /// user's home and the desktop environment is refreshed for real.
    pub fn new(config: InstallationConfig, installer_path: impl Into<PathBuf>) -> Self {
        let installer_path = installer_path.into();
        let installer_dir = installer_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            config,
            installer_path,
            installer_dir,
            create_shortcuts: true,
            desktop_dirs: DesktopDirs::from_environment(),
            refresh: Box::new(SystemRefresh),
        }
    }

    /// Context for the currently running executable
    pub fn from_environment(config: InstallationConfig) -> Result<Self> {
        Ok(Self::new(config, std::env::current_exe()?))
    }

    pub fn with_shortcuts(mut self, enabled: bool) -> Self {
        self.create_shortcuts = enabled;
        self
    }

    pub fn with_desktop_dirs(mut self, dirs: Option<DesktopDirs>) -> Self {
        self.desktop_dirs = dirs;
        self
    }

    pub fn with_refresh(mut self, refresh: Box<dyn DesktopRefresh>) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn install_root(&self) -> &Path {
        &self.config.install_path
    }

    /// Manifests go to `<install root>/logs`, next to the staged uninstaller.
    pub fn manifest_store(&self) -> ManifestStore {
        ManifestStore::new(self.install_root().join(LOGS_DIR_NAME))
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct InstallSummary {
    pub install_root: PathBuf,
    pub total_entries: u64,
    /// Entries actually written (rejected entries excluded)
    pub extracted: u64,
    /// Recoverable and non-fatal problems, in order
    pub warnings: Vec<String>,
    /// Where the install record was written, if it was
    pub manifest_path: Option<PathBuf>,
    pub record: InstallRecord,
    pub stage_history: Vec<(InstallStage, u64)>,
}

/// Entry point: owns the context until preflight succeeds.
#[derive(Debug)]
pub struct Installer {
    ctx: InstallContext,
    tracker: StageTracker,
}

impl Installer {
    pub fn new(ctx: InstallContext) -> Self {
        Self {
            ctx,
            tracker: StageTracker::new(),
        }
    }

    /// Open and count every archive, then check free space.
    ///
    /// # Errors
    ///
    /// `FatalConfig` if an archive cannot be opened, the archives hold no
    /// entries, or free space is below `min_required_space_gb`. Nothing is
    /// created on disk in any of these cases.
    pub fn preflight(mut self) -> Result<PreparedInstall> {
        self.tracker.transition_to(InstallStage::Preflight)?;

        match self.check() {
            Ok(archives) => Ok(PreparedInstall {
                ctx: self.ctx,
                tracker: self.tracker,
                archives,
            }),
            Err(e) => {
                fail(&mut self.tracker, &e);
                Err(e)
            }
        }
    }

    fn check(&self) -> Result<ArchiveSet> {
        let config = &self.ctx.config;
        let assets = config.resolve_assets(&self.ctx.installer_dir);
        let archives = ArchiveSet::open(&assets)?;

        if archives.is_empty() {
            return Err(InstallError::fatal("Archives are empty or corrupted"));
        }

        let free = disk::ensure_free_space(self.ctx.install_root(), config.min_required_space_gb)?;
        tracing::info!(
            "Preflight passed: {} entries in {} archive(s), {:.2} GB free",
            archives.total_entries(),
            assets.len(),
            free
        );
        Ok(archives)
    }
}

fn fail(tracker: &mut StageTracker, err: &InstallError) {
    let stage = tracker.current_stage();
    if let Err(e) = tracker.fail() {
        tracing::debug!("Could not record failure: {}", e);
    }
    tracing::error!("Installation failed during {}: {}", stage, err);
}

/// Preflight passed; archives are open and counted.
#[derive(Debug)]
pub struct PreparedInstall {
    ctx: InstallContext,
    tracker: StageTracker,
    archives: ArchiveSet,
}

impl PreparedInstall {
    /// Progress denominator
    pub fn total_entries(&self) -> u64 {
        self.archives.total_entries()
    }

    pub fn context(&self) -> &InstallContext {
        &self.ctx
    }

    /// Run the whole installation on the calling thread.
    pub fn run(self, observer: &mut dyn InstallObserver) -> Result<InstallSummary> {
        Ok(self.begin()?.execute(observer))
    }

    /// Create the install root, then extract and finalize on a worker
    /// thread. The returned handle is the listener side.
    pub fn spawn(self) -> Result<InstallHandle> {
        let running = self.begin()?;
        let total = running.archives.total_entries();
        let (tx, rx) = sync_channel(0);

        let worker = thread::Builder::new()
            .name("install-worker".to_string())
            .spawn(move || running.execute(&mut ChannelObserver::new(tx)))?;

        Ok(InstallHandle { rx, worker, total })
    }

    fn begin(mut self) -> Result<RunningInstall> {
        self.tracker.transition_to(InstallStage::Extracting)?;

        let root = self.ctx.install_root().to_path_buf();
        let canonical = fs::create_dir_all(&root)
            .and_then(|()| fs::canonicalize(&root))
            .map_err(|e| {
                InstallError::fatal(format!(
                    "Failed to create install directory {}: {}",
                    root.display(),
                    e
                ))
            });

        match canonical {
            Ok(root) => Ok(RunningInstall {
                ctx: self.ctx,
                tracker: self.tracker,
                archives: self.archives,
                root,
            }),
            Err(e) => {
                fail(&mut self.tracker, &e);
                Err(e)
            }
        }
    }
}

/// Listener side of a spawned installation
pub struct InstallHandle {
    rx: Receiver<InstallEvent>,
    worker: JoinHandle<InstallSummary>,
    total: u64,
}

impl InstallHandle {
    pub fn total_entries(&self) -> u64 {
        self.total
    }

    /// Events in production order; ends after `Completed`.
    pub fn events(&self) -> EventStream<'_> {
        EventStream::new(&self.rx)
    }

    /// Drain any unread events and wait for the worker.
    pub fn join(self) -> Result<InstallSummary> {
        EventStream::new(&self.rx).for_each(drop);
        self.worker
            .join()
            .map_err(|_| InstallError::fatal("Install worker panicked"))
    }
}

/// Log a problem and surface it to the observer.
fn report(observer: &mut dyn InstallObserver, warnings: &mut Vec<String>, err: InstallError) {
    tracing::warn!("{}", err);
    observer.warning(&err.to_string());
    warnings.push(err.to_string());
}

/// Install root exists; nothing below can fail the run.
struct RunningInstall {
    ctx: InstallContext,
    tracker: StageTracker,
    archives: ArchiveSet,
    /// Canonical install root
    root: PathBuf,
}

impl RunningInstall {
    fn execute(mut self, observer: &mut dyn InstallObserver) -> InstallSummary {
        let total = self.archives.total_entries();
        let mut warnings = Vec::new();

        let mut extracted = 0;
        match self.archives.extract_to(&self.root) {
            Ok(mut extraction) => {
                while let Some(outcome) = extraction.next() {
                    match outcome {
                        EntryOutcome::Rejected { entry, error } => {
                            tracing::debug!("Skipped entry {}", entry);
                            report(observer, &mut warnings, error);
                        }
                        EntryOutcome::Directory(_) | EntryOutcome::File { .. } => {
                            observer.progress(extraction.completed());
                        }
                    }
                }
                extracted = extraction.completed();
            }
            Err(e) => report(observer, &mut warnings, e),
        }
        tracing::info!("Extracted {}/{} entries", extracted, total);

        self.advance(InstallStage::Finalizing);

        let mut quiet = Vec::new();
        self.fix_permissions(&mut quiet);

        if let Err(e) = self.stage_uninstaller() {
            report(observer, &mut warnings, e);
        }

        let (menu_file, desktop_file) = if self.ctx.create_shortcuts {
            match &self.ctx.desktop_dirs {
                Some(dirs) => {
                    let shortcuts = desktop::create_shortcuts(
                        &self.ctx.config,
                        &self.root,
                        &self.ctx.installer_dir,
                        dirs,
                        self.ctx.refresh.as_ref(),
                    );
                    for e in shortcuts.warnings {
                        report(observer, &mut warnings, e);
                    }
                    (shortcuts.menu_file, shortcuts.desktop_file)
                }
                None => {
                    report(
                        observer,
                        &mut warnings,
                        InstallError::finalization("Home directory unknown; shortcuts skipped"),
                    );
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let record = InstallRecord {
            app_name: self.ctx.config.desktop_entry.name.clone(),
            install_path: self.ctx.config.install_path.clone(),
            install_date: Local::now(),
            desktop_file,
            menu_file,
            installer_path: self.ctx.installer_path.clone(),
            installer_dir: self.ctx.installer_dir.clone(),
            uninstaller_path: self.ctx.install_root().join(UNINSTALLER_NAME),
        };

        let manifest_path = match self.ctx.manifest_store().save(&record) {
            Ok(path) => Some(path),
            Err(e) => {
                report(
                    observer,
                    &mut warnings,
                    InstallError::finalization(format!("Failed to save install record: {}", e)),
                );
                None
            }
        };

        self.advance(InstallStage::Done);
        if extracted < total {
            observer.progress(total);
        }
        observer.completed();

        warnings.extend(quiet);
        InstallSummary {
            install_root: self.ctx.config.install_path.clone(),
            total_entries: total,
            extracted,
            warnings,
            manifest_path,
            record,
            stage_history: self.tracker.stage_history().to_vec(),
        }
    }

    fn advance(&mut self, stage: InstallStage) {
        if let Err(e) = self.tracker.transition_to(stage) {
            tracing::error!("Unexpected stage transition: {}", e);
        }
    }

    /// Primary executable first, then the classifier over the configured
    /// directories (or the whole tree). Failures are logged only.
    fn fix_permissions(&self, failures: &mut Vec<String>) {
        let config = &self.ctx.config;

        if !config.exec_path.as_os_str().is_empty() {
            let exec = self.root.join(&config.exec_path);
            tracing::info!("Setting executable permissions on {}", exec.display());
            if let Err(e) = permissions::apply_executable_mode(&exec) {
                tracing::warn!("{}", e);
                failures.push(e.to_string());
            }
        }

        let classifier = ExecutableClassifier::new(&config.app_slug(), &config.exec_patterns);
        let dirs: Vec<PathBuf> = if config.exec_dirs.is_empty() {
            vec![self.root.clone()]
        } else {
            config.exec_dirs.iter().map(|d| self.root.join(d)).collect()
        };

        for dir in dirs {
            tracing::debug!("Scanning {} for executables", dir.display());
            let errors = permissions::make_tree_executable(&dir, &classifier);
            failures.extend(errors.iter().map(ToString::to_string));
        }
    }

    /// Copy `<installer dir>/uninstaller` into the install root.
    fn stage_uninstaller(&self) -> Result<()> {
        let src = self.ctx.installer_dir.join(UNINSTALLER_NAME);
        let dst = self.root.join(UNINSTALLER_NAME);

        fs::copy(&src, &dst).map_err(|e| {
            InstallError::finalization(format!(
                "Failed to copy uninstaller from {}: {}",
                src.display(),
                e
            ))
        })?;
        permissions::apply_executable_mode(&dst)?;

        tracing::info!("Uninstaller staged at {}", dst.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::DesktopEntryConfig;
    use crate::desktop::NoRefresh;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(fs::File::create(path).expect("create"));
        for (name, data) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start");
            writer.write_all(data.as_bytes()).expect("write");
        }
        writer.finish().expect("finish");
    }

    fn context(bundle: &Path, root: PathBuf, assets: Vec<PathBuf>) -> InstallContext {
        let config = InstallationConfig {
            install_path: root,
            game_assets: assets,
            exec_path: PathBuf::from("Game"),
            desktop_entry: DesktopEntryConfig {
                name: "Test Game".to_string(),
                exec: "Game".to_string(),
                entry_type: "Application".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        InstallContext::new(config, bundle.join("installer"))
            .with_shortcuts(false)
            .with_refresh(Box::new(NoRefresh))
    }

    #[test]
    fn test_preflight_fails_on_missing_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("Game");
        let ctx = context(dir.path(), root.clone(), vec![PathBuf::from("missing.zip")]);

        let err = Installer::new(ctx).preflight().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("missing.zip"));
        assert!(!root.exists());
    }

    #[test]
    fn test_preflight_fails_on_empty_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_zip(&dir.path().join("empty.zip"), &[]);
        let root = dir.path().join("Game");
        let ctx = context(dir.path(), root.clone(), vec![PathBuf::from("empty.zip")]);

        let err = Installer::new(ctx).preflight().unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(!root.exists());
    }

    #[test]
    fn test_run_reports_warnings_and_completes() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_zip(
            &dir.path().join("game.zip"),
            &[("Game", "#!/bin/sh\n"), ("../evil", "x"), ("data.pak", "d")],
        );
        let root = dir.path().join("Game Dir");
        let ctx = context(dir.path(), root.clone(), vec![PathBuf::from("game.zip")]);

        let prepared = Installer::new(ctx).preflight().expect("preflight");
        assert_eq!(prepared.total_entries(), 3);

        let mut events: Vec<InstallEvent> = Vec::new();
        let summary = prepared.run(&mut events).expect("run");

        assert_eq!(summary.extracted, 2);
        assert_eq!(events.last(), Some(&InstallEvent::Completed));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, InstallEvent::Completed))
                .count(),
            1
        );
        // Traversal rejection and missing uninstaller are both surfaced
        let warnings: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                InstallEvent::Warning(w) => Some(w.as_str()),
                _ => None,
            })
            .collect();
        assert!(warnings.iter().any(|w| w.contains("Path traversal")));
        assert!(warnings.iter().any(|w| w.contains("uninstaller")));
        // Final progress equals total even though one entry was rejected
        assert!(events.contains(&InstallEvent::Progress(3)));
        assert!(!dir.path().join("evil").exists());
        assert!(summary.manifest_path.expect("manifest").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_sets_primary_executable_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        write_zip(&dir.path().join("game.zip"), &[("Game", "#!/bin/sh\n")]);
        let root = dir.path().join("Installed");
        let ctx = context(dir.path(), root.clone(), vec![PathBuf::from("game.zip")]);

        let mut events: Vec<InstallEvent> = Vec::new();
        Installer::new(ctx)
            .preflight()
            .expect("preflight")
            .run(&mut events)
            .expect("run");

        let mode = fs::metadata(root.join("Game")).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_stage_history_reaches_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_zip(&dir.path().join("game.zip"), &[("readme.txt", "hi")]);
        fs::write(dir.path().join(UNINSTALLER_NAME), b"bin").expect("write");
        let root = dir.path().join("Installed");
        let ctx = context(dir.path(), root.clone(), vec![PathBuf::from("game.zip")]);

        let mut events: Vec<InstallEvent> = Vec::new();
        let summary = Installer::new(ctx)
            .preflight()
            .expect("preflight")
            .run(&mut events)
            .expect("run");

        let stages: Vec<_> = summary.stage_history.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            vec![
                InstallStage::Preflight,
                InstallStage::Extracting,
                InstallStage::Finalizing,
                InstallStage::Done
            ]
        );
        assert!(root.join(UNINSTALLER_NAME).exists());
    }
}
