//! Desktop menu integration
//!
//! Renders freedesktop `.desktop` entries for the installed application,
//! writes them to the user's applications menu and desktop, and pokes the
//! desktop environment so the new entries show up.
//!
//! Everything the desktop environment does in response is best-effort: the
//! [`DesktopRefresh`] capability swallows failures after logging them, and
//! [`NoRefresh`] skips the external commands entirely.

use crate::config_file::{DesktopEntryConfig, InstallationConfig};
use crate::error::InstallError;
use crate::permissions::apply_executable_mode;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Desktop folder names tried in order (canonical first, then localized)
pub const DESKTOP_DIR_NAMES: &[&str] = &["Desktop", "Рабочий стол"];

/// Well-known per-user desktop directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopDirs {
    home: PathBuf,
}

impl DesktopDirs {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Directories for the current user, if a home directory is known
    pub fn from_environment() -> Option<Self> {
        home::home_dir().map(Self::new)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `~/.local/share/applications`
    pub fn applications_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("applications")
    }

    /// `~/.local/share/icons`
    pub fn icons_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("icons")
    }

    /// First existing desktop folder, if any
    pub fn desktop_dir(&self) -> Option<PathBuf> {
        DESKTOP_DIR_NAMES
            .iter()
            .map(|name| self.home.join(name))
            .find(|dir| dir.is_dir())
    }
}

/// Side effects that make the desktop environment notice new or removed
/// entries. Implementations must never fail the caller.
pub trait DesktopRefresh: Send {
    /// Mark a shortcut as trusted so it can be launched from the desktop
    fn trust_shortcut(&self, shortcut: &Path);

    /// Rebuild the icon cache and desktop database
    fn refresh_caches(&self, dirs: &DesktopDirs);
}

/// Runs `gio`, `gtk-update-icon-cache` and `update-desktop-database`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRefresh;

/// Skips all external commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

impl SystemRefresh {
    fn run(program: &str, args: &[&str]) {
        tracing::debug!("Running {} {:?}", program, args);
        match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!("{} exited with {}", program, status),
            Err(e) => tracing::warn!("Failed to run {}: {}", program, e),
        }
    }
}

impl DesktopRefresh for SystemRefresh {
    fn trust_shortcut(&self, shortcut: &Path) {
        let path = shortcut.to_string_lossy().into_owned();
        // GNOME derivatives accept either spelling depending on version
        Self::run("gio", &["set", path.as_str(), "metadata::trusted", "yes"]);
        Self::run("gio", &["set", path.as_str(), "metadata::trusted", "true"]);
    }

    fn refresh_caches(&self, dirs: &DesktopDirs) {
        let icons = dirs.icons_dir().to_string_lossy().into_owned();
        let apps = dirs.applications_dir().to_string_lossy().into_owned();
        Self::run("gtk-update-icon-cache", &["-f", "-t", icons.as_str()]);
        Self::run("update-desktop-database", &[apps.as_str()]);
    }
}

impl DesktopRefresh for NoRefresh {
    fn trust_shortcut(&self, _shortcut: &Path) {}

    fn refresh_caches(&self, _dirs: &DesktopDirs) {}
}

/// Absolute launcher path: relative `exec` values live in the install root.
pub fn resolve_exec(entry: &DesktopEntryConfig, install_root: &Path) -> PathBuf {
    let exec = Path::new(&entry.exec);
    if exec.is_absolute() {
        exec.to_path_buf()
    } else {
        install_root.join(exec)
    }
}

/// Pick the icon for the entry.
///
/// The desktop-entry icon is relative to the install root; the top-level
/// `icon_path` is relative to the installer directory. If the chosen file
/// is missing, a few conventional names in the install root are probed.
pub fn resolve_icon(
    config: &InstallationConfig,
    install_root: &Path,
    installer_dir: &Path,
) -> Option<PathBuf> {
    let entry_icon = Path::new(&config.desktop_entry.icon);
    let icon = if !config.desktop_entry.icon.is_empty() {
        if entry_icon.is_absolute() {
            entry_icon.to_path_buf()
        } else {
            install_root.join(entry_icon)
        }
    } else if !config.icon_path.as_os_str().is_empty() {
        if config.icon_path.is_absolute() {
            config.icon_path.clone()
        } else {
            installer_dir.join(&config.icon_path)
        }
    } else {
        return None;
    };

    if icon.exists() {
        return Some(icon);
    }

    tracing::warn!("Icon file not found: {}", icon.display());
    let name = &config.desktop_entry.name;
    let candidates = [
        "icon.png".to_string(),
        "Icon.png".to_string(),
        format!("{}.png", config.app_slug()),
        format!("{}.png", name),
    ];
    match candidates
        .iter()
        .map(|c| install_root.join(c))
        .find(|p| p.is_file())
    {
        Some(found) => {
            tracing::info!("Using fallback icon {}", found.display());
            Some(found)
        }
        // Keep the configured path; the desktop may still resolve it later
        None => Some(icon),
    }
}

/// Render the text of a `.desktop` file.
pub fn render_desktop_entry(entry: &DesktopEntryConfig, exec: &Path, icon: Option<&Path>) -> String {
    let mut content = String::from("[Desktop Entry]\n");
    content.push_str(&format!("Type={}\n", entry.entry_type));
    content.push_str(&format!("Name={}\n", entry.name));
    content.push_str(&format!("Exec=\"{}\"\n", exec.display()));
    if let Some(icon) = icon {
        content.push_str(&format!("Icon={}\n", icon.display()));
    }
    content.push_str(&format!("Terminal={}\n", entry.terminal));
    if !entry.categories.is_empty() {
        content.push_str(&format!("Categories={}\n", entry.categories));
    }
    if !entry.comment.is_empty() {
        content.push_str(&format!("Comment={}\n", entry.comment));
    }
    content.push_str("Version=1.0\n");
    content.push_str("StartupNotify=true\n");
    content.push_str(&format!("StartupWMClass={}\n", entry.name));
    content
}

/// Shortcuts that were actually written
#[derive(Debug, Default)]
pub struct Shortcuts {
    pub menu_file: Option<PathBuf>,
    pub desktop_file: Option<PathBuf>,
    pub warnings: Vec<InstallError>,
}

/// Write the menu shortcut and, if a desktop folder exists, a desktop
/// shortcut. Failures are collected, never returned.
pub fn create_shortcuts(
    config: &InstallationConfig,
    install_root: &Path,
    installer_dir: &Path,
    dirs: &DesktopDirs,
    refresh: &dyn DesktopRefresh,
) -> Shortcuts {
    let mut shortcuts = Shortcuts::default();
    let file_name = format!("{}.desktop", config.app_slug());

    let exec = resolve_exec(&config.desktop_entry, install_root);
    let icon = resolve_icon(config, install_root, installer_dir);
    let content = render_desktop_entry(&config.desktop_entry, &exec, icon.as_deref());

    let menu_dir = dirs.applications_dir();
    let menu_file = menu_dir.join(&file_name);
    match write_shortcut(&menu_dir, &menu_file, &content) {
        Ok(()) => {
            tracing::info!("Menu shortcut created: {}", menu_file.display());
            refresh.trust_shortcut(&menu_file);
            refresh.refresh_caches(dirs);
            shortcuts.menu_file = Some(menu_file);
        }
        Err(e) => {
            let err = InstallError::finalization(format!(
                "Failed to create application menu shortcut: {}",
                e
            ));
            tracing::warn!("{}", err);
            shortcuts.warnings.push(err);
        }
    }

    if let Some(desktop_dir) = dirs.desktop_dir() {
        let desktop_file = desktop_dir.join(&file_name);
        match write_shortcut(&desktop_dir, &desktop_file, &content) {
            Ok(()) => {
                tracing::info!("Desktop shortcut created: {}", desktop_file.display());
                refresh.trust_shortcut(&desktop_file);
                shortcuts.desktop_file = Some(desktop_file);
            }
            Err(e) => {
                let err = InstallError::finalization(format!(
                    "Failed to create desktop shortcut: {}",
                    e
                ));
                tracing::warn!("{}", err);
                shortcuts.warnings.push(err);
            }
        }
    }

    shortcuts
}

fn write_shortcut(dir: &Path, file: &Path, content: &str) -> crate::error::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(file, content)?;
    apply_executable_mode(file)
}
