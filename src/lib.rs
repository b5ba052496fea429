//! Game Pack Installer Library
//!
//! Installs a packaged native game from bundled zip archives, registers it
//! with the desktop, and records what was installed so the companion
//! uninstaller can reverse it.

pub mod cli;
pub mod config_file;
pub mod desktop;
pub mod disk;
pub mod error;
pub mod events;
pub mod extract;
pub mod install_state;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod permissions;
pub mod uninstaller;

// Re-export main types for convenience
pub use config_file::{DesktopEntryConfig, InstallationConfig};
pub use desktop::{DesktopDirs, DesktopRefresh, NoRefresh, SystemRefresh};
pub use error::{InstallError, Result};
pub use events::{InstallEvent, InstallObserver};
pub use install_state::{InstallStage, InstallTransitionError, StageTracker};
pub use installer::{InstallContext, InstallHandle, InstallSummary, Installer, PreparedInstall};
pub use manifest::{InstallRecord, ManifestStore};
pub use permissions::ExecutableClassifier;
pub use uninstaller::{UninstallReport, UninstallStep, Uninstaller};
