//! Executable-bit inference for extracted files
//!
//! Zip archives frequently lose unix modes, so after extraction every file
//! that looks like something a user would launch gets mode `0755`. A file is
//! executable if ANY of these hold:
//!
//! 1. its extension is one of [`EXECUTABLE_EXTENSIONS`] or its base name
//!    has no `.` at all
//! 2. its lowercase base name contains a [`RUN_HINTS`] entry or the app slug
//! 3. its base name matches a configured glob pattern
//!
//! The rules are deliberately loose: an extra chmod costs nothing, a missing
//! one leaves an install that will not start.
//!
//! The mode is set, not merged: `0755` replaces whatever bits the file had.
//! A stricter policy would OR the execute bits into the existing mode.

use crate::error::{InstallError, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Extensions (lowercase, with the dot) treated as executable.
/// The empty string stands for "no `.` in the base name".
pub const EXECUTABLE_EXTENSIONS: &[&str] = &[".sh", ".bin", ".x86", ".x86_64", ""];

/// Base-name substrings that suggest a launcher.
pub const RUN_HINTS: &[&str] = &["run", "start", "game"];

/// Mode applied to everything classified as executable
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Decides which extracted files must become executable.
#[derive(Debug, Clone)]
pub struct ExecutableClassifier {
    app_slug: String,
    patterns: Vec<glob::Pattern>,
}

impl ExecutableClassifier {
    /// Build a classifier. Invalid patterns are skipped with a warning.
    pub fn new<S: AsRef<str>>(app_slug: &str, patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("Ignoring invalid executable pattern {:?}: {}", p.as_ref(), e);
                    None
                }
            })
            .collect();

        Self {
            app_slug: app_slug.to_lowercase(),
            patterns,
        }
    }

    /// Returns true if the file at `path` should be made executable.
    pub fn is_executable(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        if EXECUTABLE_EXTENSIONS.contains(&extension_of(&file_name).as_str()) {
            return true;
        }

        let lower = file_name.to_lowercase();
        if RUN_HINTS.iter().any(|hint| lower.contains(hint)) {
            return true;
        }
        if !self.app_slug.is_empty() && lower.contains(&self.app_slug) {
            return true;
        }

        self.patterns.iter().any(|p| p.matches(&file_name))
    }
}

/// Base name from its last `.` onwards (dot included), lowercased.
///
/// Unlike [`Path::extension`], a leading dot (`.hidden`) or a trailing dot
/// (`notes.` gives `.`) counts as an extension, so neither reads as "none".
fn extension_of(file_name: &str) -> String {
    match file_name.rfind('.') {
        None => String::new(),
        Some(idx) => file_name[idx..].to_lowercase(),
    }
}

/// Set the fixed executable mode on one file.
#[cfg(unix)]
pub fn apply_executable_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(EXECUTABLE_MODE)).map_err(|e| {
        InstallError::finalization(format!(
            "Failed to set executable permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
pub fn apply_executable_mode(path: &Path) -> Result<()> {
    fs::metadata(path).map(|_| ()).map_err(|e| {
        InstallError::finalization(format!("Cannot access {}: {}", path.display(), e))
    })
}

/// Walk `dir` and apply the executable mode to every classified file.
///
/// Unreadable entries are skipped. Returns the failures so the caller can
/// surface them; a failure never stops the walk.
pub fn make_tree_executable(dir: &Path, classifier: &ExecutableClassifier) -> Vec<InstallError> {
    let mut failures = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if classifier.is_executable(path) {
            tracing::debug!("Setting executable permissions on {}", path.display());
            if let Err(e) = apply_executable_mode(path) {
                tracing::warn!("{}", e);
                failures.push(e);
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ExecutableClassifier {
        ExecutableClassifier::new("celeste", &["*.AppImage"])
    }

    #[test]
    fn test_extension_rule() {
        let c = classifier();
        assert!(c.is_executable(Path::new("/g/launch.sh")));
        assert!(c.is_executable(Path::new("/g/engine.bin")));
        assert!(c.is_executable(Path::new("/g/lib/engine.X86_64")));
        assert!(c.is_executable(Path::new("/g/engine.x86")));
        assert!(c.is_executable(Path::new("/g/Engine")));
    }

    #[test]
    fn test_dotfiles_and_trailing_dot_have_an_extension() {
        let c = classifier();
        assert!(!c.is_executable(Path::new("/g/.hidden")));
        assert!(!c.is_executable(Path::new("/g/notes.")));
        assert!(c.is_executable(Path::new("/g/.launch.sh")));
        assert_eq!(extension_of("Engine"), "");
        assert_eq!(extension_of("notes."), ".");
        assert_eq!(extension_of(".hidden"), ".hidden");
        assert_eq!(extension_of("engine.X86_64"), ".x86_64");
    }

    #[test]
    fn test_name_hint_rule() {
        let c = classifier();
        assert!(c.is_executable(Path::new("/g/RunMe.txt")));
        assert!(c.is_executable(Path::new("/g/start-server.py")));
        assert!(c.is_executable(Path::new("/g/gamedata.dat")));
        assert!(c.is_executable(Path::new("/g/Celeste.exe")));
    }

    #[test]
    fn test_configured_pattern_rule() {
        let c = classifier();
        assert!(c.is_executable(Path::new("/g/Tool.AppImage")));
        assert!(!classifier_without_patterns().is_executable(Path::new("/g/Tool.AppImage")));
    }

    fn classifier_without_patterns() -> ExecutableClassifier {
        ExecutableClassifier::new::<&str>("celeste", &[])
    }

    #[test]
    fn test_plain_files_are_not_executable() {
        let c = classifier();
        assert!(!c.is_executable(Path::new("/g/readme.txt")));
        assert!(!c.is_executable(Path::new("/g/Content/atlas.png")));
        assert!(!c.is_executable(Path::new("/g/lib/libSDL2.so")));
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let c = ExecutableClassifier::new("x", &["[oops", "*.pak2"]);
        assert!(c.is_executable(Path::new("/g/a.pak2")));
        assert!(!c.is_executable(Path::new("/g/readme.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_make_tree_executable_sets_fixed_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).expect("mkdir");
        fs::write(bin.join("launch.sh"), "#!/bin/sh\n").expect("write");
        fs::write(bin.join("readme.txt"), "hi").expect("write");
        fs::set_permissions(bin.join("launch.sh"), fs::Permissions::from_mode(0o600))
            .expect("chmod");
        fs::set_permissions(bin.join("readme.txt"), fs::Permissions::from_mode(0o600))
            .expect("chmod");

        let failures = make_tree_executable(dir.path(), &classifier());
        assert!(failures.is_empty());

        let mode = |p: &Path| fs::metadata(p).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode(&bin.join("launch.sh")), 0o755);
        assert_eq!(mode(&bin.join("readme.txt")), 0o600);
    }

    #[test]
    fn test_make_tree_executable_missing_dir() {
        let failures = make_tree_executable(Path::new("/definitely/not/here"), &classifier());
        assert!(failures.is_empty());
    }
}
