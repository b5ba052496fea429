//! Error handling for the installer engine
//!
//! Errors are grouped by how far they are allowed to travel:
//!
//! - **Fatal**: abort the run before destination state is touched
//!   (bad configuration, unreadable archives, no space, no install root)
//! - **Recoverable**: a single archive entry failed; extraction continues
//! - **Non-fatal**: a finalization step failed; the run still completes
//! - **Malformed manifest**: only the manifest being loaded is affected

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for installation and uninstallation
#[derive(Error, Debug)]
pub enum InstallError {
    /// Configuration, archive-open, empty-archive, disk-space or
    /// install-root failures
    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),

    /// A single entry could not be opened, created or copied
    #[error("Extraction error: {0}")]
    RecoverableExtraction(String),

    /// An archive entry resolved outside the destination root
    #[error("Path traversal rejected: '{entry}' resolves to '{}'", resolved.display())]
    PathTraversal { entry: String, resolved: PathBuf },

    /// Permission fixup, uninstaller staging, shortcut or refresh failures
    #[error("Finalization error: {0}")]
    NonFatalFinalization(String),

    /// Manifest missing or unparsable
    #[error("Malformed manifest {}: {reason}", path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    /// Install state machine transition errors
    #[error("Install transition error: {0}")]
    InstallTransition(String),

    /// IO errors not attributable to a more specific category
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallError>;

impl InstallError {
    /// Create a fatal configuration error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalConfig(msg.into())
    }

    /// Create a recoverable extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::RecoverableExtraction(msg.into())
    }

    /// Create a non-fatal finalization error
    pub fn finalization(msg: impl Into<String>) -> Self {
        Self::NonFatalFinalization(msg.into())
    }

    /// Create a malformed manifest error
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MalformedManifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error must abort the current run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalConfig(_) | Self::InstallTransition(_) | Self::Io(_) | Self::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstallError::fatal("archive is empty");
        assert_eq!(err.to_string(), "Fatal configuration error: archive is empty");

        let err = InstallError::PathTraversal {
            entry: "../../etc/passwd".to_string(),
            resolved: PathBuf::from("/etc/passwd"),
        };
        assert_eq!(
            err.to_string(),
            "Path traversal rejected: '../../etc/passwd' resolves to '/etc/passwd'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: InstallError = io_err.into();
        assert!(matches!(err, InstallError::Io(_)));
    }

    #[test]
    fn test_fatality_classification() {
        assert!(InstallError::fatal("no space").is_fatal());
        assert!(!InstallError::extraction("copy failed").is_fatal());
        assert!(!InstallError::finalization("chmod failed").is_fatal());
        assert!(!InstallError::malformed("/tmp/x-install.json", "eof").is_fatal());
    }
}
