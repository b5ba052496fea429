//! Install State Machine
//!
//! Tracks where one installation run is and refuses transitions that would
//! skip a stage or leave a terminal state.
//!
//! # Stage Flow
//!
//! ```text
//! Idle
//!   ↓
//! Preflight    ──→ Failed
//!   ↓
//! Extracting   ──→ Failed
//!   ↓
//! Finalizing
//!   ↓
//! Done
//! ```
//!
//! Only `Preflight` and `Extracting` may fail. Everything that goes wrong
//! during `Finalizing` is reported as a warning and the run still reaches
//! `Done`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Installation stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    /// Nothing has happened yet
    Idle = 0,

    /// Archives opened and counted, free space checked
    Preflight = 1,

    /// Install root created, archive members being written
    Extracting = 2,

    /// Permissions, uninstaller staging, shortcuts, manifest
    Finalizing = 3,

    /// Completed (terminal state)
    Done = 4,

    /// Fatal error during preflight or extraction setup (terminal state)
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Done or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if a fatal error may move this stage to `Failed`
    #[inline]
    pub const fn can_fail(self) -> bool {
        matches!(self, Self::Preflight | Self::Extracting)
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Preflight),
            Self::Preflight => Some(Self::Extracting),
            Self::Extracting => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Preflight => "Running preflight checks",
            Self::Extracting => "Extracting archives",
            Self::Finalizing => "Finalizing installation",
            Self::Done => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    /// Returns all stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Idle,
            Self::Preflight,
            Self::Extracting,
            Self::Finalizing,
            Self::Done,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: InstallStage,
        to: InstallStage,
    },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    /// Attempted to fail from a stage that has no fatal errors
    #[error("Stage {stage} cannot fail")]
    CannotFail { stage: InstallStage },
}

/// Owns the current stage of one installation run.
///
/// # Example
///
/// ```
/// use gamepack::install_state::{InstallStage, StageTracker};
///
/// let mut tracker = StageTracker::new();
/// tracker.advance().unwrap();
/// assert_eq!(tracker.current_stage(), InstallStage::Preflight);
///
/// // Cannot skip stages
/// assert!(tracker.transition_to(InstallStage::Finalizing).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: InstallStage,

    /// Stage at which failure occurred (if any)
    failed_at: Option<InstallStage>,

    /// (stage, unix timestamp) for every transition
    stage_history: Vec<(InstallStage, u64)>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: InstallStage::Idle,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.current == InstallStage::Done
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == InstallStage::Failed
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// Advance to the next stage in sequence.
    pub fn advance(&mut self) -> Result<InstallStage, InstallTransitionError> {
        let next_stage = self
            .current
            .next()
            .ok_or(InstallTransitionError::FromTerminalState { from: self.current })?;

        self.record(next_stage);
        Ok(next_stage)
    }

    /// Transition to `target`, which must be the immediate next stage.
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.record(target);
        Ok(target)
    }

    /// Mark the run as failed. Only `Preflight` and `Extracting` can fail.
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if !self.current.can_fail() {
            return Err(InstallTransitionError::CannotFail {
                stage: self.current,
            });
        }

        self.failed_at = Some(self.current);
        self.record(InstallStage::Failed);
        Ok(())
    }

    fn record(&mut self, stage: InstallStage) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        tracing::info!("Install stage: {} -> {}", self.current, stage);
        self.stage_history.push((stage, timestamp));
        self.current = stage;
    }
}

impl From<InstallTransitionError> for crate::error::InstallError {
    fn from(err: InstallTransitionError) -> Self {
        crate::error::InstallError::InstallTransition(err.to_string())
    }
}
