//! Progress, warning and completion notifications
//!
//! The installer reports through an [`InstallObserver`]. When the run happens
//! on a worker thread the observer is a [`ChannelObserver`] feeding a
//! rendezvous channel (`sync_channel(0)`): every send blocks until the
//! listener takes it, so events arrive in exactly the order they were
//! produced and `Completed` is always last.

use std::sync::mpsc::{Receiver, SyncSender};

/// One notification from an installation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// Entries extracted so far (strictly increasing)
    Progress(u64),
    /// A recoverable or non-fatal problem
    Warning(String),
    /// Sent exactly once, after everything else
    Completed,
}

/// Receives notifications from an installation run.
pub trait InstallObserver {
    fn progress(&mut self, completed: u64);
    fn warning(&mut self, message: &str);
    fn completed(&mut self);
}

/// Records every event in order. Handy for tests and headless runs.
impl InstallObserver for Vec<InstallEvent> {
    fn progress(&mut self, completed: u64) {
        self.push(InstallEvent::Progress(completed));
    }

    fn warning(&mut self, message: &str) {
        self.push(InstallEvent::Warning(message.to_string()));
    }

    fn completed(&mut self) {
        self.push(InstallEvent::Completed);
    }
}

/// Forwards events over a channel to a listener on another thread.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: SyncSender<InstallEvent>,
}

impl ChannelObserver {
    pub fn new(tx: SyncSender<InstallEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: InstallEvent) {
        // A listener that went away must not abort the install
        if self.tx.send(event).is_err() {
            tracing::debug!("Install listener disconnected; event dropped");
        }
    }
}

impl InstallObserver for ChannelObserver {
    fn progress(&mut self, completed: u64) {
        self.send(InstallEvent::Progress(completed));
    }

    fn warning(&mut self, message: &str) {
        self.send(InstallEvent::Warning(message.to_string()));
    }

    fn completed(&mut self) {
        self.send(InstallEvent::Completed);
    }
}

/// Listener side: yields events until `Completed` has been delivered.
pub struct EventStream<'a> {
    rx: &'a Receiver<InstallEvent>,
    finished: bool,
}

impl<'a> EventStream<'a> {
    pub fn new(rx: &'a Receiver<InstallEvent>) -> Self {
        Self { rx, finished: false }
    }
}

impl Iterator for EventStream<'_> {
    type Item = InstallEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.rx.recv() {
            Ok(event) => {
                self.finished = event == InstallEvent::Completed;
                Some(event)
            }
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}
