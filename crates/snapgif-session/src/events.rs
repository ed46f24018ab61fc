//! Event delivery from encode workers to the session thread
//!
//! Workers never call into listener code. They push events onto an unbounded
//! queue which the session controller drains once per tick on its own thread.

use std::path::PathBuf;
use tokio::sync::mpsc;

/// Identifier of an encode job
pub type JobId = u64;

/// Events surfaced to whoever drives the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Encoding progress in `0.0..=1.0`
    Progress { job: JobId, fraction: f32 },
    /// A file was fully written
    Completed { job: JobId, path: PathBuf },
    /// A job gave up; no file is left behind
    Failed { job: JobId, error: String },
    /// Capture drained after a stop and no job remains
    SessionStopped,
}

impl SessionEvent {
    /// The job this event belongs to, if any
    pub fn job(&self) -> Option<JobId> {
        match self {
            SessionEvent::Progress { job, .. }
            | SessionEvent::Completed { job, .. }
            | SessionEvent::Failed { job, .. } => Some(*job),
            SessionEvent::SessionStopped => None,
        }
    }

    /// True when the job will send nothing further
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Completed { .. } | SessionEvent::Failed { .. }
        )
    }
}

/// Sending half held by worker threads
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn send(&self, event: SessionEvent) {
        // The controller is gone; nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Receiving half owned by the session controller
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventQueue {
    pub fn channel() -> (EventSender, EventQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, EventQueue { rx })
    }

    /// Take every event queued so far without blocking
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
