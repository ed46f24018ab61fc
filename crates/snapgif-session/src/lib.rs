//! SnapGif Session - capture scheduling and background encoding
//!
//! This crate provides:
//! - the [`SessionController`] driving capture and the job queue
//! - encode jobs running on dedicated worker threads
//! - the shared captured-frame list workers read from
//! - event delivery back to the session thread

pub mod controller;
pub mod events;
pub mod frames;
pub mod job;

pub use controller::{SessionController, SessionState};
pub use events::{EventQueue, EventSender, JobId, SessionEvent};
pub use frames::{CapturedFrames, ReadResult};
pub use job::{spawn_worker, EncodeJob, WorkerContext, WorkerHandle};
