//! SnapGif Core - Shared types and configuration
//!
//! This crate provides the foundational types used across all SnapGif components.

pub mod config;
pub mod error;
pub mod frame;

pub use config::{CaptureConfig, Repeat, WorkerPriority};
pub use error::{Error, Result};
pub use frame::{Frame, PixelFormat, RawPixels};
