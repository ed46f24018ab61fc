//! Configuration types for SnapGif

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Loop behavior written into the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// No loop extension block at all
    Disabled,
    /// Loop forever
    Infinite,
    /// Play N additional times after the first
    Finite(u16),
}

impl Repeat {
    /// Interpret a loop count: negative disables, zero is infinite
    pub fn from_count(count: i32) -> Self {
        match count {
            c if c < 0 => Repeat::Disabled,
            0 => Repeat::Infinite,
            c => Repeat::Finite(c.min(u16::MAX as i32) as u16),
        }
    }
}

/// Scheduling priority requested for encode worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerPriority {
    Lowest,
    #[default]
    BelowNormal,
    Normal,
    AboveNormal,
    Highest,
}

impl WorkerPriority {
    /// Unix nice value for this priority
    pub fn nice_value(&self) -> i32 {
        match self {
            WorkerPriority::Lowest => 19,
            WorkerPriority::BelowNormal => 10,
            WorkerPriority::Normal => 0,
            WorkerPriority::AboveNormal => -5,
            WorkerPriority::Highest => -10,
        }
    }
}

impl std::str::FromStr for WorkerPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lowest" => Ok(WorkerPriority::Lowest),
            "below-normal" | "low" => Ok(WorkerPriority::BelowNormal),
            "normal" => Ok(WorkerPriority::Normal),
            "above-normal" | "high" => Ok(WorkerPriority::AboveNormal),
            "highest" => Ok(WorkerPriority::Highest),
            _ => Err(format!(
                "Invalid priority: {}. Use: lowest, below-normal, normal, above-normal, highest",
                s
            )),
        }
    }
}

pub const MAX_FPS: u32 = 120;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Main configuration for a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Capture frame rate
    pub fps: u32,
    /// Quantizer sampling interval, 1 (best) to 100 (fastest)
    pub quality: u8,
    /// Loop count: -1 = no loop block, 0 = infinite, N = N extra plays
    pub repeat: i32,
    /// Seconds captured after a snap request
    pub buffer_seconds: f32,
    /// Seconds of history kept for longpress snaps
    pub longpress_seconds: f32,
    /// Encode worker thread priority
    pub worker_priority: WorkerPriority,
    /// Directory receiving generated files
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 200,
            fps: 15,
            quality: 15,
            repeat: 0,
            buffer_seconds: 3.0,
            longpress_seconds: 2.0,
            worker_priority: WorkerPriority::BelowNormal,
            output_dir: PathBuf::from("."),
        }
    }
}

impl CaptureConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: CaptureConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder pattern: set width
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    /// Builder pattern: set height
    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    /// Builder pattern: set frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Builder pattern: set quantizer quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Builder pattern: set loop count
    pub fn with_repeat(mut self, repeat: i32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Builder pattern: set capture window length
    pub fn with_buffer_seconds(mut self, seconds: f32) -> Self {
        self.buffer_seconds = seconds;
        self
    }

    /// Builder pattern: set longpress lookback length
    pub fn with_longpress_seconds(mut self, seconds: f32) -> Self {
        self.longpress_seconds = seconds;
        self
    }

    /// Builder pattern: set worker priority
    pub fn with_worker_priority(mut self, priority: WorkerPriority) -> Self {
        self.worker_priority = priority;
        self
    }

    /// Builder pattern: set output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Check every bound, rejecting out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width > u16::MAX as u32 {
            return Err(Error::config(format!(
                "width must be in 1..={}, got {}",
                u16::MAX,
                self.width
            )));
        }
        if self.height == 0 || self.height > u16::MAX as u32 {
            return Err(Error::config(format!(
                "height must be in 1..={}, got {}",
                u16::MAX,
                self.height
            )));
        }
        validate_fps(self.fps)?;
        validate_quality(self.quality)?;
        validate_repeat(self.repeat)?;
        if !(self.buffer_seconds.is_finite() && self.buffer_seconds > 0.0) {
            return Err(Error::config(format!(
                "buffer_seconds must be positive, got {}",
                self.buffer_seconds
            )));
        }
        if !(self.longpress_seconds.is_finite() && self.longpress_seconds >= 0.0) {
            return Err(Error::config(format!(
                "longpress_seconds must be zero or positive, got {}",
                self.longpress_seconds
            )));
        }
        Ok(())
    }

    /// Loop behavior for output files
    pub fn repeat_mode(&self) -> Repeat {
        Repeat::from_count(self.repeat)
    }

    /// Frames captured after a snap request
    pub fn capture_window_frames(&self) -> usize {
        ((self.fps as f32 * self.buffer_seconds).round() as usize).max(1)
    }

    /// Frames of history retained for longpress snaps
    pub fn lookback_frames(&self) -> usize {
        (self.fps as f32 * self.longpress_seconds).round() as usize
    }

    /// Capacity of the frame ring buffer
    pub fn ring_capacity(&self) -> usize {
        self.capture_window_frames() + self.lookback_frames()
    }

    /// Delay between frames in milliseconds
    pub fn frame_delay_ms(&self) -> u32 {
        1000 / self.fps.max(1)
    }

    /// Calculate bytes per RGB frame
    pub fn frame_size_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Upper bound of memory held by the ring buffer, in megabytes
    pub fn estimated_memory_mb(&self) -> f32 {
        (self.ring_capacity() * self.frame_size_bytes()) as f32 / (1024.0 * 1024.0)
    }
}

pub fn validate_fps(fps: u32) -> Result<()> {
    if fps == 0 || fps > MAX_FPS {
        return Err(Error::config(format!(
            "fps must be in 1..={}, got {}",
            MAX_FPS, fps
        )));
    }
    Ok(())
}

pub fn validate_quality(quality: u8) -> Result<()> {
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(Error::config(format!(
            "quality must be in {}..={}, got {}",
            MIN_QUALITY, MAX_QUALITY, quality
        )));
    }
    Ok(())
}

pub fn validate_repeat(repeat: i32) -> Result<()> {
    if repeat < -1 || repeat > u16::MAX as i32 {
        return Err(Error::config(format!(
            "repeat must be -1 (no loop), 0 (infinite) or a count up to {}, got {}",
            u16::MAX,
            repeat
        )));
    }
    Ok(())
}
