//! SnapGif - rolling frame capture with background GIF encoding
//!
//! Captures a procedural animation into a rolling buffer and saves
//! snapshots of it as animated GIFs without stalling the capture loop.

use anyhow::Result;
use clap::Parser;
use snapgif_capture::SyntheticSource;
use snapgif_core::{CaptureConfig, WorkerPriority};
use snapgif_session::{JobId, SessionController, SessionEvent};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// SnapGif - capture the last few seconds as an animated GIF
#[derive(Parser, Debug)]
#[command(name = "snapgif")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame width in pixels
    #[arg(short = 'W', long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Capture frame rate
    #[arg(short, long)]
    fps: Option<u32>,

    /// Quantizer sampling factor (1 = best, 100 = fastest)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Loop count: -1 plays once, 0 loops forever, N repeats N more times
    #[arg(short, long, allow_negative_numbers = true)]
    repeat: Option<i32>,

    /// Seconds captured after each snap
    #[arg(long)]
    buffer_seconds: Option<f32>,

    /// Seconds of history kept for longpress snaps
    #[arg(long)]
    longpress_seconds: Option<f32>,

    /// Encode worker priority (lowest, below-normal, normal, above-normal, highest)
    #[arg(long)]
    priority: Option<String>,

    /// Directory the GIF files are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of snaps to take
    #[arg(short, long, default_value = "1")]
    snaps: usize,

    /// Include buffered history in each snap
    #[arg(short, long)]
    longpress: bool,

    /// Also save the frames already buffered when the snaps are requested
    #[arg(long)]
    save_buffered: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn capture_config(&self) -> Result<CaptureConfig> {
        let mut config = match &self.config {
            Some(path) => CaptureConfig::from_json_file(path)?,
            None => CaptureConfig::new(),
        };

        if let Some(width) = self.width {
            config = config.with_width(width);
        }
        if let Some(height) = self.height {
            config = config.with_height(height);
        }
        if let Some(fps) = self.fps {
            config = config.with_fps(fps);
        }
        if let Some(quality) = self.quality {
            config = config.with_quality(quality);
        }
        if let Some(repeat) = self.repeat {
            config = config.with_repeat(repeat);
        }
        if let Some(seconds) = self.buffer_seconds {
            config = config.with_buffer_seconds(seconds);
        }
        if let Some(seconds) = self.longpress_seconds {
            config = config.with_longpress_seconds(seconds);
        }
        if let Some(priority) = &self.priority {
            let priority: WorkerPriority = priority
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            config = config.with_worker_priority(priority);
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("SnapGif v{}", env!("CARGO_PKG_VERSION"));

    let config = args.capture_config()?;
    std::fs::create_dir_all(&config.output_dir)?;

    let source = SyntheticSource::new(config.width, config.height);
    let warmup_frames = config.ring_capacity() as u64;
    let fps = config.fps;
    let mut session = SessionController::new(config, source)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    let mut outstanding: HashSet<JobId> = HashSet::new();
    let mut requested = false;
    let mut failures = 0usize;
    let mut interrupted = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c, if !interrupted => {
                info!("Interrupted, finishing the active job...");
                interrupted = true;
                requested = true;
                outstanding.clear();
                session.stop();
                continue;
            }
        }

        let now = Instant::now();
        let events = session.tick(now - last_tick);
        last_tick = now;

        if !requested && session.next_frame_id() >= warmup_frames {
            requested = true;
            info!(
                "Buffer warm ({} frames), requesting {} snap(s)",
                session.buffered_frames(),
                args.snaps
            );
            if args.save_buffered {
                if let Some(job) = session.save_buffered(None)? {
                    outstanding.insert(job);
                }
            }
            for _ in 0..args.snaps {
                let job = if args.longpress {
                    session.snap_longpress(None)?
                } else {
                    session.snap(None)?
                };
                outstanding.insert(job);
            }
        }

        for event in events {
            match event {
                SessionEvent::Progress { job, fraction } => {
                    debug!("Job {}: {:.0}%", job, fraction * 100.0);
                }
                SessionEvent::Completed { job, path } => {
                    info!("Job {} saved {}", job, path.display());
                    outstanding.remove(&job);
                }
                SessionEvent::Failed { job, error } => {
                    error!("Job {} failed: {}", job, error);
                    outstanding.remove(&job);
                    failures += 1;
                }
                SessionEvent::SessionStopped => {
                    if session.capture_failures() > 0 {
                        warn!("{} captures were dropped", session.capture_failures());
                    }
                    info!("Session stopped");
                    if failures > 0 {
                        anyhow::bail!("{} encode job(s) failed", failures);
                    }
                    return Ok(());
                }
            }
        }

        if requested && outstanding.is_empty() {
            session.stop();
        }
    }
}
