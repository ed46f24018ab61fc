//! Session Controller
//!
//! Drives periodic capture into the frame ring, queues encode jobs and runs
//! them one at a time on worker threads. Everything here happens on the thread
//! that calls [`SessionController::tick`]; workers only talk back through the
//! event queue.

use crate::events::{EventQueue, EventSender, JobId, SessionEvent};
use crate::frames::CapturedFrames;
use crate::job::{spawn_worker, EncodeJob, WorkerContext, WorkerHandle};
use snapgif_capture::{FrameRing, FrameSource, Readback, ReadbackStatus};
use snapgif_core::config::{validate_fps, validate_quality, validate_repeat};
use snapgif_core::{CaptureConfig, Error, Frame, PixelFormat, RawPixels, Result};
use snapgif_encoder::EncoderSettings;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Readbacks allowed in flight while recording
const MAX_IN_FLIGHT: usize = 3;

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Recording,
    /// Periodic capture suspended; frames owed to jobs are still grabbed
    Paused,
    /// Draining the active job after a stop
    Stopping,
    Stopped,
}

struct ActiveJob {
    job: EncodeJob,
    worker: WorkerHandle,
}

/// Owns capture scheduling and the encode job queue
pub struct SessionController {
    config: CaptureConfig,
    source: Box<dyn FrameSource>,
    ring: FrameRing,
    frames: CapturedFrames,
    next_frame_id: Arc<AtomicU64>,
    next_job_id: JobId,
    pending: VecDeque<EncodeJob>,
    active: Option<ActiveJob>,
    retiring: Vec<WorkerHandle>,
    in_flight: VecDeque<Readback>,
    events: EventQueue,
    event_tx: EventSender,
    shutdown: Arc<AtomicBool>,
    state: SessionState,
    frame_interval: Duration,
    elapsed: Duration,
    capture_failures: u64,
    /// Frames with ids below this are handed to the shared list
    grab_until: u64,
}

impl SessionController {
    /// Create a recording session capturing from `source`
    pub fn new(config: CaptureConfig, source: impl FrameSource + 'static) -> Result<Self> {
        config.validate()?;
        let (width, height) = source.dimensions();
        if (width, height) != (config.width, config.height) {
            return Err(Error::config(format!(
                "source produces {}x{} frames but the session expects {}x{}",
                width, height, config.width, config.height
            )));
        }

        info!(
            "Capture session: {}x{} @ {} fps, quality {}, repeat {}",
            config.width, config.height, config.fps, config.quality, config.repeat
        );
        info!(
            "Frame ring: {} frames ({} window + {} lookback), ~{:.1} MB",
            config.ring_capacity(),
            config.capture_window_frames(),
            config.lookback_frames(),
            config.estimated_memory_mb()
        );

        let (event_tx, events) = EventQueue::channel();
        Ok(Self {
            ring: FrameRing::new(config.ring_capacity()),
            frame_interval: frame_interval(config.fps),
            config,
            source: Box::new(source),
            frames: CapturedFrames::new(),
            next_frame_id: Arc::new(AtomicU64::new(0)),
            next_job_id: 1,
            pending: VecDeque::new(),
            active: None,
            retiring: Vec::new(),
            in_flight: VecDeque::new(),
            events,
            event_tx,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: SessionState::Recording,
            elapsed: Duration::ZERO,
            capture_failures: 0,
            grab_until: 0,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Readbacks dropped for failing or returning the wrong size
    pub fn capture_failures(&self) -> u64 {
        self.capture_failures
    }

    /// Id the next captured frame will receive
    pub fn next_frame_id(&self) -> u64 {
        self.next_frame_id.load(Ordering::Acquire)
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// The job currently being encoded
    pub fn active_job(&self) -> Option<&EncodeJob> {
        self.active.as_ref().map(|a| &a.job)
    }

    pub fn buffered_frames(&self) -> usize {
        self.ring.len()
    }

    /// Advance the session by `delta` and return the events that became ready
    pub fn tick(&mut self, delta: Duration) -> Vec<SessionEvent> {
        let mut out = Vec::new();

        self.elapsed += delta;
        if self.elapsed >= self.frame_interval {
            self.elapsed -= self.frame_interval;
            // Never try to catch up on more than one missed capture
            if self.elapsed >= self.frame_interval {
                self.elapsed = Duration::ZERO;
            }
            if self.capture_wanted() {
                let target = self.ring.take_buffer();
                self.in_flight.push_back(self.source.request_readback(target));
            }
        }

        self.poll_readbacks();
        self.collect_worker_events(&mut out);
        self.reap_workers();

        if self.active.is_none() {
            self.start_next_job(&mut out);
        }
        if self.active.is_none() && self.pending.is_empty() {
            // Nothing left to feed
            self.grab_until = self.grab_until.min(self.next_frame_id());
            if !self.frames.is_empty() {
                self.frames.clear();
            }
        }

        if self.state == SessionState::Stopping
            && self.active.is_none()
            && self.in_flight.is_empty()
            && self.frames_owed() == 0
        {
            info!("Capture session stopped");
            self.state = SessionState::Stopped;
            out.push(SessionEvent::SessionStopped);
        }

        out
    }

    /// Capture the next `buffer_seconds` of frames into a file
    pub fn snap(&mut self, name: Option<&str>) -> Result<JobId> {
        let start = self.next_frame_id();
        self.enqueue(name, start, self.config.capture_window_frames())
    }

    /// Like [`snap`](Self::snap) but also keeps up to `longpress_seconds` of
    /// already buffered frames from before the request
    pub fn snap_longpress(&mut self, name: Option<&str>) -> Result<JobId> {
        let next = self.next_frame_id();
        let start = next
            .saturating_sub(self.config.lookback_frames() as u64)
            .max(self.ring.oldest_id().unwrap_or(next));
        let frames = (next - start) as usize + self.config.capture_window_frames();
        self.enqueue(name, start, frames)
    }

    /// Encode whatever the ring currently holds.
    ///
    /// Returns `Ok(None)` when nothing has been captured yet.
    pub fn save_buffered(&mut self, name: Option<&str>) -> Result<Option<JobId>> {
        let Some(start) = self.ring.oldest_id() else {
            warn!("Save requested with an empty frame buffer, ignoring");
            return Ok(None);
        };
        let count = self.ring.len();
        self.enqueue(name, start, count).map(Some)
    }

    fn enqueue(&mut self, name: Option<&str>, start: u64, frames: usize) -> Result<JobId> {
        if matches!(self.state, SessionState::Stopping | SessionState::Stopped) {
            return Err(Error::InvalidState("cannot queue a snap on a stopped session"));
        }

        let id = self.next_job_id;
        self.next_job_id += 1;
        let end = start + frames as u64;
        let job = EncodeJob {
            id,
            frames_to_encode: frames,
            start_frame_id: start,
            output_path: self.output_path(name, id),
            buffered: self
                .ring
                .frames_since(start)
                .take_while(|f| f.id < end)
                .cloned()
                .collect(),
            encoder: EncoderSettings::from_config(&self.config),
            priority: self.config.worker_priority,
        };
        self.grab_until = self.grab_until.max(end);

        info!(
            "Queued job {}: {} frames from id {} -> {}",
            id,
            frames,
            start,
            job.output_path.display()
        );
        self.pending.push_back(job);
        Ok(id)
    }

    fn output_path(&self, name: Option<&str>, id: JobId) -> PathBuf {
        let file = match name {
            Some(name) if name.ends_with(".gif") => name.to_string(),
            Some(name) => format!("{}.gif", name),
            None => format!(
                "snap-{}-{:03}.gif",
                chrono::Local::now().format("%Y%m%d-%H%M%S"),
                id
            ),
        };
        self.config.output_dir.join(file)
    }

    /// Suspend periodic capture
    pub fn pause(&mut self) {
        if self.state == SessionState::Recording {
            info!("Capture paused");
            self.state = SessionState::Paused;
        }
    }

    /// Resume periodic capture, also restarting a stopped session
    pub fn resume(&mut self) {
        if self.state != SessionState::Recording {
            info!("Capture resumed");
            self.state = SessionState::Recording;
        }
    }

    /// Stop capturing, dropping queued jobs; the active job still completes
    pub fn stop(&mut self) {
        if matches!(self.state, SessionState::Stopping | SessionState::Stopped) {
            return;
        }
        if !self.pending.is_empty() {
            info!("Discarding {} queued jobs", self.pending.len());
            self.pending.clear();
        }
        self.grab_until = match &self.active {
            Some(active) => active.job.end_frame_id(),
            None => self.next_frame_id(),
        };
        self.state = SessionState::Stopping;
    }

    /// Change the capture rate; queued jobs keep the delay they were created with
    pub fn set_fps(&mut self, fps: u32) -> Result<()> {
        validate_fps(fps)?;
        self.config.fps = fps;
        self.frame_interval = frame_interval(fps);
        self.ring.set_capacity(self.config.ring_capacity());
        debug!("Frame rate set to {} fps", fps);
        Ok(())
    }

    pub fn set_quality(&mut self, quality: u8) -> Result<()> {
        validate_quality(quality)?;
        self.config.quality = quality;
        Ok(())
    }

    /// Loop count for files requested from now on (-1 disables looping)
    pub fn set_repeat(&mut self, repeat: i32) -> Result<()> {
        validate_repeat(repeat)?;
        self.config.repeat = repeat;
        Ok(())
    }

    /// Release buffered frames and spare buffers
    pub fn flush_memory(&mut self) {
        self.ring.clear();
        if self.active.is_none() && self.pending.is_empty() {
            self.frames.clear();
        }
        debug!("Frame memory flushed");
    }

    fn frames_owed(&self) -> u64 {
        self.grab_until.saturating_sub(self.next_frame_id())
    }

    fn capture_wanted(&self) -> bool {
        match self.state {
            SessionState::Recording => self.in_flight.len() < MAX_IN_FLIGHT,
            SessionState::Paused | SessionState::Stopping => {
                self.frames_owed() > self.in_flight.len() as u64
            }
            SessionState::Stopped => false,
        }
    }

    /// Complete readbacks strictly in request order
    fn poll_readbacks(&mut self) {
        while let Some(readback) = self.in_flight.front_mut() {
            let result = match readback.poll() {
                ReadbackStatus::Pending => break,
                ReadbackStatus::Ready(result) => result,
            };
            self.in_flight.pop_front();

            match result.and_then(|raw| self.convert(raw)) {
                Ok(rgb) => self.store_frame(rgb),
                Err(e) => {
                    self.capture_failures += 1;
                    warn!("Dropping captured frame: {}", e);
                }
            }
        }
    }

    fn convert(&mut self, raw: RawPixels) -> Result<Vec<u8>> {
        let target = match raw.format {
            PixelFormat::Rgba => self.ring.take_buffer(),
            PixelFormat::Rgb => Vec::new(),
        };
        raw.into_rgb(self.config.width, self.config.height, target)
    }

    fn store_frame(&mut self, rgb: Vec<u8>) {
        let id = self.next_frame_id.load(Ordering::Acquire);
        let frame = Frame::new(id, self.config.width, self.config.height, rgb);
        if id < self.grab_until {
            self.frames.append(frame.clone());
        }
        self.ring.push(frame);
        // Published only once the frame is visible to workers
        self.next_frame_id.store(id + 1, Ordering::Release);
    }

    fn collect_worker_events(&mut self, out: &mut Vec<SessionEvent>) {
        for event in self.events.drain() {
            let finished = event.is_terminal()
                && event.job() == self.active.as_ref().map(|a| a.job.id);
            if finished {
                if let Some(active) = self.active.take() {
                    debug!("Job {} finished", active.job.id);
                    self.retiring.push(active.worker);
                }
            }
            out.push(event);
        }
    }

    fn reap_workers(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retiring)
            .into_iter()
            .partition(|w| w.is_finished());
        for worker in done {
            worker.join();
        }
        self.retiring = running;
    }

    fn start_next_job(&mut self, out: &mut Vec<SessionEvent>) {
        while let Some(mut job) = self.pending.pop_front() {
            let added = self.frames.backfill(std::mem::take(&mut job.buffered));
            if added > 0 {
                debug!("Job {} backfilled {} buffered frames", job.id, added);
            }

            let ctx = WorkerContext {
                frames: self.frames.clone(),
                events: self.event_tx.clone(),
                next_frame_id: self.next_frame_id.clone(),
                shutdown: self.shutdown.clone(),
            };
            match spawn_worker(job.clone(), ctx) {
                Ok(worker) => {
                    self.active = Some(ActiveJob { job, worker });
                    return;
                }
                Err(e) => {
                    warn!("Could not start job {}: {}", job.id, e);
                    out.push(SessionEvent::Failed {
                        job: job.id,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.frames.notify();
    }
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapgif_capture::SyntheticSource;

    fn config(dir: &std::path::Path) -> CaptureConfig {
        CaptureConfig::new()
            .with_width(8)
            .with_height(8)
            .with_fps(10)
            .with_buffer_seconds(0.5)
            .with_longpress_seconds(0.3)
            .with_output_dir(dir)
    }

    fn warm(session: &mut SessionController, ticks: usize) {
        for _ in 0..ticks {
            session.tick(Duration::from_millis(100));
        }
    }

    #[test]
    fn test_rejects_mismatched_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = SessionController::new(config(dir.path()), SyntheticSource::new(4, 4));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_one_capture_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();

        session.tick(Duration::from_millis(50));
        assert_eq!(session.next_frame_id(), 0);
        session.tick(Duration::from_millis(50));
        assert_eq!(session.next_frame_id(), 1);
        // A long stall still yields a single capture
        session.tick(Duration::from_secs(2));
        assert_eq!(session.next_frame_id(), 2);
    }

    #[test]
    fn test_ring_stays_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        warm(&mut session, 20);
        assert_eq!(session.next_frame_id(), 20);
        assert_eq!(session.buffered_frames(), 8);
    }

    #[test]
    fn test_longpress_window_includes_lookback() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        warm(&mut session, 10);

        session.snap_longpress(Some("lp")).unwrap();
        let job = session.pending.front().unwrap();
        assert_eq!(job.start_frame_id, 7);
        assert_eq!(job.frames_to_encode, 8);
        let held: Vec<u64> = job.buffered.iter().map(|f| f.id).collect();
        assert_eq!(held, vec![7, 8, 9]);
        assert_eq!(job.output_path, dir.path().join("lp.gif"));
    }

    #[test]
    fn test_longpress_limited_by_ring_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        warm(&mut session, 1);

        session.snap_longpress(None).unwrap();
        let job = session.pending.front().unwrap();
        assert_eq!(job.start_frame_id, 0);
        assert_eq!(job.frames_to_encode, 6);
    }

    #[test]
    fn test_empty_save_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        assert_eq!(session.save_buffered(None).unwrap(), None);
        assert_eq!(session.pending_jobs(), 0);
    }

    #[test]
    fn test_snap_keeps_settings_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        session.snap(None).unwrap();
        session.set_fps(25).unwrap();
        session.set_repeat(-1).unwrap();

        let job = session.pending.front().unwrap();
        assert_eq!(job.encoder.frame_delay_ms, 100);
        assert_eq!(job.encoder.repeat, snapgif_core::Repeat::Infinite);
        assert!(job
            .output_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("snap-"));
    }

    #[test]
    fn test_setters_validate() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        assert!(session.set_fps(0).is_err());
        assert!(session.set_quality(0).is_err());
        assert!(session.set_quality(101).is_err());
        assert!(session.set_repeat(-2).is_err());
        assert_eq!(session.config().fps, 10);
    }

    #[test]
    fn test_stop_without_jobs_stops_on_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        warm(&mut session, 3);
        session.stop();
        assert_eq!(session.state(), SessionState::Stopping);
        assert!(session.snap(None).is_err());

        let events = session.tick(Duration::from_millis(100));
        assert_eq!(events, vec![SessionEvent::SessionStopped]);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.tick(Duration::from_millis(100)).is_empty());
        assert_eq!(session.next_frame_id(), 3);
    }

    #[test]
    fn test_pause_stops_periodic_capture() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            SessionController::new(config(dir.path()), SyntheticSource::new(8, 8)).unwrap();
        warm(&mut session, 2);
        session.pause();
        warm(&mut session, 5);
        assert_eq!(session.next_frame_id(), 2);
        session.resume();
        warm(&mut session, 1);
        assert_eq!(session.next_frame_id(), 3);
    }
}
