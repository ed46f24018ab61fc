//! Encode jobs and their worker threads

use crate::events::{EventSender, JobId, SessionEvent};
use crate::frames::{CapturedFrames, ReadResult};
use snapgif_core::{Error, Frame, Result, WorkerPriority};
use snapgif_encoder::{EncoderSettings, GifWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a worker sleeps waiting for the next frame before rechecking shutdown
const FRAME_WAIT: Duration = Duration::from_millis(50);

/// One request to turn a window of frames into a file
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub id: JobId,
    pub frames_to_encode: usize,
    /// Frames older than this are stale for this job
    pub start_frame_id: u64,
    pub output_path: PathBuf,
    /// Already captured frames of the window, held from request until start
    pub buffered: Vec<Frame>,
    /// Taken when the job was requested
    pub encoder: EncoderSettings,
    pub priority: WorkerPriority,
}

impl EncodeJob {
    /// First frame id past this job's window
    pub fn end_frame_id(&self) -> u64 {
        self.start_frame_id + self.frames_to_encode as u64
    }
}

/// State a worker shares with the session controller
#[derive(Clone)]
pub struct WorkerContext {
    pub frames: CapturedFrames,
    pub events: EventSender,
    /// Next frame id the controller will assign, published after the append
    pub next_frame_id: Arc<AtomicU64>,
    pub shutdown: Arc<AtomicBool>,
}

/// A running worker thread
pub struct WorkerHandle {
    job_id: JobId,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to exit
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("Encode worker for job {} panicked", self.job_id);
        }
    }
}

/// Start `job` on its own thread
pub fn spawn_worker(job: EncodeJob, ctx: WorkerContext) -> Result<WorkerHandle> {
    let job_id = job.id;
    let thread = std::thread::Builder::new()
        .name(format!("snapgif-encode-{}", job_id))
        .spawn(move || run_worker(job, ctx))
        .map_err(|e| Error::Worker(format!("failed to spawn encode thread: {}", e)))?;

    Ok(WorkerHandle { job_id, thread })
}

fn run_worker(job: EncodeJob, ctx: WorkerContext) {
    apply_priority(job.priority);
    info!(
        "Encoding job {}: {} frames from id {} to {}",
        job.id,
        job.frames_to_encode,
        job.start_frame_id,
        job.output_path.display()
    );

    let events = &ctx.events;
    match encode_job(&job, &ctx) {
        Ok(count) => {
            info!("Job {} wrote {} frames to {}", job.id, count, job.output_path.display());
            events.send(SessionEvent::Completed {
                job: job.id,
                path: job.output_path.clone(),
            });
        }
        Err(e) => {
            if let Err(remove_err) = std::fs::remove_file(&job.output_path) {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to remove partial file {}: {}",
                        job.output_path.display(),
                        remove_err
                    );
                }
            }
            error!("Job {} failed: {}", job.id, e);
            events.send(SessionEvent::Failed {
                job: job.id,
                error: e.to_string(),
            });
        }
    }
}

/// Walk the shared list and write every frame of the job window
///
/// Finishes once the window is covered or every id in it has been assigned
/// and nothing more is queued, so frames lost to failed or evicted captures
/// leave gaps instead of stalling the job.
fn encode_job(job: &EncodeJob, ctx: &WorkerContext) -> Result<usize> {
    let frames = &ctx.frames;
    let end = job.end_frame_id();
    let mut writer = GifWriter::new(job.encoder);
    writer.create(&job.output_path)?;

    let mut cursor = 0;
    let mut next_id = job.start_frame_id;
    let mut completed = 0usize;

    while next_id < end {
        let frame = match frames.read_at(cursor, job.start_frame_id) {
            ReadResult::Evicted(id) => {
                debug!("Job {} dropped stale frame {}", job.id, id);
                continue;
            }
            ReadResult::Empty => {
                if ctx.shutdown.load(Ordering::Acquire) {
                    return Err(Error::Cancelled);
                }
                let assigned = ctx.next_frame_id.load(Ordering::Acquire);
                if assigned >= end && frames.len() <= cursor {
                    debug!("Job {} window closed with {} frames missing", job.id, end - next_id);
                    break;
                }
                frames.wait_for(cursor, FRAME_WAIT);
                continue;
            }
            ReadResult::Frame(frame) => frame,
        };

        if frame.id >= end {
            break;
        }
        cursor += 1;
        if frame.id < next_id {
            continue;
        }

        writer.add_frame(frame.data())?;
        completed += 1;
        next_id = frame.id + 1;

        let remaining = end.saturating_sub(next_id) as usize;
        ctx.events.send(SessionEvent::Progress {
            job: job.id,
            fraction: completed as f32 / (completed + remaining) as f32,
        });
    }

    if completed == 0 {
        return Err(Error::Worker("no frames were captured for this job".to_string()));
    }
    writer.finish()?;
    Ok(completed)
}

#[cfg(target_os = "linux")]
fn apply_priority(priority: WorkerPriority) {
    let nice = priority.nice_value();
    if nice == 0 {
        return;
    }
    // SAFETY: both calls only read their arguments and act on the current thread
    let result = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, nice)
    };
    if result != 0 {
        debug!(
            "Could not set worker nice value {}: {}",
            nice,
            std::io::Error::last_os_error()
        );
    } else {
        debug!("Worker nice value set to {}", nice);
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(priority: WorkerPriority) {
    debug!("Worker priority {:?} not supported on this platform", priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventQueue;
    use snapgif_core::Repeat;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 2,
            height: 2,
            repeat: Repeat::Infinite,
            quality: 10,
            frame_delay_ms: 100,
        }
    }

    fn frame(id: u64) -> Frame {
        let shade = (id * 20) as u8;
        Frame::new(id, 2, 2, vec![shade; 12])
    }

    fn context(frames: &CapturedFrames, next_id: u64) -> (WorkerContext, EventQueue) {
        let (events, queue) = EventQueue::channel();
        let ctx = WorkerContext {
            frames: frames.clone(),
            events,
            next_frame_id: Arc::new(AtomicU64::new(next_id)),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        (ctx, queue)
    }

    fn job(id: JobId, start: u64, count: usize, path: PathBuf) -> EncodeJob {
        EncodeJob {
            id,
            frames_to_encode: count,
            start_frame_id: start,
            output_path: path,
            buffered: Vec::new(),
            encoder: settings(),
            priority: WorkerPriority::Normal,
        }
    }

    #[test]
    fn test_worker_skips_stale_frames_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.gif");
        let frames = CapturedFrames::new();
        for id in 3..=7 {
            frames.append(frame(id));
        }
        let (ctx, mut queue) = context(&frames, 8);

        spawn_worker(job(1, 5, 3, path.clone()), ctx).unwrap().join();

        let events = queue.drain();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Completed { job: 1, path: path.clone() })
        );
        assert_eq!(frames.ids(), vec![5, 6, 7]);
        assert!(path.exists());
    }

    #[test]
    fn test_progress_reaches_one() {
        let dir = tempfile::tempdir().unwrap();
        let frames = CapturedFrames::new();
        for id in 0..4 {
            frames.append(frame(id));
        }
        let (ctx, mut queue) = context(&frames, 4);

        spawn_worker(job(2, 0, 4, dir.path().join("p.gif")), ctx)
            .unwrap()
            .join();

        let fractions: Vec<f32> = queue
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Progress { fraction, .. } => Some(fraction),
                _ => None,
            })
            .collect();
        assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_shutdown_cancels_waiting_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.gif");
        let frames = CapturedFrames::new();
        frames.append(frame(0));
        let (ctx, mut queue) = context(&frames, 1);
        let shutdown = ctx.shutdown.clone();

        let handle = spawn_worker(job(3, 0, 10, path.clone()), ctx).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        shutdown.store(true, Ordering::Release);
        handle.join();

        let events = queue.drain();
        assert!(matches!(events.last(), Some(SessionEvent::Failed { job: 3, .. })));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Completed { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.gif");
        let frames = CapturedFrames::new();
        frames.append(frame(0));
        let (ctx, mut queue) = context(&frames, 1);

        spawn_worker(job(4, 0, 1, path), ctx).unwrap().join();

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::Failed { job: 4, .. }));
    }

    #[test]
    fn test_missing_frames_leave_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.gif");
        let frames = CapturedFrames::new();
        frames.append(frame(2));
        frames.append(frame(3));
        let (ctx, mut queue) = context(&frames, 4);

        spawn_worker(job(5, 0, 4, path.clone()), ctx).unwrap().join();

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], SessionEvent::Completed { job: 5, path });
    }
}
