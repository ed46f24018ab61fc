//! Captured-frame list shared between the session and encode workers
//!
//! Every method takes the lock for exactly one read, evict, append or merge
//! step and releases it before returning. Pixel data is handed out as a
//! reference-counted [`Frame`], so no encoding work happens under the lock.

use snapgif_core::Frame;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of one read attempt
#[derive(Debug)]
pub enum ReadResult {
    /// The frame at the cursor
    Frame(Frame),
    /// A frame older than the job window was dropped; retry
    Evicted(u64),
    /// Nothing at the cursor yet
    Empty,
}

#[derive(Default)]
struct Shared {
    frames: Mutex<VecDeque<Frame>>,
    appended: Condvar,
}

/// Id-ordered frames waiting to be encoded
#[derive(Clone, Default)]
pub struct CapturedFrames {
    shared: Arc<Shared>,
}

impl CapturedFrames {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.shared
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ids currently held, oldest first
    pub fn ids(&self) -> Vec<u64> {
        self.lock().iter().map(|f| f.id).collect()
    }

    /// Append a newly captured frame and wake waiting workers
    pub fn append(&self, frame: Frame) {
        let mut frames = self.lock();
        debug_assert!(frames.back().map_or(true, |last| last.id < frame.id));
        frames.push_back(frame);
        drop(frames);
        self.shared.appended.notify_all();
    }

    /// Merge frames into their id position, skipping ids already present.
    ///
    /// Only safe while no worker holds a cursor into the list.
    pub fn backfill(&self, incoming: impl IntoIterator<Item = Frame>) -> usize {
        let mut frames = self.lock();
        let mut added = 0;
        for frame in incoming {
            if let Err(pos) = frames.binary_search_by_key(&frame.id, |f| f.id) {
                frames.insert(pos, frame);
                added += 1;
            }
        }
        drop(frames);
        if added > 0 {
            self.shared.appended.notify_all();
        }
        added
    }

    /// Read the entry at `cursor`, evicting it instead if it predates `start_id`
    pub fn read_at(&self, cursor: usize, start_id: u64) -> ReadResult {
        let mut frames = self.lock();
        match frames.get(cursor) {
            None => ReadResult::Empty,
            Some(frame) if frame.id < start_id => {
                let id = frame.id;
                frames.remove(cursor);
                ReadResult::Evicted(id)
            }
            Some(frame) => ReadResult::Frame(frame.clone()),
        }
    }

    /// Wait until an entry exists at `cursor` or `timeout` passes
    pub fn wait_for(&self, cursor: usize, timeout: Duration) -> bool {
        let frames = self.lock();
        if frames.len() > cursor {
            return true;
        }
        let (frames, _) = self
            .shared
            .appended
            .wait_timeout_while(frames, timeout, |frames| frames.len() <= cursor)
            .unwrap_or_else(PoisonError::into_inner);
        frames.len() > cursor
    }

    /// Wake every waiting worker without adding anything
    pub fn notify(&self) {
        self.shared.appended.notify_all();
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
