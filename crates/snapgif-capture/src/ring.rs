//! Fixed-capacity, time-ordered store of the most recent frames

use snapgif_core::Frame;
use std::collections::VecDeque;
use tracing::debug;

// Evicted buffers kept for reuse; one or two cover in-flight readbacks
const MAX_SPARE_BUFFERS: usize = 2;

/// Holds the `capacity` most recently captured frames, oldest first.
///
/// Frames are pushed at the tail and evicted from the head. Pixel buffers of
/// evicted frames nobody else references are kept and handed back through
/// [`FrameRing::take_buffer`] to back the next capture.
pub struct FrameRing {
    capacity: usize,
    frames: VecDeque<Frame>,
    spare: Vec<Vec<u8>>,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            spare: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a frame, evicting the oldest ones beyond capacity
    pub fn push(&mut self, frame: Frame) {
        debug_assert!(self.frames.back().map_or(true, |last| last.id < frame.id));
        while self.frames.len() >= self.capacity {
            match self.frames.pop_front() {
                Some(old) => self.recycle(old),
                None => break,
            }
        }
        self.frames.push_back(frame);
    }

    fn recycle(&mut self, frame: Frame) {
        if self.spare.len() < MAX_SPARE_BUFFERS {
            if let Some(buffer) = frame.into_buffer() {
                self.spare.push(buffer);
            }
        }
    }

    /// A recycled buffer if one is available, otherwise a new empty one
    pub fn take_buffer(&mut self) -> Vec<u8> {
        self.spare.pop().unwrap_or_default()
    }

    pub fn spare_buffers(&self) -> usize {
        self.spare.len()
    }

    /// Look up a frame by id
    pub fn get(&self, id: u64) -> Option<&Frame> {
        self.frames
            .binary_search_by_key(&id, |f| f.id)
            .ok()
            .and_then(|pos| self.frames.get(pos))
    }

    pub fn oldest_id(&self) -> Option<u64> {
        self.frames.front().map(|f| f.id)
    }

    pub fn newest_id(&self) -> Option<u64> {
        self.frames.back().map(|f| f.id)
    }

    /// Frames with an id of at least `id`, oldest first
    pub fn frames_since(&self, id: u64) -> impl Iterator<Item = &Frame> {
        let start = self.frames.partition_point(|f| f.id < id);
        self.frames.range(start..)
    }

    /// Change the capacity, dropping the oldest frames if it shrinks
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.frames.len() > self.capacity {
            if let Some(old) = self.frames.pop_front() {
                self.recycle(old);
            }
        }
        debug!("Frame ring capacity set to {}", self.capacity);
    }

    /// Release every frame and spare buffer
    pub fn clear(&mut self) {
        self.frames.clear();
        self.spare.clear();
        self.frames.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64) -> Frame {
        Frame::new(id, 2, 2, vec![id as u8; 12])
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut ring = FrameRing::new(4);
        for id in 0..10 {
            ring.push(frame(id));
            assert!(ring.len() <= 4);
        }
        assert_eq!(ring.oldest_id(), Some(6));
        assert_eq!(ring.newest_id(), Some(9));
    }

    #[test]
    fn test_oldest_evicted_after_k_plus_one() {
        let mut ring = FrameRing::new(3);
        for id in 1..=4 {
            ring.push(frame(id));
        }
        assert!(ring.get(1).is_none());
        assert_eq!(ring.get(2).map(|f| f.id), Some(2));
        assert_eq!(ring.get(4).map(|f| f.id), Some(4));
    }

    #[test]
    fn test_evicted_buffers_are_recycled() {
        let mut ring = FrameRing::new(1);
        ring.push(frame(1));
        ring.push(frame(2));
        assert_eq!(ring.spare_buffers(), 1);
        assert_eq!(ring.take_buffer(), vec![1u8; 12]);
        assert!(ring.take_buffer().is_empty());
    }

    #[test]
    fn test_shared_buffers_are_not_recycled() {
        let mut ring = FrameRing::new(1);
        let held = frame(1);
        ring.push(held.clone());
        ring.push(frame(2));
        assert_eq!(ring.spare_buffers(), 0);
        assert_eq!(held.data().len(), 12);
    }

    #[test]
    fn test_frames_since() {
        let mut ring = FrameRing::new(8);
        for id in 3..8 {
            ring.push(frame(id));
        }
        let ids: Vec<u64> = ring.frames_since(5).map(|f| f.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
        assert_eq!(ring.frames_since(100).count(), 0);
        assert_eq!(ring.frames_since(0).count(), 5);
    }

    #[test]
    fn test_shrinking_capacity_trims_oldest() {
        let mut ring = FrameRing::new(5);
        for id in 0..5 {
            ring.push(frame(id));
        }
        ring.set_capacity(2);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.oldest_id(), Some(3));

        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.spare_buffers(), 0);
    }
}
