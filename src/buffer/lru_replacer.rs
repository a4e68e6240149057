use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::FrameId;

/// Strict LRU victim policy.
///
/// The queue holds the unpinned, loaded frames in unpin order: the
/// front is the least recently used and the next victim. Recency is
/// touch-on-unpin - a fetched page is pinned and therefore off the
/// queue, so fetches do not reorder it.
pub struct LruReplacer {
    /// Maximum number of frames the queue may hold (the pool size)
    capacity: usize,
    queue: Mutex<VecDeque<FrameId>>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Removes and returns the least recently used frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        self.queue.lock().pop_front()
    }

    /// Takes the frame out of the eviction queue. Idempotent.
    pub fn pin(&self, frame_id: FrameId) {
        let mut queue = self.queue.lock();
        if let Some(pos) = queue.iter().position(|&id| id == frame_id) {
            queue.remove(pos);
        }
    }

    /// Appends the frame to the back of the eviction queue unless it is
    /// already queued. A queue at capacity evicts its front first; with
    /// correct pin accounting that never happens, since capacity equals
    /// the pool size and only loaded, unpinned frames are queued.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut queue = self.queue.lock();
        if queue.iter().any(|&id| id == frame_id) {
            return;
        }
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(frame_id);
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }
}
