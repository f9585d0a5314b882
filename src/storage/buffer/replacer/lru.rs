use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU (Least Recently Used) victim selection policy.
///
/// Holds the set of frames that are resident but unpinned, in unpin order.
/// All operations are O(1): the linked hash map gives constant-time
/// membership, removal, and front-pop while preserving insertion order.
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

struct LruInner {
    order: LinkedHashMap<FrameId, ()>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(num_pages: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                order: LinkedHashMap::with_capacity(num_pages),
                capacity: num_pages,
            }),
        }
    }

    /// Remove and return the frame with the oldest unpin, if any.
    pub fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        inner.order.pop_front().map(|(frame_id, ())| frame_id)
    }

    /// A pinned frame is no longer an eviction candidate.
    pub fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.order.remove(&frame_id);
    }

    /// An unpinned frame becomes the most-recent eviction candidate.
    /// Unpinning a frame that is already present is a no-op: its recency
    /// position is kept.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.order.len() == inner.capacity || inner.order.contains_key(&frame_id) {
            return;
        }
        inner.order.insert(frame_id, ());
    }

    /// Number of frames currently eligible for eviction.
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
