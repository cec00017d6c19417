use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;
use crate::storage::buffer::replacer::Replacer;

/// LRU (Least Recently Used) replacement policy.
///
/// Eligible frames are ordered by recency of unpin; the victim is the
/// frame whose unpin is the oldest. The map's insertion order carries the
/// recency ordering, so membership and ordering live in one structure.
pub struct LruReplacer {
    inner: Mutex<LinkedHashMap<FrameId, ()>>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            inner: Mutex::new(LinkedHashMap::with_capacity(pool_size)),
            capacity: pool_size,
        }
    }
}

impl Replacer for LruReplacer {
    fn pin(&self, frame_id: FrameId) {
        self.inner.lock().remove(&frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.contains_key(&frame_id) {
            return;
        }
        // Capacity equals the pool size, so this only trims after misuse.
        while inner.len() >= self.capacity {
            inner.pop_front();
        }
        inner.insert(frame_id, ());
    }

    fn victim(&self) -> Option<FrameId> {
        self.inner.lock().pop_front().map(|(frame_id, _)| frame_id)
    }

    fn size(&self) -> usize {
        self.inner.lock().len()
    }
}
