use crate::buffer::{Error, FrameId};
use std::collections::{HashMap, VecDeque};

struct FrameEntry {
    access_count: usize,
    is_evictable: bool,
}

/// LRU-K victim selection over two queues. Frames with fewer than `k`
/// recorded accesses live in the history queue, ordered by first access and
/// never reordered; their backward k-distance is infinite, so the earliest
/// of them is the preferred victim. Frames with at least `k` accesses live
/// in the cache queue, most recent access first, and are evicted LRU.
///
/// The replacer itself is not synchronised; the buffer pool wraps it in a
/// single mutex.
pub struct LruKReplacer {
    entries: HashMap<FrameId, FrameEntry>,
    history: VecDeque<FrameId>,
    cache: VecDeque<FrameId>,
    current_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(replacer_size: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            entries: HashMap::new(),
            history: VecDeque::new(),
            cache: VecDeque::new(),
            current_size: 0,
            replacer_size,
            k,
        }
    }

    /// Records an access to `frame_id`, creating it (non-evictable) on first
    /// sight. The access that makes the count reach `k` promotes the frame
    /// from the history queue to the front of the cache queue.
    pub fn record_access(&mut self, frame_id: FrameId) {
        assert!(
            frame_id < self.replacer_size,
            "frame {} out of bounds",
            frame_id
        );
        match self.entries.get_mut(&frame_id) {
            Some(entry) => {
                entry.access_count += 1;
                if entry.access_count == self.k {
                    detach(&mut self.history, frame_id);
                    self.cache.push_front(frame_id);
                } else if entry.access_count > self.k {
                    detach(&mut self.cache, frame_id);
                    self.cache.push_front(frame_id);
                }
            }
            None => {
                self.entries.insert(
                    frame_id,
                    FrameEntry {
                        access_count: 1,
                        is_evictable: false,
                    },
                );
                if self.k == 1 {
                    self.cache.push_front(frame_id);
                } else {
                    self.history.push_front(frame_id);
                }
            }
        }
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        assert!(
            frame_id < self.replacer_size,
            "frame {} out of bounds",
            frame_id
        );
        if let Some(entry) = self.entries.get_mut(&frame_id) {
            if entry.is_evictable != evictable {
                entry.is_evictable = evictable;
                if evictable {
                    self.current_size += 1;
                } else {
                    self.current_size -= 1;
                }
            }
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance:
    /// rear of the history queue first, rear of the cache queue otherwise.
    pub fn evict(&mut self) -> Option<FrameId> {
        let frame_id = self
            .pop_evictable(QueueKind::History)
            .or_else(|| self.pop_evictable(QueueKind::Cache))?;
        self.entries.remove(&frame_id);
        self.current_size -= 1;
        Some(frame_id)
    }

    /// Forcibly removes `frame_id` regardless of its k-distance. Errors on a
    /// frame that is pinned down (not evictable); no-op on an unseen frame.
    pub fn remove(&mut self, frame_id: FrameId) -> Result<(), Error> {
        assert!(
            frame_id < self.replacer_size,
            "frame {} out of bounds",
            frame_id
        );
        let Some(entry) = self.entries.get(&frame_id) else {
            return Ok(());
        };
        if !entry.is_evictable {
            return Err(Error::UnEvictableFrame(frame_id));
        }
        if entry.access_count < self.k {
            detach(&mut self.history, frame_id);
        } else {
            detach(&mut self.cache, frame_id);
        }
        self.entries.remove(&frame_id);
        self.current_size -= 1;
        Ok(())
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.current_size
    }

    fn pop_evictable(&mut self, kind: QueueKind) -> Option<FrameId> {
        let entries = &self.entries;
        let queue = match kind {
            QueueKind::History => &mut self.history,
            QueueKind::Cache => &mut self.cache,
        };
        let position = queue
            .iter()
            .rposition(|frame_id| entries[frame_id].is_evictable)?;
        queue.remove(position)
    }
}

enum QueueKind {
    History,
    Cache,
}

fn detach(queue: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(position) = queue.iter().position(|entry| *entry == frame_id) {
        queue.remove(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_k_replacer() {
        let mut lru_replacer = LruKReplacer::new(7, 2);

        // Scenario: add six elements to the replacer. We have [1,2,3,4,5]. Frame 6 is non-evictable.
        lru_replacer.record_access(1);
        lru_replacer.record_access(2);
        lru_replacer.record_access(3);
        lru_replacer.record_access(4);
        lru_replacer.record_access(5);
        lru_replacer.record_access(6);
        lru_replacer.set_evictable(1, true);
        lru_replacer.set_evictable(2, true);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        lru_replacer.set_evictable(5, true);
        lru_replacer.set_evictable(6, false);
        assert_eq!(5, lru_replacer.size());

        // Scenario: Insert access history for frame 1. Now frame 1 has two access histories.
        // All other frames have max backward k-dist. The order of eviction is [2,3,4,5,1].
        lru_replacer.record_access(1);

        // Scenario: Evict three pages from the replacer. Elements with max k-distance should be
        // popped first based on LRU.
        assert_eq!(Some(2), lru_replacer.evict());
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(Some(4), lru_replacer.evict());
        assert_eq!(2, lru_replacer.size());

        // Scenario: Now replacer has frames [5,1].
        // Insert new frames 3, 4, and update access history for 5. We should end with [3,1,5,4]
        lru_replacer.record_access(3);
        lru_replacer.record_access(4);
        lru_replacer.record_access(5);
        lru_replacer.record_access(4);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        assert_eq!(4, lru_replacer.size());

        // Scenario: continue looking for victims. We expect 3 to be evicted next.
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());

        // Set 6 to be evictable. 6 Should be evicted next since it has max backward k-dist.
        lru_replacer.set_evictable(6, true);
        assert_eq!(4, lru_replacer.size());
        assert_eq!(Some(6), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());

        // Now we have [1,5,4]. Continue looking for victims.
        lru_replacer.set_evictable(1, false);
        assert_eq!(2, lru_replacer.size());
        assert_eq!(Some(5), lru_replacer.evict());
        assert_eq!(1, lru_replacer.size());

        // Update access history for 1. Now we have [4,1]. Next victim is 4.
        lru_replacer.record_access(1);
        lru_replacer.record_access(1);
        lru_replacer.set_evictable(1, true);
        assert_eq!(2, lru_replacer.size());
        assert_eq!(Some(4), lru_replacer.evict());

        assert_eq!(1, lru_replacer.size());
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());

        // This operation should not modify size
        assert_eq!(None, lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());
    }

    #[test]
    fn history_before_cache() {
        let mut lru_replacer = LruKReplacer::new(7, 2);
        for frame_id in [1, 2, 3, 4, 5, 6, 1, 2, 3, 4, 5] {
            lru_replacer.record_access(frame_id);
        }
        for frame_id in 1..=6 {
            lru_replacer.set_evictable(frame_id, true);
        }
        assert_eq!(6, lru_replacer.size());

        // 6 is the only frame below k accesses, so it goes first; afterwards
        // the cache queue is drained least-recently-used first.
        assert_eq!(Some(6), lru_replacer.evict());
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(Some(2), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());
    }

    #[test]
    fn pinned_frame_is_skipped() {
        let mut lru_replacer = LruKReplacer::new(7, 2);
        lru_replacer.record_access(1);
        lru_replacer.set_evictable(1, false);
        assert_eq!(None, lru_replacer.evict());
        lru_replacer.set_evictable(1, true);
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());
    }

    #[test]
    fn remove() {
        let mut lru_replacer = LruKReplacer::new(7, 2);
        lru_replacer.record_access(1);
        lru_replacer.record_access(2);

        // unseen frames are ignored
        assert!(lru_replacer.remove(5).is_ok());

        // non-evictable frames must not be removed
        assert!(matches!(
            lru_replacer.remove(1),
            Err(Error::UnEvictableFrame(1))
        ));

        lru_replacer.set_evictable(1, true);
        lru_replacer.set_evictable(2, true);
        assert_eq!(2, lru_replacer.size());
        assert!(lru_replacer.remove(1).is_ok());
        assert_eq!(1, lru_replacer.size());

        // 1 is gone; only 2 remains
        assert_eq!(Some(2), lru_replacer.evict());
        assert_eq!(None, lru_replacer.evict());
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_frame() {
        let mut lru_replacer = LruKReplacer::new(7, 2);
        lru_replacer.record_access(7);
    }
}
