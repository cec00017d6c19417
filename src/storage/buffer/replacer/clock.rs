use parking_lot::Mutex;

use crate::common::types::FrameId;
use crate::storage::buffer::replacer::Replacer;

struct ClockState {
    /// (present, referenced) per frame slot.
    slots: Vec<(bool, bool)>,
    hand: usize,
}

/// Clock (second-chance) replacement policy.
///
/// Each slot carries a present bit and a reference bit; the hand sweeps
/// the circular slot array, clearing reference bits until it finds a
/// present, unreferenced slot. A full sweep clears every reference bit,
/// so `victim` finishes within `2 * pool_size` hand steps whenever any
/// slot is present.
pub struct ClockReplacer {
    inner: Mutex<ClockState>,
}

impl ClockReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            inner: Mutex::new(ClockState {
                slots: vec![(false, false); pool_size],
                hand: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(frame_id) {
            *slot = (false, false);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(frame_id) {
            *slot = (true, true);
        }
    }

    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if !inner.slots.iter().any(|&(present, _)| present) {
            return None;
        }

        let len = inner.slots.len();
        // Bounded: after one sweep every reference bit is clear.
        for _ in 0..2 * len {
            let hand = inner.hand;
            inner.hand = (hand + 1) % len;

            let (present, referenced) = inner.slots[hand];
            if !present {
                continue;
            }
            if referenced {
                inner.slots[hand].1 = false;
            } else {
                inner.slots[hand].0 = false;
                return Some(hand);
            }
        }
        unreachable!("present slot must be found within two sweeps")
    }

    fn size(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|&&(present, _)| present)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_chance_sweep() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);
        assert_eq!(replacer.size(), 3);

        // All reference bits set: the first sweep clears them, the second
        // pass takes slot 0.
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_clears_slot() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.pin(0);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_recent_unpin_gets_second_chance() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        assert_eq!(replacer.victim(), Some(0));
        // Re-unpinning 0 sets its reference bit again; 1's was cleared by
        // the previous sweep, so the hand takes 1 first.
        replacer.unpin(0);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(0));
    }
}
