//! Fixed-priority policy (spec §4.5): 32 FIFO levels plus an occupancy
//! bitmap so picking the highest non-empty level is a `trailing_zeros`
//! away rather than a 32-wide scan — the same bitmap trick the teacher
//! reaches for in `task_manager.rs`'s priority array, just with O(1)
//! level selection instead of `(0..NUM_PRIORITIES).rev()`.

use super::policy::SchedPolicy;
use crate::thread::attr::PRIORITY_MAX;
use crate::thread::tcb::Tcb;
use crate::thread::ThreadId;
use std::collections::VecDeque;

const NUM_LEVELS: usize = PRIORITY_MAX as usize + 1;

pub(crate) struct PriorityPolicy {
    levels: [VecDeque<ThreadId>; NUM_LEVELS],
    /// Bit `i` set iff `levels[i]` is non-empty (spec §8 invariant).
    occupied: u32,
    timeslice_ns: u64,
}

impl PriorityPolicy {
    pub fn new(timeslice_ns: u64) -> PriorityPolicy {
        PriorityPolicy {
            levels: std::array::from_fn(|_| VecDeque::new()),
            occupied: 0,
            timeslice_ns,
        }
    }

    pub fn set_timeslice_ns(&mut self, ns: u64) {
        self.timeslice_ns = ns;
    }

    fn highest_occupied(&self) -> Option<usize> {
        if self.occupied == 0 {
            None
        } else {
            Some(31 - self.occupied.leading_zeros() as usize)
        }
    }

    /// Invariant check used by tests and the debug dump: bit `i` set iff
    /// level `i` is non-empty.
    #[cfg(test)]
    fn bitmap_consistent(&self) -> bool {
        (0..NUM_LEVELS).all(|i| ((self.occupied >> i) & 1 == 1) == !self.levels[i].is_empty())
    }
}

impl SchedPolicy for PriorityPolicy {
    fn name(&self) -> &'static str {
        "fixed-priority"
    }

    fn enqueue(&mut self, tcb: &mut Tcb) {
        let level = (tcb.priority as usize).min(NUM_LEVELS - 1);
        tcb.priority = level as u8;
        self.levels[level].push_back(tcb.id);
        self.occupied |= 1 << level;
        tcb.timeslice_remaining = self.timeslice_ns;
    }

    fn dequeue(&mut self) -> Option<ThreadId> {
        let level = self.highest_occupied()?;
        let id = self.levels[level].pop_front();
        if self.levels[level].is_empty() {
            self.occupied &= !(1 << level);
        }
        id
    }

    fn remove(&mut self, id: ThreadId) -> bool {
        for level in 0..NUM_LEVELS {
            if let Some(pos) = self.levels[level].iter().position(|&w| w == id) {
                self.levels[level].remove(pos);
                if self.levels[level].is_empty() {
                    self.occupied &= !(1 << level);
                }
                return true;
            }
        }
        false
    }

    fn on_yield(&mut self, _tcb: &mut Tcb, _elapsed_ns: u64) {}

    fn on_tick(&mut self, tcb: &mut Tcb, elapsed_ns: u64) {
        tcb.timeslice_remaining = tcb.timeslice_remaining.saturating_sub(elapsed_ns);
    }

    fn should_preempt(&self, tcb: &Tcb) -> bool {
        let current_level = tcb.priority as usize;
        let higher_mask = if current_level == 31 {
            0
        } else {
            self.occupied & !((1u32 << (current_level + 1)) - 1)
        };
        if higher_mask != 0 {
            return true;
        }
        tcb.timeslice_remaining == 0 && (self.occupied & (1 << current_level)) != 0
    }

    fn update_priority(&mut self, tcb: &mut Tcb) {
        // Only meaningful if `tcb` is currently sitting in one of our
        // queues; if it is, relocate it to the new level's tail. A
        // running thread is repositioned on its next enqueue instead
        // (spec §4.5).
        if self.remove(tcb.id) {
            self.enqueue(tcb);
        }
    }

    fn is_empty(&self) -> bool {
        self.occupied == 0
    }
}
