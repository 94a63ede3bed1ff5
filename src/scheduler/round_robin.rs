//! Round-robin policy (spec §4.4). A single FIFO, no notion of priority
//! or nice at all — the simplest of the three, and the teacher's own
//! cooperative default before priorities were layered on
//! (`task_manager/cooperative.rs` started this way per its module doc).

use super::policy::SchedPolicy;
use crate::thread::tcb::Tcb;
use crate::thread::ThreadId;
use std::collections::VecDeque;

pub const DEFAULT_TIMESLICE_NS: u64 = 10_000_000; // 10 ms

pub(crate) struct RoundRobin {
    ready: VecDeque<ThreadId>,
    timeslice_ns: u64,
}

impl RoundRobin {
    pub fn new(timeslice_ns: u64) -> RoundRobin {
        RoundRobin {
            ready: VecDeque::new(),
            timeslice_ns,
        }
    }

    pub fn set_timeslice_ns(&mut self, ns: u64) {
        self.timeslice_ns = ns;
    }
}

impl SchedPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn enqueue(&mut self, tcb: &mut Tcb) {
        tcb.timeslice_remaining = self.timeslice_ns;
        self.ready.push_back(tcb.id);
    }

    fn dequeue(&mut self) -> Option<ThreadId> {
        self.ready.pop_front()
    }

    fn remove(&mut self, id: ThreadId) -> bool {
        if let Some(pos) = self.ready.iter().position(|&w| w == id) {
            self.ready.remove(pos);
            true
        } else {
            false
        }
    }

    fn on_yield(&mut self, _tcb: &mut Tcb, _elapsed_ns: u64) {}

    fn on_tick(&mut self, tcb: &mut Tcb, elapsed_ns: u64) {
        tcb.timeslice_remaining = tcb.timeslice_remaining.saturating_sub(elapsed_ns);
    }

    fn should_preempt(&self, tcb: &Tcb) -> bool {
        tcb.timeslice_remaining == 0 && !self.ready.is_empty()
    }

    fn update_priority(&mut self, _tcb: &mut Tcb) {}

    fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::tcb::ThreadState;

    fn tcb(id: u32) -> Tcb {
        Tcb::new(ThreadId::new(id), format!("t{id}"), 0, 0, 1024)
    }

    #[test]
    fn fifo_enqueue_dequeue() {
        let mut rr = RoundRobin::new(DEFAULT_TIMESLICE_NS);
        let mut a = tcb(1);
        let mut b = tcb(2);
        rr.enqueue(&mut a);
        rr.enqueue(&mut b);
        assert_eq!(rr.dequeue(), Some(ThreadId::new(1)));
        assert_eq!(rr.dequeue(), Some(ThreadId::new(2)));
        assert_eq!(rr.dequeue(), None);
    }

    #[test]
    fn enqueue_resets_timeslice() {
        let mut rr = RoundRobin::new(DEFAULT_TIMESLICE_NS);
        let mut a = tcb(1);
        a.timeslice_remaining = 0;
        rr.enqueue(&mut a);
        assert_eq!(a.timeslice_remaining, DEFAULT_TIMESLICE_NS);
    }

    #[test]
    fn should_preempt_only_when_exhausted_and_others_waiting() {
        let mut rr = RoundRobin::new(DEFAULT_TIMESLICE_NS);
        let mut current = tcb(1);
        current.state = ThreadState::Running;
        current.timeslice_remaining = 0;
        assert!(!rr.should_preempt(&current)); // nobody else waiting
        let mut other = tcb(2);
        rr.enqueue(&mut other);
        assert!(rr.should_preempt(&current));
    }
}
