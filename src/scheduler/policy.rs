//! The policy vtable (spec §4.3) as a closed sum type, per the design
//! note in spec §9 ("Represent the three policies as a closed sum type
//! with a dispatching trait... Avoid open inheritance"). The teacher's
//! `TaskManagerTrait` (`task_manager/mod.rs`) plays the analogous role of
//! "one interface, compile-time-selected implementation" — here the
//! selection is a runtime value (`RuntimeConfig::policy`) rather than a
//! `cfg_if!` feature, since all three policies are useful within the same
//! binary and spec §1 calls them "interchangeable."

use crate::thread::tcb::Tcb;
use crate::thread::ThreadId;

/// Per-policy scheduling hooks. Every method runs with preemption
/// suppressed (spec §4.3 "Ordering rule") — implementations assume
/// exclusive access to the structures they own and to the `Tcb` passed
/// in.
pub(crate) trait SchedPolicy: Send {
    fn name(&self) -> &'static str;

    /// Mark `tcb` ready and make it eligible to be returned by `dequeue`.
    fn enqueue(&mut self, tcb: &mut Tcb);

    /// Pick and remove the next runnable thread, or `None` if nothing is
    /// ready under this policy.
    fn dequeue(&mut self) -> Option<ThreadId>;

    /// Extract a specific thread from the ready structure, wherever it
    /// is. Returns whether it was found.
    fn remove(&mut self, id: ThreadId) -> bool;

    /// Hook invoked by a voluntary yield, before the thread is
    /// re-enqueued. `elapsed_ns` is time spent running since
    /// `tcb.start_time`, computed by the scheduler core the same way it
    /// is for `on_tick`.
    fn on_yield(&mut self, tcb: &mut Tcb, elapsed_ns: u64);

    /// Hook invoked by the preemption tick for the currently running
    /// thread, before `should_preempt` is consulted.
    fn on_tick(&mut self, tcb: &mut Tcb, elapsed_ns: u64);

    /// Whether the running thread should be preempted right now.
    fn should_preempt(&self, tcb: &Tcb) -> bool;

    /// Recompute whatever derived state (queue position, weight) follows
    /// from a priority/nice change made to `tcb` while it is already
    /// known to this policy (enqueued or running).
    fn update_priority(&mut self, tcb: &mut Tcb);

    fn is_empty(&self) -> bool;
}
