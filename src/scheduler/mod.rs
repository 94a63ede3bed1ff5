//! Scheduler framework (spec §4.3, component 4): the policy-agnostic core
//! that owns the thread table and dispatches to whichever [`Policy`] the
//! runtime was configured with. Mirrors the teacher's single
//! `static mut TASK_MANAGER: TaskManager` singleton (`task_manager.rs`) —
//! there is exactly one scheduler per process, reached through free
//! functions rather than a passed-around handle, because the signal
//! handler driving preemption (`crate::preempt`) has no way to thread a
//! handle through a `sigaction` callback.

mod fair;
mod policy;
mod priority;
mod round_robin;

use crate::clock::{now_ns, Nanos};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::preempt::CriticalSection;
use crate::thread::attr::ThreadAttr;
use crate::thread::tcb::{BoxedEntry, Tcb, ThreadState};
use crate::thread::ThreadId;
use policy::SchedPolicy;
use priority::PriorityPolicy;
use round_robin::RoundRobin;

pub(crate) use fair::{nice_to_weight, FairQueue};
pub use round_robin::DEFAULT_TIMESLICE_NS;

/// Fixed-size thread table capacity (spec §3: "capacity 1024").
pub const MAX_THREADS: usize = 1024;

/// Which of the three interchangeable policies (spec §1) the runtime is
/// configured with. A closed sum type per spec §9's design note, rather
/// than a `Box<dyn SchedPolicy>` — the set of policies is fixed and known
/// at compile time, so a `match` dispatch avoids both the vtable
/// indirection and the heap allocation a trait object would need.
pub(crate) enum Policy {
    RoundRobin(RoundRobin),
    Priority(PriorityPolicy),
    Fair(FairQueue),
}

/// Selects a [`Policy`] at `Runtime::init` time (spec §6 `uthread_policy_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicyKind {
    RoundRobin,
    FixedPriority,
    Fair,
}

impl Policy {
    fn new(kind: SchedPolicyKind, timeslice_ns: Nanos) -> Policy {
        match kind {
            SchedPolicyKind::RoundRobin => Policy::RoundRobin(RoundRobin::new(timeslice_ns)),
            SchedPolicyKind::FixedPriority => Policy::Priority(PriorityPolicy::new(timeslice_ns)),
            SchedPolicyKind::Fair => Policy::Fair(FairQueue::new()),
        }
    }
}

impl SchedPolicy for Policy {
    fn name(&self) -> &'static str {
        match self {
            Policy::RoundRobin(p) => p.name(),
            Policy::Priority(p) => p.name(),
            Policy::Fair(p) => p.name(),
        }
    }
    fn enqueue(&mut self, tcb: &mut Tcb) {
        match self {
            Policy::RoundRobin(p) => p.enqueue(tcb),
            Policy::Priority(p) => p.enqueue(tcb),
            Policy::Fair(p) => p.enqueue(tcb),
        }
    }
    fn dequeue(&mut self) -> Option<ThreadId> {
        match self {
            Policy::RoundRobin(p) => p.dequeue(),
            Policy::Priority(p) => p.dequeue(),
            Policy::Fair(p) => p.dequeue(),
        }
    }
    fn remove(&mut self, id: ThreadId) -> bool {
        match self {
            Policy::RoundRobin(p) => p.remove(id),
            Policy::Priority(p) => p.remove(id),
            Policy::Fair(p) => p.remove(id),
        }
    }
    fn on_yield(&mut self, tcb: &mut Tcb, elapsed_ns: u64) {
        match self {
            Policy::RoundRobin(p) => p.on_yield(tcb, elapsed_ns),
            Policy::Priority(p) => p.on_yield(tcb, elapsed_ns),
            Policy::Fair(p) => p.on_yield(tcb, elapsed_ns),
        }
    }
    fn on_tick(&mut self, tcb: &mut Tcb, elapsed_ns: u64) {
        match self {
            Policy::RoundRobin(p) => p.on_tick(tcb, elapsed_ns),
            Policy::Priority(p) => p.on_tick(tcb, elapsed_ns),
            Policy::Fair(p) => p.on_tick(tcb, elapsed_ns),
        }
    }
    fn should_preempt(&self, tcb: &Tcb) -> bool {
        match self {
            Policy::RoundRobin(p) => p.should_preempt(tcb),
            Policy::Priority(p) => p.should_preempt(tcb),
            Policy::Fair(p) => p.should_preempt(tcb),
        }
    }
    fn update_priority(&mut self, tcb: &mut Tcb) {
        match self {
            Policy::RoundRobin(p) => p.update_priority(tcb),
            Policy::Priority(p) => p.update_priority(tcb),
            Policy::Fair(p) => p.update_priority(tcb),
        }
    }
    fn is_empty(&self) -> bool {
        match self {
            Policy::RoundRobin(p) => p.is_empty(),
            Policy::Priority(p) => p.is_empty(),
            Policy::Fair(p) => p.is_empty(),
        }
    }
}

/// All scheduler-owned state, behind one global slot. `None` before
/// `init` and after `shutdown` (spec §6 lifecycle); every free function in
/// this module panics with a clear message rather than silently no-op'ing
/// if called outside that window, since that always indicates a caller
/// bug rather than a recoverable condition.
struct SchedulerState {
    threads: Vec<Option<Box<Tcb>>>,
    policy: Policy,
    current: ThreadId,
    next_slot: usize,
    context_switches: u64,
}

static mut SCHEDULER: Option<SchedulerState> = None;

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    // SAFETY: every caller runs with preemption masked (direct callers in
    // this module take a `CriticalSection` guard first), and the runtime
    // is single-OS-thread, so this is never re-entered concurrently —
    // only ever nested, which `CriticalSection`'s counter already permits.
    unsafe {
        #[allow(static_mut_refs)]
        let state = SCHEDULER.as_mut().expect("uthread runtime not initialized");
        f(state)
    }
}

pub(crate) fn is_initialized() -> bool {
    unsafe {
        #[allow(static_mut_refs)]
        SCHEDULER.is_some()
    }
}

/// `Runtime::init`: build the idle thread's bookkeeping TCB and the empty
/// ready structure for `kind`. Does not start the preemption timer; that
/// is `crate::preempt::arm`'s job, called separately by `Runtime::init`.
pub(crate) fn init(kind: SchedPolicyKind, timeslice_ns: Nanos) {
    let _cs = CriticalSection::enter();
    unsafe {
        #[allow(static_mut_refs)]
        if SCHEDULER.is_some() {
            panic!("uthread runtime already initialized");
        }
        let mut threads = Vec::with_capacity(MAX_THREADS);
        threads.resize_with(MAX_THREADS, || None);
        let mut idle = Tcb::new(ThreadId::IDLE, "idle".to_string(), 0, 0, 1024);
        idle.state = ThreadState::Running;
        threads[ThreadId::IDLE.slot()] = Some(Box::new(idle));
        #[allow(static_mut_refs)]
        {
            SCHEDULER = Some(SchedulerState {
                threads,
                policy: Policy::new(kind, timeslice_ns),
                current: ThreadId::IDLE,
                next_slot: 1,
                context_switches: 0,
            });
        }
    }
    log::debug!("scheduler initialized with {:?} policy", kind);
}

pub(crate) fn shutdown() {
    let _cs = CriticalSection::enter();
    unsafe {
        #[allow(static_mut_refs)]
        {
            SCHEDULER = None;
        }
    }
    log::debug!("scheduler shut down");
}

pub(crate) fn current_id() -> ThreadId {
    let _cs = CriticalSection::enter();
    with_state(|s| s.current)
}

/// Borrow the current thread's TCB for the duration of `f`. Used by
/// synchronization primitives to read/modify `waiting_on`, `state`, etc.
pub(crate) fn with_tcb<R>(id: ThreadId, f: impl FnOnce(&mut Tcb) -> R) -> R {
    let _cs = CriticalSection::enter();
    with_state(|s| {
        let slot = s.threads[id.slot()]
            .as_mut()
            .unwrap_or_else(|| panic!("{id} has no live TCB"));
        f(slot)
    })
}

pub(crate) fn try_with_tcb<R>(id: ThreadId, f: impl FnOnce(&mut Tcb) -> R) -> Option<R> {
    let _cs = CriticalSection::enter();
    with_state(|s| s.threads[id.slot()].as_mut().map(|tcb| f(tcb)))
}

/// Allocate a thread-table slot and build its TCB. Returns
/// [`Error::OutOfMemory`] once all [`MAX_THREADS`] slots are live (spec
/// §8 boundary behavior).
pub(crate) fn create_thread(
    attr: &ThreadAttr,
    entry: BoxedEntry,
    stack: crate::stack::Stack,
    context: Context,
) -> Result<ThreadId> {
    let _cs = CriticalSection::enter();
    with_state(|s| {
        // A detached thread that exited with nobody left to join it is
        // never reclaimed by itself (that would drop its own `Stack`
        // while still running on it); sweep for any such zombies here
        // instead, now that we are certainly running on some other
        // thread's stack.
        for slot in s.threads.iter_mut() {
            if matches!(slot, Some(tcb) if tcb.detached && tcb.exited) {
                *slot = None;
            }
        }

        let start = s.next_slot;
        for offset in 0..MAX_THREADS {
            let slot = (start + offset) % MAX_THREADS;
            if slot == ThreadId::IDLE.slot() {
                continue;
            }
            if s.threads[slot].is_none() {
                let id = ThreadId::new(slot as u32);
                let mut tcb = Tcb::new(
                    id,
                    attr.name().unwrap_or("uthread").to_string(),
                    attr.priority(),
                    attr.nice(),
                    nice_to_weight(attr.nice()),
                );
                tcb.context = context;
                tcb.stack = Some(stack);
                tcb.entry = Some(entry);
                tcb.detached = matches!(
                    attr.detach_state(),
                    crate::thread::attr::DetachState::Detached
                );
                s.threads[slot] = Some(Box::new(tcb));
                s.next_slot = (slot + 1) % MAX_THREADS;
                return Ok(id);
            }
        }
        Err(Error::OutOfMemory("thread table is full (1024 threads live)"))
    })
}

/// Mark `id` ready and hand it to the active policy. Called once right
/// after `create_thread` succeeds, and again by `unblock`.
pub(crate) fn enqueue_ready(id: ThreadId) {
    let _cs = CriticalSection::enter();
    with_state(|s| {
        let tcb = s.threads[id.slot()].as_mut().expect("enqueue of dead thread");
        tcb.state = ThreadState::Ready;
        s.policy.enqueue(tcb);
    });
}

/// `block`: the calling thread (always the current one) leaves the ready
/// structure and is marked blocked, then a reschedule runs. The caller is
/// responsible for having already recorded `waiting_on`/queue membership
/// before calling this, per spec §4.2's "blocked before enqueue" ordering
/// rule.
pub(crate) fn block_current() {
    let id = current_id();
    let _cs = CriticalSection::enter();
    with_state(|s| {
        let tcb = s.threads[id.slot()].as_mut().unwrap();
        tcb.state = ThreadState::Blocked;
    });
    reschedule();
}

/// `unblock`: move a blocked thread back to ready. No-op if it has
/// already exited (a race the timed-wait paths must tolerate, per spec
/// §9's semaphore timedwait race note). The idle/host pseudo-thread is
/// never a member of the policy's ready structure — it is the implicit
/// fallback `reschedule` reaches for when nothing else is ready — so
/// waking it just flips its bookkeeping state back to `Ready`.
pub(crate) fn unblock(id: ThreadId) {
    let _cs = CriticalSection::enter();
    if id == ThreadId::IDLE {
        with_state(|s| {
            if let Some(tcb) = s.threads[id.slot()].as_mut() {
                tcb.state = ThreadState::Ready;
            }
        });
        return;
    }
    let was_blocked = with_state(|s| {
        s.threads[id.slot()]
            .as_ref()
            .map(|tcb| tcb.state == ThreadState::Blocked)
            .unwrap_or(false)
    });
    if was_blocked {
        enqueue_ready(id);
    }
}

/// `yield`: voluntarily give up the CPU. The current thread is credited
/// with its elapsed slice via `on_yield`, re-enqueued, and a reschedule
/// runs (spec §4.3). A no-op accounting-wise when called with the idle
/// pseudo-thread current (the policy never sees it).
pub(crate) fn yield_now() {
    let id = current_id();
    let _cs = CriticalSection::enter();
    with_state(|s| {
        let tcb = s.threads[id.slot()].as_mut().unwrap();
        let elapsed = crate::clock::saturating_sub(now_ns(), tcb.start_time);
        tcb.total_runtime = tcb.total_runtime.saturating_add(elapsed);
        if id == ThreadId::IDLE {
            tcb.state = ThreadState::Ready;
        } else {
            s.policy.on_yield(tcb, elapsed);
            tcb.state = ThreadState::Ready;
            s.policy.enqueue(tcb);
        }
    });
    reschedule();
}

/// Preemption-timer tick (spec §4.7): account elapsed time against the
/// running thread and, if the active policy says so, force a reschedule.
/// Called from `crate::preempt`'s signal handler with preemption already
/// masked for the duration of the handler. A tick that lands while the
/// idle/host pseudo-thread is current never preempts — there is nothing
/// for the policy to compare it against.
pub(crate) fn tick(elapsed_ns: Nanos) {
    if !is_initialized() {
        return;
    }
    let id = current_id();
    if id == ThreadId::IDLE {
        with_state(|s| {
            let tcb = s.threads[id.slot()].as_mut().unwrap();
            tcb.total_runtime = tcb.total_runtime.saturating_add(elapsed_ns);
        });
        return;
    }
    let should_preempt = with_state(|s| {
        let tcb = s.threads[id.slot()].as_mut().unwrap();
        tcb.total_runtime = tcb.total_runtime.saturating_add(elapsed_ns);
        s.policy.on_tick(tcb, elapsed_ns);
        s.policy.should_preempt(tcb)
    });
    if should_preempt && crate::preempt::preemption_enabled() {
        with_state(|s| {
            let tcb = s.threads[id.slot()].as_mut().unwrap();
            tcb.state = ThreadState::Ready;
            s.policy.enqueue(tcb);
        });
        reschedule();
    }
}

/// Core dispatch (spec §4.3 "schedule()"): pick the next ready thread (or
/// the idle/host pseudo-thread if none), context-switch into it if it
/// differs from the caller, and return once this thread has been resumed
/// again. The idle pseudo-thread occupies slot 0 like any other TCB, so
/// the very first call a process ever makes into this function already
/// saves the host OS thread's real stack into that slot — no separate
/// no-save bootstrap switch is needed (contrast spec §4.1's literal
/// "first-ever switch"; see `DESIGN.md`).
///
/// A caller may already be holding a `CriticalSection` (every blocking
/// primitive keeps one open from "add myself to a wait queue" through to
/// `block_current`'s state transition, so a tick can never see one
/// without the other). That guard's nesting depth is captured into
/// `depth_before`, a local on this very stack frame, before switching
/// away; see `preempt`'s module docs for why a local survives the parked
/// stack just fine and the depth never needs to travel through the TCB.
pub(crate) fn reschedule() {
    let depth_before = crate::preempt::nesting_depth();
    crate::preempt::mask_for_switch();
    let (from_ctx, to_ctx, to_id): (*mut Context, *const Context, ThreadId) = with_state(|s| {
        let next = s.policy.dequeue().unwrap_or(ThreadId::IDLE);
        let prev = s.current;
        s.current = next;
        let start = now_ns();
        let prev_ptr: *mut Context =
            &mut s.threads[prev.slot()].as_mut().unwrap().context as *mut Context;
        let next_ptr: *const Context = {
            let tcb = s.threads[next.slot()].as_mut().unwrap();
            tcb.state = ThreadState::Running;
            tcb.start_time = start;
            &tcb.context as *const Context
        };
        (prev_ptr, next_ptr, next)
    });
    if std::ptr::eq(from_ctx as *const Context, to_ctx) {
        crate::preempt::restore_nesting(depth_before);
        return;
    }
    // Only a call that actually reaches `Context::switch` counts (spec §8
    // "increments by exactly one" per switching call); the same-thread
    // shortcut above — the common case when the only ready thread yields
    // right back to itself — must not bump it.
    with_state(|s| s.context_switches += 1);
    log::trace!("context switch -> {to_id}");
    // SAFETY: both contexts are owned by the single scheduler state, this
    // call happens with `SIGALRM` masked, and no other reference to
    // either `Context` is held across the call.
    unsafe { Context::switch(&mut *from_ctx, &*to_ctx) }
    // Resumed: this is the very first thing this thread runs once it is
    // switched back into, whether that's a moment later or long after
    // other threads have run in between. `depth_before` is this thread's
    // own value, captured above in this very call.
    crate::preempt::restore_nesting(depth_before);
}

pub(crate) fn context_switch_count() -> u64 {
    let _cs = CriticalSection::enter();
    with_state(|s| s.context_switches)
}

pub(crate) fn update_priority(id: ThreadId) {
    let _cs = CriticalSection::enter();
    with_state(|s| {
        let tcb = s.threads[id.slot()].as_mut().unwrap();
        s.policy.update_priority(tcb);
    });
}

/// Free a terminated, already-joined thread's table slot and drop its
/// stack. Called by `join` after it reads out the retval. Detached
/// threads are instead reclaimed lazily by `create_thread`'s zombie
/// sweep, since a thread can never safely free its own slot.
pub(crate) fn reap(id: ThreadId) {
    let _cs = CriticalSection::enter();
    with_state(|s| {
        s.threads[id.slot()] = None;
    });
}

pub(crate) fn thread_count() -> usize {
    let _cs = CriticalSection::enter();
    with_state(|s| s.threads.iter().filter(|t| t.is_some()).count())
}

/// `uthread_set_timeslice`: no-op under the fair policy, which derives
/// each thread's slice from its weight instead of a single shared value
/// (spec §6 "policy-specific tuning knobs").
pub(crate) fn set_timeslice_ns(ns: Nanos) {
    let _cs = CriticalSection::enter();
    with_state(|s| match &mut s.policy {
        Policy::RoundRobin(p) => p.set_timeslice_ns(ns),
        Policy::Priority(p) => p.set_timeslice_ns(ns),
        Policy::Fair(_) => {}
    });
}

pub(crate) fn policy_name() -> &'static str {
    let _cs = CriticalSection::enter();
    with_state(|s| s.policy.name())
}

pub(crate) fn debug_dump() -> String {
    let _cs = CriticalSection::enter();
    with_state(|s| {
        let mut out = format!(
            "policy={} current={} context_switches={}\n",
            s.policy.name(),
            s.current,
            s.context_switches
        );
        for slot in s.threads.iter().flatten() {
            out.push_str(&format!(
                "  {} {:?} prio={} nice={} vruntime={} name={:?}\n",
                slot.id, slot.state, slot.priority, slot.nice, slot.vruntime, slot.name
            ));
        }
        out
    })
}
