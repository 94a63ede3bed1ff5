//! Top-level runtime handle and configuration (spec §6 lifecycle:
//! `uthread_init`/`uthread_shutdown`). Mirrors the teacher's top-level
//! `martos::init()` entry point (`lib.rs`), but returns an owned handle
//! instead of operating purely through the global, so `shutdown` is a
//! consuming method a caller cannot accidentally call twice.

use crate::error::{Error, Result};
use crate::scheduler::{self, SchedPolicyKind};
use crate::stats::{self, Snapshot};
use crate::thread::attr::{NICE_MAX, NICE_MIN, PRIORITY_MAX};
use crate::thread::ThreadId;

/// Configuration consumed by [`Runtime::init`] (spec §6 `uthread_attr_t`
/// at the runtime level, as opposed to [`crate::thread::attr::ThreadAttr`]
/// which is per-thread).
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    policy: SchedPolicyKind,
    timeslice_ns: u64,
    preemption_interval_ns: u64,
}

impl Default for RuntimeConfig {
    fn default() -> RuntimeConfig {
        RuntimeConfig {
            policy: SchedPolicyKind::RoundRobin,
            timeslice_ns: scheduler::DEFAULT_TIMESLICE_NS,
            preemption_interval_ns: scheduler::DEFAULT_TIMESLICE_NS,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    pub fn policy(mut self, policy: SchedPolicyKind) -> RuntimeConfig {
        self.policy = policy;
        self
    }

    pub fn timeslice_ns(mut self, ns: u64) -> Result<RuntimeConfig> {
        if ns == 0 {
            return Err(Error::InvalidArgument("timeslice_ns must be non-zero"));
        }
        self.timeslice_ns = ns;
        Ok(self)
    }

    /// How often the `SIGALRM` preemption timer fires. Ignored entirely
    /// under the `cooperative-only` feature.
    pub fn preemption_interval_ns(mut self, ns: u64) -> Result<RuntimeConfig> {
        if ns == 0 {
            return Err(Error::InvalidArgument("preemption_interval_ns must be non-zero"));
        }
        self.preemption_interval_ns = ns;
        Ok(self)
    }
}

/// An initialized runtime. There is at most one live at a time, matching
/// spec §6's "single global runtime instance" design note; `Runtime::init`
/// fails if one is already running rather than silently reinitializing.
pub struct Runtime {
    _private: (),
}

impl Runtime {
    /// `uthread_init`: install the scheduler singleton and arm the
    /// preemption timer.
    pub fn init(config: RuntimeConfig) -> Result<Runtime> {
        if scheduler::is_initialized() {
            return Err(Error::InvalidArgument("runtime is already initialized"));
        }
        scheduler::init(config.policy, config.timeslice_ns);
        crate::preempt::arm(config.preemption_interval_ns);
        log::info!(
            "uthread runtime initialized: policy={:?} timeslice_ns={}",
            config.policy,
            config.timeslice_ns
        );
        Ok(Runtime { _private: () })
    }

    /// `uthread_shutdown`: disarm the timer and drop every thread table
    /// entry, including any still-live, non-terminated threads (spec §6
    /// "shutdown is unconditional"). Consumes `self` so a caller cannot
    /// use the handle afterward.
    pub fn shutdown(self) {
        crate::preempt::disarm();
        let count = scheduler::thread_count();
        if count > 1 {
            log::warn!("shutting down runtime with {} live thread(s)", count - 1);
        }
        scheduler::shutdown();
        log::info!("uthread runtime shut down");
    }

    pub fn stats(&self) -> Snapshot {
        stats::snapshot()
    }

    pub fn debug_dump(&self) -> String {
        scheduler::debug_dump()
    }

    /// Adjust the shared round-robin/fixed-priority timeslice at
    /// runtime. A no-op under the fair policy (spec §6).
    pub fn set_timeslice_ns(&self, ns: u64) -> Result<()> {
        if ns == 0 {
            return Err(Error::InvalidArgument("timeslice_ns must be non-zero"));
        }
        scheduler::set_timeslice_ns(ns);
        Ok(())
    }

    /// Change a live thread's fixed priority (spec §4.5's dynamic
    /// priority change, supplemented beyond the distilled operation
    /// table).
    pub fn set_thread_priority(&self, id: ThreadId, priority: u8) -> Result<()> {
        if priority > PRIORITY_MAX {
            return Err(Error::InvalidArgument("priority out of [0, 31]"));
        }
        scheduler::try_with_tcb(id, |tcb| tcb.priority = priority)
            .ok_or(Error::NoSuchThread("target thread no longer exists"))?;
        scheduler::update_priority(id);
        Ok(())
    }

    /// Change a live thread's fair-policy nice value (spec §4.6).
    pub fn set_thread_nice(&self, id: ThreadId, nice: i8) -> Result<()> {
        if !(NICE_MIN..=NICE_MAX).contains(&nice) {
            return Err(Error::InvalidArgument("nice out of [-20, 19]"));
        }
        scheduler::try_with_tcb(id, |tcb| {
            tcb.nice = nice;
            tcb.weight = scheduler::nice_to_weight(nice);
        })
        .ok_or(Error::NoSuchThread("target thread no longer exists"))?;
        scheduler::update_priority(id);
        Ok(())
    }

    /// Enable or disable preemption while the runtime stays alive (spec §6
    /// "Scheduler control"). The timer keeps ticking and per-tick
    /// accounting keeps running either way; disabling only suppresses the
    /// forced reschedule `tick` would otherwise take.
    pub fn set_preemption_enabled(&self, enabled: bool) {
        crate::preempt::set_preemption_enabled(enabled);
    }
}
