//! Thread attributes (spec §3 TCB fields, §6 "Attributes", §8 boundary
//! behaviors). Mirrors the teacher's habit of validating at the setter,
//! not at use time (`task_manager/cooperative.rs::add_priority_task`
//! checks its priority bound the moment it is given, not later).

use crate::error::{Error, Result};

pub const STACK_SIZE_MIN: usize = 16 * 1024;
pub const STACK_SIZE_MAX: usize = 8 * 1024 * 1024;
pub const STACK_SIZE_DEFAULT: usize = 64 * 1024;
pub const PRIORITY_MAX: u8 = 31;
pub const PRIORITY_DEFAULT: u8 = 16;
pub const NICE_MIN: i8 = -20;
pub const NICE_MAX: i8 = 19;
pub const NAME_MAX: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachState {
    Joinable,
    Detached,
}

/// Builder for a thread's creation-time attributes. Every setter validates
/// eagerly so a bad value is rejected at the call that introduced it,
/// matching spec §8's boundary-behavior table.
#[derive(Debug, Clone)]
pub struct ThreadAttr {
    stack_size: usize,
    priority: u8,
    nice: i8,
    detach: DetachState,
    name: Option<String>,
}

impl Default for ThreadAttr {
    fn default() -> Self {
        ThreadAttr {
            stack_size: STACK_SIZE_DEFAULT,
            priority: PRIORITY_DEFAULT,
            nice: 0,
            detach: DetachState::Joinable,
            name: None,
        }
    }
}

impl ThreadAttr {
    pub fn new() -> ThreadAttr {
        ThreadAttr::default()
    }

    pub fn set_stack_size(mut self, size: usize) -> Result<Self> {
        if !(STACK_SIZE_MIN..=STACK_SIZE_MAX).contains(&size) {
            return Err(Error::InvalidArgument("stack_size out of [16 KiB, 8 MiB]"));
        }
        self.stack_size = size;
        Ok(self)
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn set_priority(mut self, priority: u8) -> Result<Self> {
        if priority > PRIORITY_MAX {
            return Err(Error::InvalidArgument("priority out of [0, 31]"));
        }
        self.priority = priority;
        Ok(self)
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_nice(mut self, nice: i8) -> Result<Self> {
        if !(NICE_MIN..=NICE_MAX).contains(&nice) {
            return Err(Error::InvalidArgument("nice out of [-20, 19]"));
        }
        self.nice = nice;
        Ok(self)
    }

    pub fn nice(&self) -> i8 {
        self.nice
    }

    pub fn set_detach_state(mut self, detach: DetachState) -> Self {
        self.detach = detach;
        self
    }

    pub fn detach_state(&self) -> DetachState {
        self.detach
    }

    pub fn set_name(mut self, name: &str) -> Result<Self> {
        if name.len() > NAME_MAX {
            return Err(Error::InvalidArgument("name longer than 31 characters"));
        }
        self.name = Some(name.to_string());
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_each_field() {
        let attr = ThreadAttr::new()
            .set_stack_size(32 * 1024)
            .unwrap()
            .set_priority(7)
            .unwrap()
            .set_nice(-3)
            .unwrap()
            .set_detach_state(DetachState::Detached)
            .set_name("worker")
            .unwrap();
        assert_eq!(attr.stack_size(), 32 * 1024);
        assert_eq!(attr.priority(), 7);
        assert_eq!(attr.nice(), -3);
        assert_eq!(attr.detach_state(), DetachState::Detached);
        assert_eq!(attr.name(), Some("worker"));
    }

    #[test]
    fn stack_size_boundaries() {
        assert!(ThreadAttr::new().set_stack_size(STACK_SIZE_MIN).is_ok());
        assert!(ThreadAttr::new().set_stack_size(STACK_SIZE_MIN - 1).is_err());
        assert!(ThreadAttr::new().set_stack_size(STACK_SIZE_MAX).is_ok());
        assert!(ThreadAttr::new().set_stack_size(STACK_SIZE_MAX + 1).is_err());
    }

    #[test]
    fn priority_boundaries() {
        assert!(ThreadAttr::new().set_priority(0).is_ok());
        assert!(ThreadAttr::new().set_priority(31).is_ok());
        assert!(ThreadAttr::new().set_priority(32).is_err());
    }

    #[test]
    fn nice_boundaries() {
        assert!(ThreadAttr::new().set_nice(-20).is_ok());
        assert!(ThreadAttr::new().set_nice(19).is_ok());
        assert!(ThreadAttr::new().set_nice(-21).is_err());
        assert!(ThreadAttr::new().set_nice(20).is_err());
    }

    #[test]
    fn name_too_long_rejected() {
        let name: String = "a".repeat(32);
        assert!(ThreadAttr::new().set_name(&name).is_err());
        let name: String = "a".repeat(31);
        assert!(ThreadAttr::new().set_name(&name).is_ok());
    }
}
