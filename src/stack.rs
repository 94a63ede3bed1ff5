//! Guarded stack provisioning (spec §4.1/§5 "Stack protection", component 1).
//!
//! The teacher provisions a thread's stack with a plain
//! `alloc::alloc::alloc(Layout::from_size_align(...))` (`task_manager/
//! preemptive.rs`) because on an embedded target there is no MMU-backed
//! guard page to ask for. On a hosted target there is: this port
//! `mmap`s the region and `mprotect`s one inaccessible page at the low
//! address, so a stack overflow faults the process instead of silently
//! corrupting whatever the allocator placed below it (spec §5).

use crate::error::{Error, Result};
use std::ptr::NonNull;

fn page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE never fails on a POSIX host.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// A thread's stack: a usable region plus (when available) one guard page
/// immediately below it.
pub struct Stack {
    /// Base of the *usable* region (lowest usable address).
    base: NonNull<u8>,
    /// Size in bytes of the usable region (excludes the guard page).
    size: usize,
    /// Base of the whole mapping, which is `base - guard_len` when a guard
    /// page is present, or equal to `base` otherwise.
    map_base: *mut libc::c_void,
    map_len: usize,
    guarded: bool,
    /// Which allocator owns `map_base`, so `Drop` frees it the right way.
    /// Can't be inferred from `guarded`/size alone: an `mmap` succeeding
    /// with its guard-page `mprotect` failing looks, size-wise, exactly
    /// like the `std::alloc` fallback (`map_len == size`, `guarded ==
    /// false`), but still must be freed with `munmap`.
    origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Mmap,
    StdAlloc,
}

// Stacks are moved between threads only while their owning TCB is moved;
// the memory itself is never concurrently accessed by two OS threads.
unsafe impl Send for Stack {}

impl Stack {
    /// Allocate a stack of `size` bytes with a guard page at the low
    /// address. Falls back to a plain (unguarded) allocation if the guard
    /// page cannot be installed, per spec §4.8.
    pub fn new(size: usize) -> Result<Stack> {
        let page = page_size();
        let total = size
            .checked_add(page)
            .ok_or(Error::OutOfMemory("stack size overflow"))?;

        // SAFETY: standard anonymous private mapping, checked below.
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Self::fallback(size);
        }

        // SAFETY: `map` is a valid mapping of `total` bytes; the guard
        // page is the first `page` bytes (stacks grow down, so the guard
        // must sit below the usable region).
        let guard_ok = unsafe { libc::mprotect(map, page, libc::PROT_NONE) } == 0;
        if !guard_ok {
            log::warn!("stack guard page mprotect failed, running without a guard page");
            // Usable region is the whole mapping; no offset applied.
            let base = NonNull::new(map as *mut u8).unwrap();
            return Ok(Stack {
                base,
                size: total,
                map_base: map,
                map_len: total,
                guarded: false,
                origin: Origin::Mmap,
            });
        }

        let usable = unsafe { (map as *mut u8).add(page) };
        Ok(Stack {
            base: NonNull::new(usable).unwrap(),
            size,
            map_base: map,
            map_len: total,
            guarded: true,
            origin: Origin::Mmap,
        })
    }

    fn fallback(size: usize) -> Result<Stack> {
        log::warn!("stack guard page mapping failed, falling back to a plain allocation");
        let layout = std::alloc::Layout::from_size_align(size, 16)
            .map_err(|_| Error::InvalidArgument("bad stack size/alignment"))?;
        // SAFETY: layout has non-zero size (validated by create()).
        let ptr = unsafe { std::alloc::alloc(layout) };
        let base = NonNull::new(ptr).ok_or(Error::OutOfMemory("stack allocation failed"))?;
        Ok(Stack {
            base,
            size,
            map_base: ptr as *mut libc::c_void,
            map_len: size,
            guarded: false,
            origin: Origin::StdAlloc,
        })
    }

    /// Lowest address of the usable (non-guard) region.
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Highest address of the usable region plus one — the initial stack
    /// pointer value for a downward-growing stack.
    pub fn top(&self) -> *mut u8 {
        // SAFETY: stays within the usable region by construction.
        unsafe { self.base.as_ptr().add(self.size) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_guard_page(&self) -> bool {
        self.guarded
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        match self.origin {
            Origin::Mmap => {
                // SAFETY: map_base/map_len describe the mmap'd region created above.
                unsafe {
                    libc::munmap(self.map_base, self.map_len);
                }
            }
            Origin::StdAlloc => {
                let layout = std::alloc::Layout::from_size_align(self.map_len, 16).unwrap();
                // SAFETY: matches the allocation in `fallback`.
                unsafe {
                    std::alloc::dealloc(self.map_base as *mut u8, layout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_usable_region_of_requested_size() {
        let stack = Stack::new(64 * 1024).unwrap();
        assert_eq!(stack.size(), 64 * 1024);
        assert!(!stack.base().is_null());
        // SAFETY: top is base + size, both within the mapping.
        assert_eq!(unsafe { stack.top().offset_from(stack.base()) }, 64 * 1024);
    }

    #[test]
    fn guard_page_present_on_this_platform() {
        let stack = Stack::new(16 * 1024).unwrap();
        assert!(stack.has_guard_page());
    }
}
