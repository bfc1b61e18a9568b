//! Two-phase counting allocator.
//!
//! The orchestrator reserves all its memory during an `Init` phase and then
//! transitions to `Static`, after which allocation is expected to cease.
//! The transition is a contract marker, not an enforcement point: the
//! allocator keeps serving requests in both phases so diagnostics and the
//! standard library keep working, and the "no allocation after init"
//! property is verified by tests watching `total_allocated`.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Allocation phase; the transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AllocPhase {
    /// Startup: components are reserving their fixed capacity.
    Init = 0,
    /// Steady state: no further growth expected.
    Static = 1,
}

/// Counting wrapper over the system allocator.
///
/// Usable as `#[global_allocator]`:
///
/// ```rust,ignore
/// #[global_allocator]
/// static ALLOCATOR: StaticAllocator = StaticAllocator::new();
/// ```
pub struct StaticAllocator {
    phase: AtomicU8,
    total_allocated: AtomicUsize,
}

impl StaticAllocator {
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(AllocPhase::Init as u8),
            total_allocated: AtomicUsize::new(0),
        }
    }

    /// Declare initialization finished. One-way and idempotent.
    pub fn transition_to_static(&self) {
        self.phase
            .store(AllocPhase::Static as u8, Ordering::Release);
    }

    pub fn phase(&self) -> AllocPhase {
        if self.phase.load(Ordering::Acquire) == AllocPhase::Init as u8 {
            AllocPhase::Init
        } else {
            AllocPhase::Static
        }
    }

    pub fn is_static(&self) -> bool {
        self.phase() == AllocPhase::Static
    }

    /// Live heap bytes handed out through this allocator.
    pub fn total_allocated(&self) -> usize {
        self.total_allocated.load(Ordering::Acquire)
    }
}

impl Default for StaticAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for StaticAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.total_allocated
                .fetch_add(layout.size(), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        self.total_allocated
            .fetch_sub(layout.size(), Ordering::Relaxed);
    }
}
