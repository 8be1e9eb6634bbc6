//! Thread identity and scheduling priority.
//!
//! The grace-period waiter needs to compare and temporarily raise thread
//! priorities; it does not need a full task control block (stacks, page
//! tables, context switching are a real scheduler's concern).

use core::sync::atomic::{AtomicU64, Ordering};

/// Task priority levels, highest first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Real-time highest priority
    RealTimeHigh = 0,
    /// Real-time normal priority
    RealTimeNormal = 10,
    /// Real-time low priority
    RealTimeLow = 20,
    /// System high priority
    SystemHigh = 30,
    /// System normal priority
    SystemNormal = 40,
    /// User high priority
    UserHigh = 50,
    /// User normal priority
    #[default]
    UserNormal = 60,
    /// User low priority
    UserLow = 70,
    /// Idle priority
    Idle = 99,
}

impl Priority {
    /// The higher of `self` and `other` (lower numeric value wins).
    pub fn max(self, other: Self) -> Self {
        if (self as u8) <= (other as u8) {
            self
        } else {
            other
        }
    }

    /// The lower-precedence of `self` and `other` (higher numeric value
    /// wins). The grace-period waiter folds a CPU's pinned readers with this
    /// to find the worst of them, then boosts itself to match: it must not
    /// outrank any reader it is waiting on (§4.3, "boost itself no higher
    /// than the readers' lowest precedence").
    pub fn worst(self, other: Self) -> Self {
        if (self as u8) >= (other as u8) {
            self
        } else {
            other
        }
    }
}

/// Thread identifier, unique for the lifetime of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new thread ID.
pub fn alloc_tid() -> ThreadId {
    ThreadId(NEXT_TID.fetch_add(1, Ordering::Relaxed))
}
