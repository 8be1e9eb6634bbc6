//! Epoch-based quiescence primitive.
//!
//! This is the small external dependency the RCU engine builds on: one
//! global epoch counter per domain and a per-CPU record of whether that CPU
//! is active and at what epoch it last entered. `synchronize_with_callback`
//! is the only non-trivial operation; everything about *how* to wait on a
//! still-active CPU (the grace-period waiter's pin/migrate/boost policy) is
//! deliberately left to the caller's callback.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::sched::smp::MAX_CPUS;

#[repr(align(64))]
struct EpochRecord {
    active: AtomicBool,
    snapshot: AtomicU64,
}

impl EpochRecord {
    const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            snapshot: AtomicU64::new(0),
        }
    }
}

/// One independent epoch domain: a monotonic counter plus a fixed per-CPU
/// record array, one entry per CPU this kernel build supports.
pub struct EpochDomain {
    counter: AtomicU64,
    records: [EpochRecord; MAX_CPUS],
}

impl EpochDomain {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            records: [const { EpochRecord::new() }; MAX_CPUS],
        }
    }

    /// Mark `cpu`'s record active at the domain's current epoch. The caller
    /// is responsible for ensuring this only happens on a 0->1 recursion
    /// transition and while pinned to `cpu`.
    pub fn begin(&self, cpu: u8) {
        let snapshot = self.counter.load(Ordering::Acquire);
        self.records[cpu as usize]
            .snapshot
            .store(snapshot, Ordering::Relaxed);
        self.records[cpu as usize]
            .active
            .store(true, Ordering::Release);
    }

    /// Clear `cpu`'s active mark.
    pub fn end(&self, cpu: u8) {
        self.records[cpu as usize]
            .active
            .store(false, Ordering::Release);
    }

    /// Advance the domain's epoch and invoke `callback(cpu)` for every CPU
    /// record that is still active at an epoch older than the new target,
    /// re-invoking it after each attempt until that CPU either releases or
    /// re-enters at or after the target. Returns once every record has
    /// advanced past the target or gone inactive.
    pub fn synchronize_with_callback(&self, mut callback: impl FnMut(u8)) {
        crate::arch::barriers::memory_fence();
        let target = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        for cpu in 0..MAX_CPUS as u8 {
            loop {
                let record = &self.records[cpu as usize];
                if !record.active.load(Ordering::Acquire) {
                    break;
                }
                if record.snapshot.load(Ordering::Acquire) >= target {
                    break;
                }
                callback(cpu);
            }
        }
        crate::arch::barriers::memory_fence();
    }
}

impl Default for EpochDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_record_never_blocks_synchronize() {
        let domain = EpochDomain::new();
        let mut calls = 0u32;
        domain.synchronize_with_callback(|_| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    fn active_record_blocks_until_released() {
        let domain = EpochDomain::new();
        domain.begin(0);
        let mut calls = 0u32;
        domain.synchronize_with_callback(|cpu| {
            assert_eq!(cpu, 0);
            calls += 1;
            if calls == 3 {
                domain.end(0);
            }
        });
        assert_eq!(calls, 3);
    }
}
