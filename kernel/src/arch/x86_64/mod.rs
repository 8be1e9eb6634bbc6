//! x86_64 architecture support.
//!
//! Trimmed to the primitives the RCU engine and its waiter depend on:
//! interrupt disable/restore, CPU halt/idle, and a tick counter. Boot setup
//! (GDT/IDT/paging/PIC) is the host kernel's concern, not the reclamation
//! engine's, and is not reproduced here.

#![allow(clippy::missing_safety_doc)]

pub mod timer;

/// Halt the CPU. Used by panic paths.
#[allow(dead_code)]
pub fn halt() -> ! {
    use x86_64::instructions::{hlt, interrupts};
    interrupts::disable();
    loop {
        hlt();
    }
}

/// Enable hardware interrupts.
#[allow(dead_code)]
pub fn enable_interrupts() {
    x86_64::instructions::interrupts::enable();
}

/// Disable interrupts for the duration of the returned guard, restoring the
/// prior state (rather than unconditionally re-enabling) on drop.
///
/// RCU's `begin`/`end` wrap their epoch mark and reader-registry update in
/// this guard: a preemption between the two would let the registry and the
/// epoch primitive's record disagree about whether the thread is reading.
///
/// `cli`/`sti` are privileged instructions that fault in an unprivileged
/// `cargo test` process, so only the bare-metal target executes them; host
/// builds (including `sync::rcu`'s own `#[test]` module) get a guard that
/// only orders memory, since there is no interrupt controller to mask.
#[cfg(target_os = "none")]
pub fn disable_interrupts() -> impl Drop {
    struct InterruptGuard {
        was_enabled: bool,
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            if self.was_enabled {
                x86_64::instructions::interrupts::enable();
            }
        }
    }

    let was_enabled = x86_64::instructions::interrupts::are_enabled();
    x86_64::instructions::interrupts::disable();
    InterruptGuard { was_enabled }
}

#[cfg(not(target_os = "none"))]
pub fn disable_interrupts() -> impl Drop {
    struct InterruptGuard;

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        }
    }

    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    InterruptGuard
}

/// Idle the CPU until the next interrupt.
pub fn idle() {
    x86_64::instructions::hlt();
}
