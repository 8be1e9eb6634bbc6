//! AArch64 architecture support.
//!
//! Trimmed to the primitives the RCU engine and its waiter depend on:
//! interrupt disable/restore, CPU halt/idle, and a tick counter.

pub mod timer;

#[allow(dead_code)]
pub fn halt() -> ! {
    loop {
        // SAFETY: `wfe` suspends execution until woken by an event; no side
        // effects beyond CPU power state.
        unsafe {
            core::arch::asm!("wfe");
        }
    }
}

#[allow(dead_code)]
pub fn idle() {
    // SAFETY: see `halt`.
    unsafe {
        core::arch::asm!("wfe");
    }
}

/// Disable IRQs/FIQs for the duration of the returned guard, restoring the
/// prior DAIF state on drop.
///
/// `msr`/`mrs` on DAIF are privileged and only meaningful on the bare-metal
/// target; a host `cargo test` run gets a guard that only orders memory.
#[cfg(target_os = "none")]
pub fn disable_interrupts() -> impl Drop {
    struct InterruptGuard {
        was_enabled: bool,
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            if self.was_enabled {
                // SAFETY: `msr daifclr, #3` clears the IRQ and FIQ masks,
                // re-enabling interrupts that were enabled before the guard
                // was created. No memory side effects.
                unsafe {
                    core::arch::asm!("msr daifclr, #3", options(nomem, nostack));
                }
            }
        }
    }

    let daif: u64;
    // SAFETY: reading DAIF has no side effects; `msr daifset, #3` masks IRQ
    // and FIQ delivery. Together these save-and-disable without racing a
    // concurrent interrupt between the read and the mask.
    unsafe {
        core::arch::asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack));
        core::arch::asm!("msr daifset, #3", options(nomem, nostack));
    }
    InterruptGuard {
        was_enabled: (daif & (0b11 << 6)) == 0,
    }
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
