//! Architecture-independent timer interface

/// Get current timer tick count
pub fn get_ticks() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        crate::arch::x86_64::timer::get_ticks()
    }

    #[cfg(target_arch = "aarch64")]
    {
        crate::arch::aarch64::timer::get_ticks()
    }

    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    {
        crate::arch::riscv::timer::get_ticks()
    }
}

/// Milliseconds since boot. Each per-arch `tick()` fires at a 1ms period
/// once `setup_timer` has configured it, so the tick count doubles as a
/// millisecond counter; kept as a separate entry point so callers (e.g.
/// `log_service`) don't need to know that.
pub fn get_timestamp_ms() -> u64 {
    get_ticks()
}

/// Program the per-arch hardware timer to fire roughly every `interval_ms`.
pub fn setup_timer(interval_ms: u32) {
    #[cfg(target_arch = "x86_64")]
    {
        crate::arch::x86_64::timer::setup_timer(interval_ms);
    }

    #[cfg(target_arch = "aarch64")]
    {
        crate::arch::aarch64::timer::setup_timer(interval_ms);
    }

    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    {
        crate::arch::riscv::timer::setup_timer(interval_ms);
    }
}
