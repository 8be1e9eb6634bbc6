//! Per-CPU bookkeeping: current CPU id and which thread is running where.
//!
//! Pin/unpin counters and CPU binding are per-*thread* state (a thread's pin
//! count must survive it being preempted and resumed elsewhere in the
//! registry bookkeeping), so they live on the thread object in `sched`
//! proper. This module owns only what is genuinely per-CPU: reading which
//! CPU is executing right now, and recording which thread last registered
//! itself there.

use core::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of CPUs this kernel build supports.
pub const MAX_CPUS: usize = 16;

static CURRENT_THREAD: [AtomicU64; MAX_CPUS] = [const { AtomicU64::new(0) }; MAX_CPUS];

/// Record which thread is now running on the current CPU.
pub fn set_current_thread_raw(id: u64) {
    CURRENT_THREAD[current_cpu_id() as usize].store(id, Ordering::Release);
}

/// Thread id recorded as running on the current CPU, 0 if none.
pub fn current_thread_raw() -> u64 {
    CURRENT_THREAD[current_cpu_id() as usize].load(Ordering::Acquire)
}

/// Read the identifier of the CPU executing this code right now.
pub fn current_cpu_id() -> u8 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: CPUID leaf 1 is always available; reading it has no side
        // effects beyond the instruction itself.
        unsafe {
            use core::arch::x86_64::__cpuid;
            let cpuid = __cpuid(0x1);
            (((cpuid.ebx >> 24) & 0xFF) as u8) % MAX_CPUS as u8
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: reading MPIDR_EL1 has no side effects.
        unsafe {
            let mpidr: u64;
            core::arch::asm!("mrs {}, MPIDR_EL1", out(reg) mpidr);
            ((mpidr & 0xFF) as u8) % MAX_CPUS as u8
        }
    }

    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    {
        // SAFETY: reading mhartid has no side effects.
        unsafe {
            let hartid: usize;
            core::arch::asm!("csrr {}, mhartid", out(reg) hartid);
            (hartid as u8) % MAX_CPUS as u8
        }
    }
}
