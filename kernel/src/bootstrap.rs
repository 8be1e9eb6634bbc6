//! Staged kernel initialization.
//!
//! Each stage brings up one subsystem and logs its completion before the
//! next stage starts, so a hang during boot points at a specific stage in
//! the serial log rather than an opaque wedge. Ordering matters: the
//! scheduler must be registered before `sync::rcu::init()`, since RCU's
//! per-thread recursion-depth state lives on the thread object the
//! scheduler owns, and logging must be up before anything that might want
//! to report a failure.

use crate::{error::KernelResult, log_service, sched, sync};

/// Runs every boot stage in order. Returns on the first stage that fails so
/// the caller can decide whether to retry, report, or halt.
pub fn kernel_init() -> KernelResult<()> {
    stage1_arch();
    stage2_timer()?;
    stage3_logging();
    stage4_scheduler();
    stage5_rcu();
    Ok(())
}

fn stage1_arch() {
    crate::arch::timer::setup_timer(1);
    crate::println!("[BOOTSTRAP] Stage 1: architecture timer armed");
}

fn stage2_timer() -> KernelResult<()> {
    crate::timer::init()?;
    crate::println!("[BOOTSTRAP] Stage 2: timer wheel initialized");
    Ok(())
}

fn stage3_logging() {
    log_service::log_init();
    log_service::klog(log_service::LogLevel::Info, "bootstrap", "logging online");
    crate::println!("[BOOTSTRAP] Stage 3: log service initialized");
}

fn stage4_scheduler() {
    sched::init();
    crate::println!("[BOOTSTRAP] Stage 4: scheduler bookkeeping initialized");
}

fn stage5_rcu() {
    sync::rcu::init();
    crate::println!("[BOOTSTRAP] Stage 5: RCU engine initialized");
}

/// Entry point called from `_start` once `kernel_init` has returned
/// successfully. Never returns: control passes to the scheduler's idle
/// loop, which drains deferred RCU callbacks between interrupts.
pub fn run() -> ! {
    sched::run()
}
