//! Architecture abstraction layer.
//!
//! This is deliberately thin: the RCU engine and its waiter only need a
//! non-preemptible critical section (`disable_interrupts`), a way to halt or
//! idle the CPU, and a monotonic tick source. Everything else that a real
//! kernel needs from its architecture layer (paging, GDT/IDT, boot entry) is
//! the host kernel's concern, not the reclamation engine's.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "aarch64")]
pub use aarch64::*;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub mod riscv;

#[cfg(target_arch = "riscv64")]
pub mod riscv64;

#[cfg(target_arch = "riscv64")]
pub use riscv64::*;

// Common timer module
pub mod timer;

// Common memory barrier abstractions, used by the epoch primitive.
pub mod barriers;
