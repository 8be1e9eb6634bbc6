//! no_std test framework for the bare-metal target.
//!
//! Bare-metal (`target_os = "none"`) builds have no process to return an
//! exit code from, so results are reported over the serial console and the
//! run terminates via a QEMU-specific exit device / power-off call. Host
//! builds use the standard `#[test]` harness instead and never touch this
//! module's `test_runner`.

use core::panic::PanicInfo;

use crate::{error::KernelError, serial_print, serial_println};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub trait Testable {
    fn run(&self) -> Result<(), KernelError>;
}

impl<T> Testable for T
where
    T: Fn() -> Result<(), KernelError>,
{
    fn run(&self) -> Result<(), KernelError> {
        serial_print!("{}...\t", core::any::type_name::<T>());
        match self() {
            Ok(()) => {
                serial_println!("[ok]");
                Ok(())
            }
            Err(e) => {
                serial_println!("[failed]: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    serial_println!("Running {} tests", tests.len());
    let mut passed = 0;
    let mut failed = 0;

    for test in tests {
        match test.run() {
            Ok(()) => passed += 1,
            Err(_) => failed += 1,
        }
    }

    serial_println!("\nTest Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        exit_qemu(QemuExitCode::Success);
    } else {
        exit_qemu(QemuExitCode::Failed);
    }
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
}

/// Leave QEMU. x86_64 uses the `isa-debug-exit` device at port 0xf4;
/// AArch64 and RISC-V have no such device on the `virt` machine, so they
/// power off via PSCI / SBI instead and ignore the exit code.
pub fn exit_qemu(_exit_code: QemuExitCode) -> ! {
    #[cfg(target_arch = "x86_64")]
    {
        use x86_64::instructions::port::Port;
        // SAFETY: port 0xf4 is QEMU's isa-debug-exit device, present because
        // this kernel's run configuration always adds it.
        unsafe {
            let mut port = Port::new(0xf4);
            port.write(_exit_code as u32);
        }
        loop {
            core::hint::spin_loop();
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        const PSCI_SYSTEM_OFF: u32 = 0x8400_0008;
        // SAFETY: PSCI SYSTEM_OFF is a standard firmware call; the HVC
        // instruction here only ever runs in the bare-metal test binary.
        unsafe {
            core::arch::asm!(
                "mov w0, {psci_off:w}",
                "hvc #0",
                psci_off = in(reg) PSCI_SYSTEM_OFF,
                options(noreturn)
            );
        }
    }

    #[cfg(target_arch = "riscv64")]
    {
        const SBI_SHUTDOWN: usize = 8;
        // SAFETY: SBI shutdown (EID 8) is a standard RISC-V SBI call; the
        // ecall here only ever runs in the bare-metal test binary.
        unsafe {
            core::arch::asm!(
                "li a7, {sbi_shutdown}",
                "ecall",
                sbi_shutdown = const SBI_SHUTDOWN,
                options(noreturn)
            );
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")))]
    loop {
        core::hint::spin_loop();
    }
}

/// Like `assert!`, but reports over the serial console instead of panicking
/// with the default formatter (useful from a `#[panic_handler]` that itself
/// routes through `serial_println!`).
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {
        if !$cond {
            $crate::serial_println!("Assertion failed: {}", stringify!($cond));
            panic!("Assertion failed");
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::serial_println!($($arg)*);
            panic!("Assertion failed");
        }
    };
}

#[macro_export]
macro_rules! kernel_assert_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            $crate::serial_println!(
                "Assertion failed: {} != {}\n  left: {:?}\n right: {:?}",
                stringify!($left),
                stringify!($right),
                $left,
                $right
            );
            panic!("Assertion failed: not equal");
        }
    };
}
