//! Generic serial console, backing the `print!`/`println!` and
//! `serial_print!`/`serial_println!` macros.
//!
//! This crate has no VGA or framebuffer driver (out of scope: §1 treats
//! driver personality shims as external collaborators), so both macro
//! families share the same backend. x86_64 uses the `uart_16550` crate
//! against COM1; AArch64 and RISC-V write a platform UART directly, since
//! QEMU's `virt` machine leaves it pre-initialized by firmware.

use core::fmt;

#[cfg(target_arch = "aarch64")]
struct Pl011Uart {
    base_addr: usize,
}

#[cfg(target_arch = "aarch64")]
impl fmt::Write for Pl011Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        const UARTDR: usize = 0x000;
        for &byte in s.as_bytes() {
            // SAFETY: `base_addr` is the PL011 data register on the QEMU
            // virt machine, mapped and writable throughout the kernel's
            // lifetime.
            unsafe {
                core::ptr::write_volatile((self.base_addr + UARTDR) as *mut u8, byte);
            }
        }
        Ok(())
    }
}

#[cfg(target_arch = "riscv64")]
struct Uart16550Compat {
    base_addr: usize,
}

#[cfg(target_arch = "riscv64")]
impl fmt::Write for Uart16550Compat {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        const THR: usize = 0x00;
        const LSR: usize = 0x05;
        const LSR_THRE: u8 = 1 << 5;
        for byte in s.bytes() {
            // SAFETY: `base_addr` is the ns16550-compatible UART on the
            // QEMU virt machine, mapped throughout the kernel's lifetime.
            // The line-status poll only reads that register before the
            // transmit-holding-register write.
            unsafe {
                while core::ptr::read_volatile((self.base_addr + LSR) as *const u8) & LSR_THRE == 0
                {
                    core::hint::spin_loop();
                }
                core::ptr::write_volatile((self.base_addr + THR) as *mut u8, byte);
            }
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;

    #[cfg(target_arch = "x86_64")]
    {
        use uart_16550::SerialPort;
        use x86_64::instructions::interrupts;

        interrupts::without_interrupts(|| {
            // SAFETY: 0x3F8 is the standard COM1 I/O port base, present on
            // every target this kernel boots on.
            let mut port = unsafe { SerialPort::new(0x3F8) };
            port.init();
            let _ = port.write_fmt(args);
        });
    }

    #[cfg(target_arch = "aarch64")]
    {
        let mut uart = Pl011Uart {
            base_addr: 0x0900_0000,
        };
        let _ = uart.write_fmt(args);
    }

    #[cfg(target_arch = "riscv64")]
    {
        let mut uart = Uart16550Compat {
            base_addr: 0x1000_0000,
        };
        let _ = uart.write_fmt(args);
    }
}
