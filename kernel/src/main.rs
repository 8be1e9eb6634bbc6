#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![feature(abi_x86_interrupt)]
#![test_runner(talos_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

use talos_kernel::bootstrap;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    talos_kernel::println!("Talos kernel v{}", env!("CARGO_PKG_VERSION"));

    bootstrap::kernel_init().expect("kernel_init failed");

    #[cfg(test)]
    test_main();

    talos_kernel::println!("Talos kernel initialized successfully!");

    bootstrap::run();
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    talos_kernel::println!("[KERNEL PANIC] {}", info);
    talos_kernel::arch::halt();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    talos_kernel::test_framework::test_panic_handler(info)
}
