//! RISC-V architecture support (common for 32 and 64 bit).

pub mod timer;
