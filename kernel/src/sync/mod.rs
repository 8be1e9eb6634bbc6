//! Synchronization Primitives
//!
//! Safe synchronization and global state management for Rust 2024 edition.

pub mod epoch;
pub mod once_lock;
pub mod rcu;

pub use once_lock::{OnceLock, LazyLock, GlobalState};
