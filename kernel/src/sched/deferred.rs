//! Deferred-task primitive.
//!
//! A caller schedules a one-shot closure; it runs later, off the caller's
//! stack, when the scheduler gets a chance to drain the queue. A real
//! kernel services this from a dedicated workqueue thread; this build
//! drains it from the idle loop (see `sched::run`), which is enough to
//! honor "eventually runs, not immediately" for callers like the RCU
//! callback dispatcher.

extern crate alloc;
use alloc::{boxed::Box, collections::VecDeque};

use spin::Mutex;

use crate::sync::once_lock::GlobalState;

type Task = Box<dyn FnOnce() + Send>;

static QUEUE: GlobalState<Mutex<VecDeque<Task>>> = GlobalState::new();

/// Prepare the deferred-task queue. Call once during subsystem init.
pub fn init() {
    let _ = QUEUE.init(Mutex::new(VecDeque::new()));
}

/// Schedule `task` to run the next time the queue is drained.
pub fn schedule(task: impl FnOnce() + Send + 'static) {
    QUEUE.with(|queue| queue.lock().push_back(Box::new(task) as Task));
}

/// Run every task scheduled so far, in FIFO order, and report how many ran.
pub fn drain() -> usize {
    let pending = QUEUE
        .with(|queue| {
            let mut guard = queue.lock();
            core::mem::take(&mut *guard)
        })
        .unwrap_or_default();
    let n = pending.len();
    for task in pending {
        task();
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn tasks_run_in_fifo_order_on_drain() {
        init();
        static ORDER: AtomicU32 = AtomicU32::new(0);
        static SEEN: Mutex<Vec<u32>> = Mutex::new(Vec::new());
        use alloc::vec::Vec;
        for i in 0..3u32 {
            schedule(move || {
                ORDER.fetch_add(1, Ordering::Relaxed);
                SEEN.lock().push(i);
            });
        }
        let n = drain();
        assert_eq!(n, 3);
        assert_eq!(*SEEN.lock(), alloc::vec![0, 1, 2]);
    }
}
