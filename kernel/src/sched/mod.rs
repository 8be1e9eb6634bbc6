//! Minimal scheduler interface.
//!
//! The grace-period waiter in `sync::rcu` needs exactly four things from the
//! scheduler: the identity and priority of a thread, whether it is currently
//! sleeping, a way to temporarily bind itself to another CPU, and a way to
//! yield the processor while boosting its own priority. Everything else a
//! real scheduler does (run queues, load balancing, context switching) is
//! out of scope here.

pub mod deferred;
pub mod smp;
pub mod task;

pub use task::{Priority, ThreadId};

use spin::Mutex;

const MAX_THREADS: usize = 64;

/// Number of independent RCU type tags a thread carries recursion-depth
/// state for. Kept here, not in `sync::rcu`, because this state lives on
/// the host thread object per the engine's external interface.
pub const RCU_TYPE_COUNT: usize = 2;

#[derive(Clone, Copy)]
struct ThreadState {
    id: ThreadId,
    priority: Priority,
    sleeping: bool,
    bound_cpu: Option<u8>,
    pin_count: u32,
    pinned_cpu: Option<u8>,
    rcu_depth: [u32; RCU_TYPE_COUNT],
}

static THREAD_TABLE: [Mutex<Option<ThreadState>>; MAX_THREADS] =
    [const { Mutex::new(None) }; MAX_THREADS];

/// Global scheduler run-queue lock. The grace-period waiter drops this
/// across `yield_now` and reacquires it on return, mirroring how a real
/// scheduler hands off the run queue during a context switch: holding it
/// across the switch would deadlock against the thread being switched to.
static THREAD_LOCK: Mutex<()> = Mutex::new(());

fn find_slot(id: ThreadId) -> Option<usize> {
    THREAD_TABLE.iter().position(|slot| {
        slot.lock()
            .as_ref()
            .map(|state| state.id == id)
            .unwrap_or(false)
    })
}

/// Register the calling thread with the scheduler, returning its new id.
/// Call once per thread of execution before it does anything RCU cares
/// about (bootstrap does this for CPU 0's boot thread).
pub fn register_current_thread() -> ThreadId {
    let id = task::alloc_tid();
    let state = ThreadState {
        id,
        priority: Priority::default(),
        sleeping: false,
        bound_cpu: None,
        pin_count: 0,
        pinned_cpu: None,
        rcu_depth: [0; RCU_TYPE_COUNT],
    };
    for slot in THREAD_TABLE.iter() {
        let mut guard = slot.lock();
        if guard.is_none() {
            *guard = Some(state);
            break;
        }
    }
    smp::set_current_thread_raw(id.0);
    id
}

/// Thread id of whatever is running on the current CPU. Panics if nothing
/// has registered yet (bootstrap bug).
pub fn current_thread_id() -> ThreadId {
    let raw = smp::current_thread_raw();
    assert!(raw != 0, "no thread registered on this CPU");
    ThreadId(raw)
}

/// Priority of the given thread, if it is still registered.
pub fn priority_of(id: ThreadId) -> Option<Priority> {
    find_slot(id).and_then(|i| THREAD_TABLE[i].lock().as_ref().map(|s| s.priority))
}

/// Priority of the calling thread.
pub fn current_priority() -> Priority {
    priority_of(current_thread_id()).unwrap_or_default()
}

/// Set the priority of the given thread.
pub fn set_priority(id: ThreadId, priority: Priority) {
    if let Some(i) = find_slot(id) {
        if let Some(state) = THREAD_TABLE[i].lock().as_mut() {
            state.priority = priority;
        }
    }
}

/// Whether the given thread is currently marked as sleeping (blocked,
/// off-CPU).
pub fn is_sleeping(id: ThreadId) -> Option<bool> {
    find_slot(id).and_then(|i| THREAD_TABLE[i].lock().as_ref().map(|s| s.sleeping))
}

/// Mark the calling thread as sleeping or runnable.
pub fn set_sleeping(sleeping: bool) {
    let id = current_thread_id();
    if let Some(i) = find_slot(id) {
        if let Some(state) = THREAD_TABLE[i].lock().as_mut() {
            state.sleeping = sleeping;
        }
    }
}

/// Bind the calling thread to `cpu` at the given priority, so the next
/// scheduling decision places it there. Returns the previous binding and
/// priority so the caller can restore them.
pub fn bind_to_cpu(cpu: u8, priority: Priority) -> (Option<u8>, Priority) {
    let id = current_thread_id();
    let prev_priority = current_priority();
    let prev_cpu = find_slot(id).and_then(|i| {
        THREAD_TABLE[i].lock().as_mut().map(|state| {
            let prev = state.bound_cpu;
            state.bound_cpu = Some(cpu);
            state.priority = priority;
            prev
        })
    });
    (prev_cpu.flatten(), prev_priority)
}

/// Restore a binding previously returned by `bind_to_cpu`.
pub fn restore_binding(cpu: Option<u8>, priority: Priority) {
    let id = current_thread_id();
    if let Some(i) = find_slot(id) {
        if let Some(state) = THREAD_TABLE[i].lock().as_mut() {
            state.bound_cpu = cpu;
            state.priority = priority;
        }
    }
}

/// Pin the calling thread to the CPU it is currently running on, so it will
/// not migrate until a matching `unpin`. Nested pins stack; only the
/// outermost call fixes `pinned_cpu`. Returns the CPU the thread is now
/// pinned to.
pub fn pin() -> u8 {
    let id = current_thread_id();
    let slot = find_slot(id).expect("current thread not registered");
    let mut guard = THREAD_TABLE[slot].lock();
    let state = guard.as_mut().expect("current thread not registered");
    if state.pin_count == 0 {
        state.pinned_cpu = Some(smp::current_cpu_id());
    }
    state.pin_count += 1;
    state.pinned_cpu.expect("pin_count > 0 implies pinned_cpu is set")
}

/// Release one level of pinning. Fatal assertion on underflow.
pub fn unpin() {
    let id = current_thread_id();
    let slot = find_slot(id).expect("current thread not registered");
    let mut guard = THREAD_TABLE[slot].lock();
    let state = guard.as_mut().expect("current thread not registered");
    assert!(state.pin_count > 0, "unpin without matching pin");
    state.pin_count -= 1;
    if state.pin_count == 0 {
        state.pinned_cpu = None;
    }
}

/// The calling thread's current pin count and pinned CPU, if any.
pub fn pin_state() -> (u32, Option<u8>) {
    let id = current_thread_id();
    find_slot(id)
        .and_then(|i| THREAD_TABLE[i].lock().as_ref().map(|s| (s.pin_count, s.pinned_cpu)))
        .unwrap_or((0, None))
}

/// Forcibly set the calling thread's pin count and pinned CPU. Used only by
/// the grace-period waiter to clear its own pinning before waiting and
/// restore it afterward.
pub fn set_pin_state(pin_count: u32, pinned_cpu: Option<u8>) {
    let id = current_thread_id();
    if let Some(i) = find_slot(id) {
        if let Some(state) = THREAD_TABLE[i].lock().as_mut() {
            state.pin_count = pin_count;
            state.pinned_cpu = pinned_cpu;
        }
    }
}

/// Recursion depth the calling thread currently holds for RCU type
/// `type_idx`.
pub fn rcu_depth(type_idx: usize) -> u32 {
    let id = current_thread_id();
    find_slot(id)
        .and_then(|i| THREAD_TABLE[i].lock().as_ref().map(|s| s.rcu_depth[type_idx]))
        .unwrap_or(0)
}

/// Increment the calling thread's recursion depth for `type_idx`, returning
/// the new depth.
pub fn rcu_depth_enter(type_idx: usize) -> u32 {
    let id = current_thread_id();
    let slot = find_slot(id).expect("current thread not registered");
    let mut guard = THREAD_TABLE[slot].lock();
    let state = guard.as_mut().expect("current thread not registered");
    state.rcu_depth[type_idx] += 1;
    state.rcu_depth[type_idx]
}

/// Decrement the calling thread's recursion depth for `type_idx`, returning
/// the new depth. Fatal assertion on underflow (begin/end imbalance).
pub fn rcu_depth_exit(type_idx: usize) -> u32 {
    let id = current_thread_id();
    let slot = find_slot(id).expect("current thread not registered");
    let mut guard = THREAD_TABLE[slot].lock();
    let state = guard.as_mut().expect("current thread not registered");
    assert!(
        state.rcu_depth[type_idx] > 0,
        "rcu begin/end imbalance: depth underflow"
    );
    state.rcu_depth[type_idx] -= 1;
    state.rcu_depth[type_idx]
}

/// Yield the CPU, dropping and reacquiring the scheduler run-queue lock
/// across the switch. Real rescheduling is out of scope here; this is the
/// point where a full scheduler would pick the next runnable thread.
pub fn yield_now() {
    let guard = THREAD_LOCK.lock();
    drop(guard);
    core::hint::spin_loop();
    let _guard = THREAD_LOCK.lock();
}

/// Busy-wait for approximately one scheduler tick, used as the waiter's
/// bounded short sleep when a blocking reader is itself sleeping.
pub fn short_sleep_one_tick() {
    let start = crate::arch::timer::get_ticks();
    while crate::arch::timer::get_ticks() == start {
        core::hint::spin_loop();
    }
}

/// Bring up the scheduler's bookkeeping for the boot CPU.
pub fn init() {
    register_current_thread();
}

/// Idle loop: drains whatever the deferred-task queue has accumulated (the
/// RCU callback dispatcher schedules its drain here), then idles until the
/// next interrupt.
pub fn run() -> ! {
    loop {
        deferred::drain();
        crate::arch::idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_query_priority() {
        let id = register_current_thread();
        assert_eq!(priority_of(id), Some(Priority::UserNormal));
        set_priority(id, Priority::RealTimeHigh);
        assert_eq!(priority_of(id), Some(Priority::RealTimeHigh));
    }

    #[test]
    fn sleeping_flag_round_trips() {
        register_current_thread();
        assert_eq!(is_sleeping(current_thread_id()), Some(false));
        set_sleeping(true);
        assert_eq!(is_sleeping(current_thread_id()), Some(true));
    }
}
