//! Lock-free bump allocator for architectures whose early boot environment
//! cannot take a spinlock safely (AArch64 and RISC-V use this instead of
//! `linked_list_allocator`'s `LockedHeap`, which x86_64 uses).
//!
//! Allocation never fails by blocking: it's a single compare-exchange loop
//! over a monotonically increasing cursor. Deallocation is a no-op, which is
//! fine for a kernel heap that only ever grows during the lifetime the RCU
//! engine and its callback dispatcher care about; nothing here recycles
//! memory.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Bump allocator with no internal locking; safe for concurrent use via
/// `compare_exchange_weak` alone.
pub struct UnsafeBumpAllocator {
    start: AtomicUsize,
    size: AtomicUsize,
    next: AtomicUsize,
}

impl UnsafeBumpAllocator {
    pub const fn new() -> Self {
        Self {
            start: AtomicUsize::new(0),
            size: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
        }
    }

    /// Initialize the allocator with a memory region.
    ///
    /// # Safety
    ///
    /// `start..start+size` must be valid, writable, and not otherwise in use
    /// for the remainder of the kernel's lifetime.
    pub unsafe fn init(&self, start: *mut u8, size: usize) {
        let start_addr = start as usize;
        self.start.store(start_addr, Ordering::Relaxed);
        self.size.store(size, Ordering::Relaxed);
        self.next.store(start_addr, Ordering::Release);
    }

    /// Bytes allocated so far, bytes remaining.
    #[allow(dead_code)]
    pub fn stats(&self) -> (usize, usize) {
        let start = self.start.load(Ordering::Relaxed);
        let next = self.next.load(Ordering::Relaxed);
        let size = self.size.load(Ordering::Relaxed);
        let allocated = next - start;
        (allocated, size - allocated)
    }
}

impl Default for UnsafeBumpAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for UnsafeBumpAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let start = self.start.load(Ordering::Acquire);
        let region_size = self.size.load(Ordering::Acquire);
        if start == 0 {
            return ptr::null_mut();
        }

        let align = layout.align();
        let alloc_size = layout.size();

        loop {
            let current = self.next.load(Ordering::Acquire);
            let mask = align - 1;
            let aligned = (current + mask) & !mask;

            let Some(end) = aligned.checked_add(alloc_size) else {
                return ptr::null_mut();
            };
            if end > start + region_size {
                return ptr::null_mut();
            }

            if self
                .next
                .compare_exchange_weak(current, end, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return aligned as *mut u8;
            }
            core::hint::spin_loop();
        }
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // Bump allocator never reclaims.
    }
}

/// `linked_list_allocator`-shaped wrapper so `lib.rs` can expose the same
/// `get_allocator()` surface regardless of which backend an architecture
/// uses.
pub struct LockedUnsafeBumpAllocator {
    inner: UnsafeBumpAllocator,
}

impl LockedUnsafeBumpAllocator {
    pub const fn empty() -> Self {
        Self {
            inner: UnsafeBumpAllocator::new(),
        }
    }

    pub fn lock(&self) -> UnsafeBumpAllocatorGuard<'_> {
        UnsafeBumpAllocatorGuard { inner: &self.inner }
    }
}

pub struct UnsafeBumpAllocatorGuard<'a> {
    inner: &'a UnsafeBumpAllocator,
}

impl<'a> UnsafeBumpAllocatorGuard<'a> {
    /// # Safety
    ///
    /// See [`UnsafeBumpAllocator::init`].
    pub unsafe fn init(&mut self, start: *mut u8, size: usize) {
        self.inner.init(start, size);
    }

    pub fn allocate_first_fit(&mut self, layout: Layout) -> Result<NonNull<u8>, ()> {
        // SAFETY: delegates to the allocator this guard was created from.
        let ptr = unsafe { self.inner.alloc(layout) };
        NonNull::new(ptr).ok_or(())
    }

    /// # Safety
    ///
    /// `ptr` must have come from a prior `allocate_first_fit` call on this
    /// allocator.
    pub unsafe fn deallocate(&mut self, _ptr: NonNull<u8>, _layout: Layout) {
        // Bump allocator never reclaims.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_allocations_stay_within_region_and_dont_overlap() {
        let alloc = UnsafeBumpAllocator::new();
        let mut backing = [0u8; 256];
        // SAFETY: `backing` is a local array outlasting every use of `alloc`
        // in this test and is not otherwise aliased.
        unsafe { alloc.init(backing.as_mut_ptr(), backing.len()) };

        let layout = Layout::from_size_align(16, 8).unwrap();
        // SAFETY: `alloc` was just initialized above with a region sized to
        // hold both requested allocations.
        let a = unsafe { alloc.alloc(layout) };
        // SAFETY: same as above.
        let b = unsafe { alloc.alloc(layout) };
        assert!(!a.is_null());
        assert!(!b.is_null());
        assert_ne!(a, b);
        assert!((b as usize) >= (a as usize) + 16);
    }

    #[test]
    fn allocation_past_region_end_returns_null() {
        let alloc = UnsafeBumpAllocator::new();
        let mut backing = [0u8; 32];
        // SAFETY: `backing` is a local array outlasting every use of `alloc`
        // in this test and is not otherwise aliased.
        unsafe { alloc.init(backing.as_mut_ptr(), backing.len()) };

        let layout = Layout::from_size_align(64, 8).unwrap();
        // SAFETY: `alloc` is initialized; a too-large request returning null
        // rather than writing out of bounds is exactly what's under test.
        let ptr = unsafe { alloc.alloc(layout) };
        assert!(ptr.is_null());
    }

    #[test]
    fn uninitialized_allocator_returns_null() {
        let alloc = UnsafeBumpAllocator::new();
        let layout = Layout::from_size_align(8, 8).unwrap();
        // SAFETY: calling `alloc` before `init` is exactly what's under
        // test; the implementation checks `start == 0` and returns null
        // rather than dereferencing anything.
        let ptr = unsafe { alloc.alloc(layout) };
        assert!(ptr.is_null());
    }
}
