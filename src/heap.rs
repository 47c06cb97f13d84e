//! # Interrupt-Safe Heap
//!
//! First-fit heap (`linked_list_allocator::Heap`) behind the scheduler's
//! critical section. Tasks are allocated from interrupt context as well as
//! from the run loop, so the heap is locked by masking interrupts, never by
//! spinning: on a single core an exception spinning on a lock held by the
//! code it preempted never returns.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::RefCell;
use core::ptr::{self, NonNull};

use linked_list_allocator::Heap;

use crate::sync::{self, Mutex};

/// Heap usable as the `#[global_allocator]`.
pub struct CriticalHeap {
    heap: Mutex<RefCell<Heap>>,
}

impl CriticalHeap {
    /// A heap with no memory. Every allocation fails until [`init`](Self::init).
    pub const fn empty() -> Self {
        Self {
            heap: Mutex::new(RefCell::new(Heap::empty())),
        }
    }

    /// Hand `size` bytes starting at `start` to the heap.
    ///
    /// # Safety
    ///
    /// The region must be valid for reads and writes, unused by anything
    /// else for the rest of the program, and this must be called only once.
    pub unsafe fn init(&self, start: *mut u8, size: usize) {
        sync::critical_section(|cs| unsafe {
            self.heap.borrow_ref_mut(cs).init(start, size);
        });
    }

    /// Bytes currently handed out.
    pub fn used(&self) -> usize {
        sync::critical_section(|cs| self.heap.borrow_ref(cs).used())
    }

    pub fn free(&self) -> usize {
        sync::critical_section(|cs| self.heap.borrow_ref(cs).free())
    }
}

unsafe impl GlobalAlloc for CriticalHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        sync::critical_section(|cs| {
            self.heap
                .borrow_ref_mut(cs)
                .allocate_first_fit(layout)
                .map_or(ptr::null_mut(), NonNull::as_ptr)
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        sync::critical_section(|cs| {
            // Safety: `ptr` came from `alloc` on this heap with `layout`.
            unsafe { self.heap.borrow_ref_mut(cs).deallocate(ptr, layout) }
        });
    }
}
