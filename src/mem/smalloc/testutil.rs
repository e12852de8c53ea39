//! Shared scaffolding for allocator tests.
//!
//! Tests run against fixed regions instead of the program break, so that
//! parallel test threads never contend for the real break.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::mem::brk::FixedHeap;

use super::heap::SegregatedAllocator;

/// Aligned scratch region owned by a test.
pub(crate) struct TestArena {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl TestArena {
    pub(crate) fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, 16).expect("bad test arena layout");
        let ptr = unsafe { std::alloc::alloc(layout) };

        Self {
            ptr: NonNull::new(ptr).expect("test arena allocation failed"),
            layout,
        }
    }

    pub(crate) fn heap(&mut self) -> FixedHeap {
        unsafe { FixedHeap::new(self.ptr, self.layout.size()) }
    }

    pub(crate) fn allocator(&mut self) -> SegregatedAllocator<FixedHeap> {
        SegregatedAllocator::init(self.heap()).expect("test arena too small")
    }
}

impl Drop for TestArena {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
