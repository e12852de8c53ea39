//! Segregated-fit heap allocator.
//!
//! `smalloc` partitions a grow-only arena into boundary-tagged blocks and
//! indexes the free ones in nine segregated lists. The actual data
//! structures are defined in the `block` and `freelist` modules; the
//! allocation logic lives in [`heap`].

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use conquer_once::spin::OnceCell;
use spin::Mutex;

use crate::err::{AllocError, CanFail};
use crate::mem::brk::SbrkHeap;
use crate::mem::HeapAddr;

use self::block::ALIGNMENT;
use self::heap::SegregatedAllocator;

pub(crate) mod block;
pub mod check;
pub(crate) mod freelist;
pub mod heap;
#[cfg(test)]
pub(crate) mod testutil;

static PROCESS_HEAP: OnceCell<Mutex<SegregatedAllocator<SbrkHeap>>> = OnceCell::uninit();

/// Initializes the process-wide heap allocator over the program break.
///
/// Brings up the arena and its initial free region. Should be only run
/// once; later calls fail with [`AllocError::AlreadyInitialized`] and leave
/// the live arena untouched.
pub fn init_process_heap() -> CanFail<AllocError> {
    if PROCESS_HEAP.is_initialized() {
        return Err(AllocError::AlreadyInitialized);
    }

    let heap = SbrkHeap::new()?;
    let allocator = SegregatedAllocator::init(heap)?;
    let (lo, hi) = allocator.arena_bounds();

    PROCESS_HEAP
        .try_init_once(|| Mutex::new(allocator))
        .map_err(|_| AllocError::AlreadyInitialized)?;

    crate::info!("smalloc", "process heap online, arena {} - {}", lo, hi);

    Ok(())
}

/// Process-wide allocator façade.
///
/// Every method trusts that [`init_process_heap`] already ran; installing
/// the façade with `#[global_allocator]` and allocating before that is a
/// contract violation.
pub struct SyncHeapAllocator;

impl SyncHeapAllocator {
    pub const fn new() -> Self {
        Self
    }
}

unsafe impl GlobalAlloc for SyncHeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        PROCESS_HEAP
            .get_unchecked()
            .lock()
            .malloc(layout.size())
            .as_mut_ptr()
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        PROCESS_HEAP
            .get_unchecked()
            .lock()
            .free(HeapAddr::from_mut_ptr(ptr))
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        PROCESS_HEAP
            .get_unchecked()
            .lock()
            .calloc(1, layout.size())
            .as_mut_ptr()
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        PROCESS_HEAP
            .get_unchecked()
            .lock()
            .realloc(HeapAddr::from_mut_ptr(ptr), new_size)
            .as_mut_ptr()
    }
}
