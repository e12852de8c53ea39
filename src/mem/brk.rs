//! Heap arena primitives.
//!
//! A [`HeapSource`] hands out a contiguous, never-shrinking byte range that
//! the allocator partitions into blocks. [`SbrkHeap`] grows the range by
//! moving the program break, [`FixedHeap`] serves a region the caller
//! already owns.

use core::ptr::NonNull;

use libc::{c_void, intptr_t};

use crate::err::AllocError;
use crate::mem::utils::round_up;
use crate::mem::{Alignment, HeapAddr};

/// Page size assumed when the platform refuses to report one.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Grow-only contiguous byte arena consumed by the allocator.
///
/// Successive extensions must be adjacent: the range `[lo, hi)` stays
/// contiguous for the lifetime of the source. The allocator is the single
/// writer of the underlying bytes; for [`SbrkHeap`] this means no other
/// component of the process may move the program break.
pub trait HeapSource {
    /// Grows the arena by `n` bytes and returns the previous upper bound,
    /// which is the base of the new region.
    ///
    /// On failure the arena is left untouched.
    fn extend(&mut self, n: usize) -> Result<HeapAddr, AllocError>;

    /// Lower bound of the arena.
    fn lo(&self) -> HeapAddr;

    /// Upper bound of the arena, one past the last usable byte.
    fn hi(&self) -> HeapAddr;

    /// Page size of the backing memory, used for initial sizing only.
    fn page_size(&self) -> usize;
}

/// Heap arena backed by the program break.
///
/// Construction records the current break as the arena base, after rounding
/// it up to a 16-byte boundary so that every block base derived from it
/// stays aligned.
pub struct SbrkHeap {
    lo: HeapAddr,
    hi: HeapAddr,
    page_size: usize,
}

impl SbrkHeap {
    pub fn new() -> Result<Self, AllocError> {
        let brk = unsafe { libc::sbrk(0) };
        if brk == usize::MAX as *mut c_void {
            return Err(AllocError::OutOfMemory);
        }

        // The break inherited from the C runtime is not necessarily
        // 16-byte aligned.
        let raw_base = brk as usize;
        let pad = round_up(raw_base, Alignment::ALIGN_16.bytes()) - raw_base;
        if pad != 0 {
            let adjusted = unsafe { libc::sbrk(pad as intptr_t) };
            if adjusted == usize::MAX as *mut c_void {
                return Err(AllocError::OutOfMemory);
            }
        }

        let page_size = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            -1 => FALLBACK_PAGE_SIZE,
            reported => reported as usize,
        };

        let base = HeapAddr::new(raw_base + pad);

        Ok(Self {
            lo: base,
            hi: base,
            page_size,
        })
    }
}

impl HeapSource for SbrkHeap {
    fn extend(&mut self, n: usize) -> Result<HeapAddr, AllocError> {
        let increment = intptr_t::try_from(n).map_err(|_| AllocError::OutOfMemory)?;

        let previous = unsafe { libc::sbrk(increment) };
        if previous == usize::MAX as *mut c_void {
            return Err(AllocError::OutOfMemory);
        }

        let previous = HeapAddr::from_mut_ptr(previous.cast::<u8>());
        self.hi = previous + n;

        Ok(previous)
    }

    fn lo(&self) -> HeapAddr {
        self.lo
    }

    fn hi(&self) -> HeapAddr {
        self.hi
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Heap arena carved out of a fixed region the caller owns.
///
/// Extension bumps a watermark through the region until its capacity is
/// exhausted, which surfaces as [`AllocError::OutOfMemory`] exactly like a
/// refused break move.
pub struct FixedHeap {
    base: HeapAddr,
    capacity: usize,
    watermark: usize,
}

impl FixedHeap {
    /// Creates a heap source over `capacity` bytes starting at `base`.
    ///
    /// # Safety
    ///
    /// The region must be writable for the lifetime of the source, and no
    /// other party may touch it while the allocator runs.
    pub unsafe fn new(base: NonNull<u8>, capacity: usize) -> Self {
        let base = HeapAddr::from_mut_ptr(base.as_ptr());

        assert!(
            base.is_aligned_with(Alignment::ALIGN_16),
            "fixed heap region must be 16-byte aligned"
        );

        Self {
            base,
            capacity,
            watermark: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl HeapSource for FixedHeap {
    fn extend(&mut self, n: usize) -> Result<HeapAddr, AllocError> {
        if n > self.capacity - self.watermark {
            return Err(AllocError::OutOfMemory);
        }

        let previous = self.base + self.watermark;
        self.watermark += n;

        Ok(previous)
    }

    fn lo(&self) -> HeapAddr {
        self.base
    }

    fn hi(&self) -> HeapAddr {
        self.base + self.watermark
    }

    fn page_size(&self) -> usize {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::alloc::Layout;

    struct Region {
        ptr: NonNull<u8>,
        layout: Layout,
    }

    impl Region {
        fn new(size: usize) -> Self {
            let layout = Layout::from_size_align(size, 16).unwrap();
            let ptr = unsafe { std::alloc::alloc(layout) };
            Self {
                ptr: NonNull::new(ptr).expect("test region allocation failed"),
                layout,
            }
        }
    }

    impl Drop for Region {
        fn drop(&mut self) {
            unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }

    #[test]
    fn fixed_heap_watermark() {
        let region = Region::new(4096);
        let mut heap = unsafe { FixedHeap::new(region.ptr, 4096) };

        assert_eq!(heap.lo(), heap.hi());

        let first = heap.extend(1024).unwrap();
        assert_eq!(first, heap.lo());
        assert_eq!(heap.hi() - heap.lo(), 1024);

        let second = heap.extend(512).unwrap();
        assert_eq!(second, heap.lo() + 1024);
        assert_eq!(heap.hi() - heap.lo(), 1536);
    }

    #[test]
    fn fixed_heap_exhaustion_leaves_bounds_untouched() {
        let region = Region::new(1024);
        let mut heap = unsafe { FixedHeap::new(region.ptr, 1024) };

        heap.extend(1024).unwrap();
        let hi = heap.hi();

        assert_eq!(heap.extend(16), Err(AllocError::OutOfMemory));
        assert_eq!(heap.hi(), hi);
    }

    #[test]
    fn sbrk_heap_extends_and_stays_writable() {
        let mut heap = SbrkHeap::new().expect("program break must be reachable");

        assert!(heap.lo().is_aligned_with(Alignment::ALIGN_16));
        assert!(heap.page_size() >= 512);

        let region = heap.extend(4096).expect("break move refused");
        assert!(heap.hi() - region == 4096);

        unsafe {
            region.as_mut_ptr::<u8>().write_bytes(0x5A, 4096);
            assert_eq!(region.as_ptr::<u8>().read(), 0x5A);
        }
    }
}
