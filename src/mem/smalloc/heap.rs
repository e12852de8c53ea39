//! Core segregated-fit allocator.
//!
//! The arena is bracketed by an allocated prologue block and a zero-sized
//! epilogue header, so that neighbour inspection during coalescing never
//! needs a bounds check. Between the sentinels, blocks tile the arena with
//! no gaps; freeing restores the canonical form where no two free blocks
//! are adjacent.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use spin::Mutex;

use crate::err::AllocError;
use crate::mem::brk::HeapSource;
use crate::mem::utils::round_up;
use crate::mem::{Alignment, HeapAddr};

use super::block::{self, ALIGNMENT, MIN_BLOCK, WORD};
use super::freelist::{size_class, FreeListIndex};

/// Granularity of heap extensions beyond what a single request needs.
pub(crate) const CHUNK: usize = 4096;

/// Shapes a user request into a block size: payload plus the two tag words,
/// rounded up to the alignment and floored by the minimum block size.
fn request_size(size: usize) -> Option<usize> {
    let padded = size.checked_add(2 * WORD)?;
    let shaped = padded.checked_add(ALIGNMENT - 1)? & !(ALIGNMENT - 1);

    Some(shaped.max(MIN_BLOCK))
}

/// Segregated-fit allocator over a [`HeapSource`] arena.
///
/// All observable state lives in the arena bytes and the list head array;
/// every method takes exclusive access and either completes with the
/// structural invariants restored, or returns the null address with no
/// state changed.
pub struct SegregatedAllocator<H: HeapSource> {
    pub(super) heap: H,
    pub(super) index: FreeListIndex,
    pub(super) prologue: HeapAddr,
}

impl<H: HeapSource> SegregatedAllocator<H> {
    /// Initializes an allocator over `heap`.
    ///
    /// Lays out the prologue and epilogue sentinels, then seeds the arena
    /// with one free region sized from [`CHUNK`] and the page size of the
    /// backing. Fails if the heap refuses the initial extensions.
    pub fn init(mut heap: H) -> Result<Self, AllocError> {
        let base = heap.extend(2 * ALIGNMENT)?;

        assert!(
            base.is_aligned_with(Alignment::ALIGN_16),
            "invalid alignment for the heap base"
        );

        // One padding word, prologue header, prologue footer, epilogue
        // header.
        let prologue = base + 2 * WORD;
        unsafe {
            block::write_tags(prologue, 2 * WORD, true);
            block::write_epilogue(base + 4 * WORD);
        }

        let mut allocator = Self {
            heap,
            index: FreeListIndex::new(),
            prologue,
        };

        let initial = round_up(CHUNK, allocator.heap.page_size().max(ALIGNMENT));
        if allocator.extend_heap(initial).is_none() {
            return Err(AllocError::OutOfMemory);
        }

        allocator.debug_verify();

        Ok(allocator)
    }

    /// Current arena bounds.
    pub fn arena_bounds(&self) -> (HeapAddr, HeapAddr) {
        (self.heap.lo(), self.heap.hi())
    }

    /// Allocates `size` bytes and returns the payload address, aligned to
    /// 16 bytes, or the null address if `size` is zero or the arena cannot
    /// grow any further.
    pub unsafe fn malloc(&mut self, size: usize) -> HeapAddr {
        if size == 0 {
            return HeapAddr::NULL_PTR;
        }

        let asize = match request_size(size) {
            Some(asize) => asize,
            None => return HeapAddr::NULL_PTR,
        };

        let block = match self.index.find_fit(asize) {
            Some(block) => block,
            None => match self.extend_heap(asize.max(CHUNK)) {
                Some(block) => block,
                None => return HeapAddr::NULL_PTR,
            },
        };

        let payload = self.place(block, asize);
        self.debug_verify();

        payload
    }

    /// Releases the block whose payload starts at `block`.
    ///
    /// The null address is a no-op. Passing an address that was not
    /// returned by this allocator, or freeing twice, is undefined
    /// behaviour.
    pub unsafe fn free(&mut self, block: HeapAddr) {
        if block.is_null() {
            return;
        }

        let size = block::header(block).size();
        block::write_tags(block, size, false);
        self.coalesce(block);

        self.debug_verify();
    }

    /// Resizes the allocation at `block` to `size` bytes.
    ///
    /// A null `block` degenerates to [`Self::malloc`], a zero `size` to
    /// [`Self::free`]. Otherwise the contents move to a fresh block and the
    /// old payload prefix is preserved; when no fresh block can be carved
    /// the old block survives untouched and the null address is returned.
    pub unsafe fn realloc(&mut self, block: HeapAddr, size: usize) -> HeapAddr {
        if block.is_null() {
            return self.malloc(size);
        }

        if size == 0 {
            self.free(block);
            return HeapAddr::NULL_PTR;
        }

        let relocated = self.malloc(size);
        if relocated.is_null() {
            return HeapAddr::NULL_PTR;
        }

        let preserved = size.min(block::payload_size(block));
        ptr::copy_nonoverlapping(
            block.as_ptr::<u8>(),
            relocated.as_mut_ptr::<u8>(),
            preserved,
        );
        self.free(block);

        relocated
    }

    /// Allocates a zeroed buffer for `count` elements of `size` bytes.
    ///
    /// Arithmetic overflow of the total is reported as allocation failure.
    pub unsafe fn calloc(&mut self, count: usize, size: usize) -> HeapAddr {
        let total = match count.checked_mul(size) {
            Some(total) => total,
            None => return HeapAddr::NULL_PTR,
        };

        let block = self.malloc(total);
        if !block.is_null() {
            ptr::write_bytes(block.as_mut_ptr::<u8>(), 0, total);
        }

        block
    }

    /// Grows the arena by `bytes` and shapes the new region into one free
    /// block, absorbing a trailing free block if there is one. Returns the
    /// surviving free block, already filed in the index.
    fn extend_heap(&mut self, bytes: usize) -> Option<HeapAddr> {
        let region = match self.heap.extend(bytes) {
            Ok(previous_hi) => previous_hi,
            Err(_) => return None,
        };

        unsafe {
            // The region base is the payload position of the old epilogue:
            // its header word becomes the header of the new free block.
            block::write_tags(region, bytes, false);
            block::write_epilogue(region + bytes);

            Some(self.coalesce(region))
        }
    }

    /// Marks `block` allocated, splitting off the tail when the remainder
    /// can stand as a block of its own. Returns the payload address.
    unsafe fn place(&mut self, block: HeapAddr, asize: usize) -> HeapAddr {
        let csize = block::header(block).size();

        self.index.remove(block);

        if csize - asize >= MIN_BLOCK {
            block::write_tags(block, asize, true);

            let remainder = block + asize;
            block::write_tags(remainder, csize - asize, false);
            self.index.insert(remainder);
        } else {
            block::write_tags(block, csize, true);
        }

        block
    }

    /// Merges `block` with whichever neighbours are free and files the
    /// surviving block in the index. Returns the surviving block, whose
    /// identity is always the lowest-addressed participant.
    unsafe fn coalesce(&mut self, block: HeapAddr) -> HeapAddr {
        let prev = block::prev_block(block);
        let next = block::next_block(block);

        let prev_allocated = block::header(prev).is_allocated();
        let next_allocated = block::header(next).is_allocated();

        let size = block::header(block).size();
        let prev_size = block::header(prev).size();
        let next_size = block::header(next).size();

        match (prev_allocated, next_allocated) {
            (true, true) => {
                self.index.insert(block);
                block
            }
            (true, false) => {
                self.index.remove(next);
                block::write_tags(block, size + next_size, false);
                self.index.insert(block);
                block
            }
            (false, true) => {
                let merged = prev_size + size;

                // Growing within the same class keeps the links valid, so
                // the block can stay where it sits in its list.
                if size_class(merged) == size_class(prev_size) {
                    block::write_tags(prev, merged, false);
                } else {
                    self.index.remove(prev);
                    block::write_tags(prev, merged, false);
                    self.index.insert(prev);
                }

                prev
            }
            (false, false) => {
                self.index.remove(prev);
                self.index.remove(next);
                block::write_tags(prev, prev_size + size + next_size, false);
                self.index.insert(prev);

                prev
            }
        }
    }

    #[cfg(debug_assertions)]
    fn debug_verify(&self) {
        if let Err(fault) = self.check_heap() {
            crate::error!("smalloc", "heap invariant violated: {:?}", fault);
            panic!("heap invariant violated: {:?}", fault);
        }
    }

    #[cfg(not(debug_assertions))]
    fn debug_verify(&self) {}
}

/// Spinlock-protected allocator.
///
/// It uses a spinlock-based Mutex to ensure interior mutability, which makes
/// it usable with the `#[global_allocator]` attribute.
pub struct LockedSegregatedAllocator<H: HeapSource> {
    pub alloc: Mutex<SegregatedAllocator<H>>,
}

impl<H: HeapSource> LockedSegregatedAllocator<H> {
    pub const fn new(allocator: SegregatedAllocator<H>) -> Self {
        Self {
            alloc: Mutex::new(allocator),
        }
    }
}

unsafe impl<H: HeapSource> GlobalAlloc for LockedSegregatedAllocator<H> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.alloc.lock().malloc(layout.size()).as_mut_ptr()
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.alloc.lock().free(HeapAddr::from_mut_ptr(ptr));
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.alloc.lock().calloc(1, layout.size()).as_mut_ptr()
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.alloc
            .lock()
            .realloc(HeapAddr::from_mut_ptr(ptr), new_size)
            .as_mut_ptr()
    }
}
