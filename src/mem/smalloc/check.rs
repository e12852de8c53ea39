//! Heap-consistency checker.
//!
//! A read-only, allocation-free traversal of the arena and the segregated
//! index, used by the test suite and by the debug-build self-check after
//! every mutating call.

use crate::err::{BaseError, CanFail};
use crate::mem::brk::HeapSource;
use crate::mem::{Alignment, HeapAddr};

use super::block::{self, BlockTag, MIN_BLOCK, WORD};
use super::freelist::{size_class, SIZE_CLASS_COUNT};
use super::heap::SegregatedAllocator;

/// A violated arena or index invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapCheckError {
    /// Prologue or epilogue sentinel has the wrong shape.
    BadSentinel { at: HeapAddr },

    /// A block whose header and footer words disagree.
    TagMismatch { block: HeapAddr },

    /// A block base that is not on the 16-byte grid.
    Misaligned { block: HeapAddr },

    /// A block size below the minimum.
    BadBlockSize { block: HeapAddr, size: usize },

    /// The arena walk escaped the bounds without meeting the epilogue.
    BrokenTiling { at: HeapAddr },

    /// Two free blocks sit next to each other.
    AdjacentFree { first: HeapAddr, second: HeapAddr },

    /// A list entry that is not marked free.
    ListedNotFree { block: HeapAddr },

    /// A list entry outside the arena bounds.
    ListedOutOfArena { block: HeapAddr },

    /// A list entry filed under the wrong size class.
    ListedWrongClass { block: HeapAddr, class: usize },

    /// A list whose links do not chain symmetrically.
    BrokenLinks { block: HeapAddr },

    /// A list entry that the arena walk never visited.
    ListedUnknownBlock { block: HeapAddr },

    /// Free blocks seen by the arena walk and list entries disagree in
    /// count.
    FreeCountMismatch { walked: usize, listed: usize },
}

impl BaseError for HeapCheckError {}

impl<H: HeapSource> SegregatedAllocator<H> {
    /// Verifies every structural invariant of the arena and the index,
    /// returning the first violation found.
    pub fn check_heap(&self) -> CanFail<HeapCheckError> {
        let (lo, hi) = self.arena_bounds();
        let walked_free = unsafe { self.check_arena(lo, hi)? };
        unsafe { self.check_index(lo, hi, walked_free) }
    }

    /// Walks the arena from prologue to epilogue and returns the number of
    /// free blocks it saw.
    unsafe fn check_arena(&self, lo: HeapAddr, hi: HeapAddr) -> Result<usize, HeapCheckError> {
        let prologue = self.prologue;
        let prologue_tag = BlockTag::new(2 * WORD, true);

        if prologue != lo + 2 * WORD
            || block::header(prologue) != prologue_tag
            || block::footer(prologue) != prologue_tag
        {
            return Err(HeapCheckError::BadSentinel { at: prologue });
        }

        // The epilogue header must be the final word of the arena.
        if block::header(hi) != BlockTag::new(0, true) {
            return Err(HeapCheckError::BadSentinel { at: hi });
        }

        let mut cursor = block::next_block(prologue);
        let mut previous = prologue;
        let mut previous_free = false;
        let mut walked_free = 0;

        while cursor != hi {
            if cursor < lo || cursor > hi {
                return Err(HeapCheckError::BrokenTiling { at: cursor });
            }
            if !cursor.is_aligned_with(Alignment::ALIGN_16) {
                return Err(HeapCheckError::Misaligned { block: cursor });
            }

            let tag = block::header(cursor);
            let size = tag.size();

            if size < MIN_BLOCK {
                return Err(HeapCheckError::BadBlockSize { block: cursor, size });
            }
            if cursor + size > hi {
                return Err(HeapCheckError::BrokenTiling { at: cursor });
            }
            if block::footer(cursor) != tag {
                return Err(HeapCheckError::TagMismatch { block: cursor });
            }

            if !tag.is_allocated() {
                if previous_free {
                    return Err(HeapCheckError::AdjacentFree {
                        first: previous,
                        second: cursor,
                    });
                }
                walked_free += 1;
            }

            previous = cursor;
            previous_free = !tag.is_allocated();
            cursor = cursor + size;
        }

        Ok(walked_free)
    }

    /// Audits every free list against the arena walk.
    unsafe fn check_index(
        &self,
        lo: HeapAddr,
        hi: HeapAddr,
        walked_free: usize,
    ) -> CanFail<HeapCheckError> {
        let mut listed = 0;

        for class in 0..SIZE_CLASS_COUNT {
            let mut cursor = self.index.head(class);
            let mut previous = HeapAddr::NULL_PTR;

            while !cursor.is_null() {
                if cursor < lo || cursor >= hi {
                    return Err(HeapCheckError::ListedOutOfArena { block: cursor });
                }

                let tag = block::header(cursor);

                if tag.is_allocated() {
                    return Err(HeapCheckError::ListedNotFree { block: cursor });
                }
                if size_class(tag.size()) != class {
                    return Err(HeapCheckError::ListedWrongClass {
                        block: cursor,
                        class,
                    });
                }
                if block::prev_free(cursor) != previous {
                    return Err(HeapCheckError::BrokenLinks { block: cursor });
                }
                if !self.arena_contains(cursor, hi) {
                    return Err(HeapCheckError::ListedUnknownBlock { block: cursor });
                }

                listed += 1;
                // Doubles as the cycle guard: a looping chain inflates the
                // count past what the arena walk saw.
                if listed > walked_free {
                    return Err(HeapCheckError::FreeCountMismatch {
                        walked: walked_free,
                        listed,
                    });
                }

                previous = cursor;
                cursor = block::next_free(cursor);
            }
        }

        if listed != walked_free {
            return Err(HeapCheckError::FreeCountMismatch {
                walked: walked_free,
                listed,
            });
        }

        Ok(())
    }

    /// Whether `target` is the payload address of a block the arena walk
    /// visits.
    unsafe fn arena_contains(&self, target: HeapAddr, hi: HeapAddr) -> bool {
        let mut cursor = block::next_block(self.prologue);

        while cursor != hi {
            if cursor == target {
                return true;
            }

            let size = block::header(cursor).size();
            if size < MIN_BLOCK || cursor + size > hi {
                return false;
            }
            cursor = cursor + size;
        }

        false
    }
}
