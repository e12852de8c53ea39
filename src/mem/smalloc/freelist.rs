//! Segregated free-list index.
//!
//! Nine LIFO doubly-linked lists, one per size class, threading through the
//! payloads of free blocks. The index stores only addresses; the arena owns
//! the bytes the links live in.

use crate::mem::HeapAddr;

use super::block;

/// Number of size classes.
pub(crate) const SIZE_CLASS_COUNT: usize = 9;

/// Smallest class whose inclusive upper bound covers `size`.
///
/// Classes double from 32 bytes up to 4096; the last class is unbounded.
pub(crate) fn size_class(size: usize) -> usize {
    match size {
        0..=32 => 0,
        33..=64 => 1,
        65..=128 => 2,
        129..=256 => 3,
        257..=512 => 4,
        513..=1024 => 5,
        1025..=2048 => 6,
        2049..=4096 => 7,
        _ => 8,
    }
}

/// Array of list heads keeping track of free blocks for each size class.
pub(crate) struct FreeListIndex {
    heads: [HeapAddr; SIZE_CLASS_COUNT],
}

impl FreeListIndex {
    pub(crate) const fn new() -> Self {
        Self {
            heads: [HeapAddr::NULL_PTR; SIZE_CLASS_COUNT],
        }
    }

    pub(crate) fn head(&self, class: usize) -> HeapAddr {
        self.heads[class]
    }

    /// Pushes a free block on the head of the list of its class.
    pub(crate) unsafe fn insert(&mut self, block: HeapAddr) {
        let class = size_class(block::header(block).size());
        let head = self.heads[class];

        block::set_prev_free(block, HeapAddr::NULL_PTR);
        block::set_next_free(block, head);

        if !head.is_null() {
            block::set_prev_free(head, block);
        }

        self.heads[class] = block;
    }

    /// Splices a free block out of the list of its class.
    ///
    /// The block must currently be filed in that list.
    pub(crate) unsafe fn remove(&mut self, block: HeapAddr) {
        let class = size_class(block::header(block).size());
        let prev = block::prev_free(block);
        let next = block::next_free(block);

        if prev.is_null() {
            self.heads[class] = next;
        } else {
            block::set_next_free(prev, next);
        }

        if !next.is_null() {
            block::set_prev_free(next, prev);
        }
    }

    /// First free block able to hold `asize` bytes.
    ///
    /// Scans classes upward starting from the class of `asize`, first-fit
    /// within each list. The returned block is left in its list.
    pub(crate) unsafe fn find_fit(&self, asize: usize) -> Option<HeapAddr> {
        for class in size_class(asize)..SIZE_CLASS_COUNT {
            let mut cursor = self.heads[class];

            while !cursor.is_null() {
                if block::header(cursor).size() >= asize {
                    return Some(cursor);
                }
                cursor = block::next_free(cursor);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_class_ladder_boundaries() {
        let cases = [
            (32, 0),
            (33, 1),
            (64, 1),
            (65, 2),
            (128, 2),
            (256, 3),
            (512, 4),
            (1024, 5),
            (2048, 6),
            (4096, 7),
            (4097, 8),
            (1 << 20, 8),
        ];

        for (size, class) in cases {
            assert_eq!(size_class(size), class, "size_class({size})");
        }
    }

    #[test]
    fn size_class_is_monotonic() {
        let mut previous = 0;

        for size in (32..=8192).step_by(16) {
            let class = size_class(size);
            assert!(class >= previous);
            previous = class;
        }
    }
}
