//! Boundary-tagged block layout.
//!
//! Every block of the arena starts one word before its payload address with
//! a packed [`BlockTag`], and ends with an identical footer word, so the
//! size of both neighbours is computable from any payload address. Free
//! blocks additionally carry their free-list links in the first two payload
//! words, which is why no block may shrink below [`MIN_BLOCK`] bytes.

use bytemuck::{Pod, Zeroable};

use crate::mem::HeapAddr;

/// Machine word size; headers, footers and list links are all one word.
pub(crate) const WORD: usize = core::mem::size_of::<usize>();

/// Payload addresses and block sizes are multiples of this.
pub(crate) const ALIGNMENT: usize = 16;

/// Smallest block able to hold header, footer and the two free-list links.
pub(crate) const MIN_BLOCK: usize = 32;

/// Packed `size | alloc` word stored at both ends of every block.
///
/// The low four bits of a block size are always zero, so bit 0 carries the
/// allocation flag and the three bits above it stay reserved. The bitwise
/// representation never leaves this module.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct BlockTag(usize);

impl BlockTag {
    const ALLOC_MASK: usize = 0x1;
    const SIZE_MASK: usize = !(ALIGNMENT - 1);

    pub(crate) fn new(size: usize, allocated: bool) -> Self {
        debug_assert!(
            size & !Self::SIZE_MASK == 0,
            "block sizes are 16-byte multiples"
        );

        Self((size & Self::SIZE_MASK) | allocated as usize)
    }

    pub(crate) fn size(self) -> usize {
        self.0 & Self::SIZE_MASK
    }

    pub(crate) fn is_allocated(self) -> bool {
        self.0 & Self::ALLOC_MASK != 0
    }
}

/// Reads the header tag of the block whose payload starts at `block`.
pub(crate) unsafe fn header(block: HeapAddr) -> BlockTag {
    (block - WORD).as_ptr::<BlockTag>().read()
}

/// Reads the footer tag of `block`. Requires a valid header.
pub(crate) unsafe fn footer(block: HeapAddr) -> BlockTag {
    (block + header(block).size() - 2 * WORD)
        .as_ptr::<BlockTag>()
        .read()
}

/// Writes header and footer of `block` as one operation, so the two tags
/// are never observable in a disagreeing state between public calls.
pub(crate) unsafe fn write_tags(block: HeapAddr, size: usize, allocated: bool) {
    let tag = BlockTag::new(size, allocated);

    (block - WORD).as_mut_ptr::<BlockTag>().write(tag);
    (block + size - 2 * WORD).as_mut_ptr::<BlockTag>().write(tag);
}

/// Writes the zero-sized, always-allocated epilogue header at `block`.
///
/// The epilogue has no footer; its header must be the final word of the
/// arena.
pub(crate) unsafe fn write_epilogue(block: HeapAddr) {
    (block - WORD)
        .as_mut_ptr::<BlockTag>()
        .write(BlockTag::new(0, true));
}

/// Payload address of the block adjacent above.
pub(crate) unsafe fn next_block(block: HeapAddr) -> HeapAddr {
    block + header(block).size()
}

/// Payload address of the block adjacent below, computed from its footer.
pub(crate) unsafe fn prev_block(block: HeapAddr) -> HeapAddr {
    let prev_footer = (block - 2 * WORD).as_ptr::<BlockTag>().read();

    block - prev_footer.size()
}

/// Usable payload bytes of `block`.
pub(crate) unsafe fn payload_size(block: HeapAddr) -> usize {
    header(block).size() - 2 * WORD
}

/// Successor link of a free block, stored in payload word 0.
pub(crate) unsafe fn next_free(block: HeapAddr) -> HeapAddr {
    block.as_ptr::<HeapAddr>().read()
}

pub(crate) unsafe fn set_next_free(block: HeapAddr, next: HeapAddr) {
    block.as_mut_ptr::<HeapAddr>().write(next);
}

/// Predecessor link of a free block, stored in payload word 1.
pub(crate) unsafe fn prev_free(block: HeapAddr) -> HeapAddr {
    (block + WORD).as_ptr::<HeapAddr>().read()
}

pub(crate) unsafe fn set_prev_free(block: HeapAddr, prev: HeapAddr) {
    (block + WORD).as_mut_ptr::<HeapAddr>().write(prev);
}
