//! Segregated-fit dynamic memory allocator.
//!
//! `smalloc` manages a contiguous, grow-only heap arena as a sequence of
//! boundary-tagged blocks, indexed by nine segregated free lists. The arena
//! is obtained from a [`HeapSource`], either the program break
//! ([`SbrkHeap`]) or a caller-provided region ([`FixedHeap`]).
//!
//! The allocator can serve as the process global allocator through
//! [`SyncHeapAllocator`] once [`init_process_heap`] has run, or as a
//! standalone instance through [`LockedSegregatedAllocator`].

#![cfg_attr(not(test), no_std)]

pub mod err;
pub mod log;
pub mod mem;

pub use crate::mem::brk::{FixedHeap, HeapSource, SbrkHeap};
pub use crate::mem::smalloc::check::HeapCheckError;
pub use crate::mem::smalloc::heap::{LockedSegregatedAllocator, SegregatedAllocator};
pub use crate::mem::smalloc::{init_process_heap, SyncHeapAllocator};
pub use crate::mem::HeapAddr;
