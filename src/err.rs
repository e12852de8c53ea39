use core::fmt::Debug;

/// `BaseError` is a common trait implemented by every error type defined in
/// this crate.
///
/// It is dependent on the [`Debug`] trait, which makes sense as we are
/// dealing with errors.
pub trait BaseError: Debug {}

/// `CanFail` is a return type for functions that are allowed to fail, and
/// don't need to return anything.
///
/// For instance, it is used when initializing the process-wide allocator, or
/// when running the heap-consistency checker.
pub type CanFail<T> = Result<(), T>;

/// `AllocError` defines the error types raised while operating the heap
/// arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The underlying heap primitive refused to grow the arena.
    OutOfMemory,

    /// The process-wide allocator was initialized a second time.
    AlreadyInitialized,
}

impl BaseError for AllocError {}
