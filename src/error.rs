//! The only user-visible error surface for the mini-allocator: failure of
//! the downstream extent allocator.  Everything else is either a contract
//! violation (panics, see the individual modules) or internal contention
//! that is retried transparently.
use std::fmt;

/// Propagated failure from the underlying extent allocator.
///
/// The mini-allocator treats extent exhaustion as a hard stop: there is no
/// way to make progress without a fresh extent, so every caller that can
/// trigger an extent allocation (`init`, `alloc`, meta-log growth) must be
/// prepared to propagate this error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiniAllocatorError {
    /// `ExtentAllocator::alloc_extent` failed, most likely because the
    /// underlying block allocator is out of extents.
    ExtentAllocationFailed,
}

impl fmt::Display for MiniAllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiniAllocatorError::ExtentAllocationFailed => {
                write!(f, "mini-allocator: underlying extent allocator is exhausted")
            }
        }
    }
}

impl std::error::Error for MiniAllocatorError {}
