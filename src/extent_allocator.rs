//! The underlying extent-granularity block allocator: the other external
//! collaborator this crate builds against. The mini-allocator sub-divides
//! whatever extents this allocator hands out; it never manages free space
//! at anything finer than extent granularity itself.
use crate::error::MiniAllocatorError;

/// Hands out and reference-counts fixed-size extents.
pub trait ExtentAllocator: Sync {
    /// Reserves a fresh extent and returns its base address.
    ///
    /// # Errors
    ///
    /// Extent exhaustion is fatal to the caller: there is no way to make
    /// progress without a fresh extent.
    fn alloc_extent(&self) -> Result<u64, MiniAllocatorError>;

    /// Increments the reference count of the extent at `base_addr`.
    fn inc_refcount(&self, base_addr: u64);

    /// Returns the current reference count of the extent at `base_addr`.
    fn get_refcount(&self, base_addr: u64) -> u32;
}
