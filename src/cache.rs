//! The buffer cache is an external collaborator: the mini-allocator only
//! ever touches pages through this trait's pin/claim/lock protocol.
//! Production code plugs in a real buffer cache; this crate's own tests
//! plug in the in-memory double from [`crate::testing`].
#[cfg(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
))]
use contracts::*;
#[cfg(not(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts")))]
use disabled_contracts::*;

use std::ptr::NonNull;

/// An opaque tag threaded through every cache call.  Higher layers (the
/// branch tree, the filter, ...) use distinct `PageType`s so the cache can
/// apply type-specific policy; the mini-allocator itself never interprets
/// the tag, it only forwards whatever `MiniAllocator::init` was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageType(pub u32);

/// A pinned, possibly claimed, possibly locked page.
///
/// `PageHandle` is a thin wrapper around a raw pointer to the page's
/// backing bytes: the actual storage is owned by the `Cache`
/// implementation, and the handle is only valid between `alloc`/`get` and
/// the matching `unget`.
#[derive(Debug)]
pub struct PageHandle {
    pub addr: u64,
    data: NonNull<u8>,
    len: usize,
}

impl PageHandle {
    /// Builds a handle over a page's backing storage.
    ///
    /// # Safety
    ///
    /// `data` must remain valid for `len` bytes until the handle is passed
    /// to `Cache::unget`.
    pub unsafe fn new(addr: u64, data: NonNull<u8>, len: usize) -> Self {
        Self { addr, data, len }
    }

    /// Returns the page contents.  Callers must hold at least a claim
    /// (read access is always fine; see the cache contract for when
    /// mutation is permitted).
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// Returns the page contents for mutation.  Callers must hold the
    /// page's lock, per the pin/claim/lock protocol.
    #[allow(clippy::mut_from_ref)]
    pub fn data_mut(&self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

/// The buffer-cache contract the mini-allocator is built against.
///
/// Every mutation of a meta page goes through the sequence pin (`get`/
/// `alloc`) → claim → lock ... unlock → unclaim → unget.
#[cfg_attr(
    any(
        all(test, feature = "check_contracts_in_tests"),
        feature = "check_contracts"
    ),
    contract_trait
)]
pub trait Cache: Sync {
    /// Size, in bytes, of a single page.  A power of two.
    #[ensures(ret > 0 && ret & (ret - 1) == 0, "page size must be a power of 2")]
    fn page_size(&self) -> usize;

    /// Size, in bytes, of a single extent.  A multiple of `page_size()`.
    #[ensures(ret > 0 && ret % self.page_size() == 0, "extent size must be a positive multiple of the page size")]
    fn extent_size(&self) -> usize;

    /// Allocates a fresh, pinned, zero-filled page at `addr`.
    #[requires(addr % self.page_size() as u64 == 0, "addr must be page-aligned")]
    #[ensures(ret.addr == addr)]
    fn alloc(&self, addr: u64, page_type: PageType) -> PageHandle;

    /// Pins the page at `addr`, loading it if necessary.
    #[requires(addr % self.page_size() as u64 == 0, "addr must be page-aligned")]
    #[ensures(ret.addr == addr)]
    fn get(&self, addr: u64, wait: bool, page_type: PageType) -> PageHandle;

    /// Attempts to reserve exclusive writer intent on `page`.  May fail
    /// under contention; callers retry with backoff.
    fn claim(&self, page: &PageHandle) -> bool;

    /// Releases the claim obtained by `claim`.
    fn unclaim(&self, page: &PageHandle);

    /// Excludes readers.  Callers must hold a claim first.
    fn lock(&self, page: &PageHandle);

    /// Releases the lock obtained by `lock`.
    fn unlock(&self, page: &PageHandle);

    /// Marks `page` as dirty, so it is written back.
    fn mark_dirty(&self, page: &PageHandle);

    /// Unpins `page`, consuming the handle.
    fn unget(&self, page: PageHandle);

    /// Decrements the reference count of the extent starting at `addr`.
    /// Returns `true` iff the refcount dropped to zero (i.e. the extent
    /// was actually freed).
    #[requires(addr % self.extent_size() as u64 == 0, "addr must be extent-aligned")]
    fn dealloc(&self, addr: u64, page_type: PageType) -> bool;

    /// Requests that all dirty pages of the extent at `base_addr` be
    /// written back, accumulating the number of pages still outstanding
    /// into `*pages_outstanding`.
    #[requires(base_addr % self.extent_size() as u64 == 0, "base_addr must be extent-aligned")]
    fn extent_sync(&self, base_addr: u64, pages_outstanding: &mut u64);

    /// Hints that the extent at `addr` will be needed soon.
    #[requires(addr % self.extent_size() as u64 == 0, "addr must be extent-aligned")]
    fn prefetch(&self, addr: u64, page_type: PageType);
}
