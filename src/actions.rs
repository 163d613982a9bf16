//! The extent actions plugged into [`crate::traversal::for_each`]: `zap`
//! is the only one that ever reports `true` (an extent's refcount actually
//! reached zero), because only zapping is allowed to retire an entry. The
//! others always report `false`, which is why calling `sync` or
//! `prefetch` after a partial `zap` over the same log still trips the
//! "already zapped" assertion in `for_each` on a re-zapped entry.
use crate::cache::{Cache, PageType};
use crate::extent_allocator::ExtentAllocator;

/// Deallocates the extent, reporting whether its refcount reached zero.
pub(crate) fn zap<'a>(cache: &'a dyn Cache, page_type: PageType) -> impl FnMut(u64) -> bool + 'a {
    move |base_addr: u64| cache.dealloc(base_addr, page_type)
}

/// Bumps the extent's refcount.
pub(crate) fn inc<'a>(extent_allocator: &'a dyn ExtentAllocator) -> impl FnMut(u64) -> bool + 'a {
    move |base_addr: u64| {
        extent_allocator.inc_refcount(base_addr);
        false
    }
}

/// Requests writeback of the extent's dirty pages, accumulating the count
/// still outstanding.
pub(crate) fn sync<'a>(
    cache: &'a dyn Cache,
    pages_outstanding: &'a mut u64,
) -> impl FnMut(u64) -> bool + 'a {
    move |base_addr: u64| {
        cache.extent_sync(base_addr, pages_outstanding);
        false
    }
}

/// Hints the cache to prefetch the extent.
pub(crate) fn prefetch<'a>(
    cache: &'a dyn Cache,
    page_type: PageType,
) -> impl FnMut(u64) -> bool + 'a {
    move |base_addr: u64| {
        cache.prefetch(base_addr, page_type);
        false
    }
}

/// Tallies the number of extents visited.
pub(crate) fn count<'a>(total: &'a mut u64) -> impl FnMut(u64) -> bool + 'a {
    move |_base_addr: u64| {
        *total += 1;
        false
    }
}
