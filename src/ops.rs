//! Public entry points over an existing metadata log.
//!
//! Unlike `init`/`alloc`/`release`, these never touch per-batch state —
//! they take `meta_head` directly, as free functions rather than methods.
//! Any thread that knows a durable `meta_head` can call these, independent
//! of whichever [`crate::MiniAllocator`] (if any) originally appended to
//! that log.
use crate::actions;
use crate::cache::{Cache, PageType};
use crate::data_config::{DataConfig, NULL_KEY};
use crate::extent_allocator::ExtentAllocator;
use crate::meta_entry;
use crate::traversal::for_each;

/// Deallocates every extent in `[start_key, end_key]`. Returns `true` iff
/// every extent reachable from `meta_head` is now zapped, in which case
/// the log's own meta pages were reclaimed too.
pub fn zap(
    cache: &dyn Cache,
    data_config: &dyn DataConfig,
    page_type: PageType,
    meta_head: u64,
    start_key: &[u8],
    end_key: &[u8],
) -> bool {
    for_each(
        cache,
        Some(data_config),
        page_type,
        meta_head,
        start_key,
        end_key,
        actions::zap(cache, page_type),
    )
}

/// Bumps the refcount of every extent in `[start_key, end_key]`.
pub fn inc_range(
    cache: &dyn Cache,
    data_config: &dyn DataConfig,
    extent_allocator: &dyn ExtentAllocator,
    page_type: PageType,
    meta_head: u64,
    start_key: &[u8],
    end_key: &[u8],
) {
    for_each(
        cache,
        Some(data_config),
        page_type,
        meta_head,
        start_key,
        end_key,
        actions::inc(extent_allocator),
    );
}

/// Requests writeback of every extent in the log. Returns the number of
/// pages still outstanding after the request.
pub fn sync(cache: &dyn Cache, page_type: PageType, meta_head: u64) -> u64 {
    let mut pages_outstanding = 0u64;
    for_each(
        cache,
        None,
        page_type,
        meta_head,
        NULL_KEY,
        NULL_KEY,
        actions::sync(cache, &mut pages_outstanding),
    );
    pages_outstanding
}

/// Hints the cache to prefetch every extent in the log.
pub fn prefetch(cache: &dyn Cache, page_type: PageType, meta_head: u64) {
    for_each(
        cache,
        None,
        page_type,
        meta_head,
        NULL_KEY,
        NULL_KEY,
        actions::prefetch(cache, page_type),
    );
}

/// Counts the extents in `[start_key, end_key]`, without regard to their
/// zapped state.
pub fn count_extents_in_range(
    cache: &dyn Cache,
    data_config: &dyn DataConfig,
    page_type: PageType,
    meta_head: u64,
    start_key: &[u8],
    end_key: &[u8],
) -> u64 {
    let mut total = 0u64;
    for_each(
        cache,
        Some(data_config),
        page_type,
        meta_head,
        start_key,
        end_key,
        actions::count(&mut total),
    );
    total
}

/// Counts every meta page plus every not-yet-zapped extent reachable from
/// `meta_head`. Unlike the other operations here, this is its own direct
/// walk rather than a `for_each` action, since it needs the meta pages
/// themselves in its tally.
pub fn extent_count(cache: &dyn Cache, page_type: PageType, meta_head: u64) -> u64 {
    let mut num_extents = 0u64;
    let mut next_meta_addr = meta_head;
    loop {
        let handle = cache.get(next_meta_addr, true, page_type);
        num_extents += 1;

        let data = handle.data();
        let num_entries = meta_entry::num_entries(data);
        let mut pos = meta_entry::HEADER_SIZE;
        for _ in 0..num_entries {
            if !meta_entry::zapped(data, pos) {
                num_extents += 1;
            }
            pos += meta_entry::entry_size_at(data, pos);
        }

        next_meta_addr = meta_entry::next_meta_addr(data);
        cache.unget(handle);

        if next_meta_addr == 0 {
            break;
        }
    }
    num_extents
}
