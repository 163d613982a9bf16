//! The core bump allocator: per-batch page vending out of extents, the
//! metadata log that records what got vended, and the final end-key fixup
//! on stream close.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::batch::BatchState;
use crate::cache::{Cache, PageType};
use crate::data_config::{is_null_key, DataConfig, MAX_INLINE_KEY_SIZE};
use crate::error::MiniAllocatorError;
use crate::extent_allocator::ExtentAllocator;
use crate::meta_entry;
use crate::ops;
use crate::page_guard::{backoff, LockedPage};

/// Upper bound on `num_batches` passed to [`MiniAllocator::init`]. A
/// fixed, generous bound chosen to keep per-batch state a plain `Vec`
/// rather than a dynamically resizable structure under a lock.
pub const MINI_MAX_BATCHES: usize = 8;

/// A per-stream sub-allocator over extents handed out by an
/// [`ExtentAllocator`], backed by a durable metadata log rooted at
/// `meta_head`.
///
/// Borrows its collaborators rather than owning them: a `MiniAllocator`
/// is a thin view over externally owned cache and allocator state, not a
/// container for it.
pub struct MiniAllocator<'a> {
    cache: &'a dyn Cache,
    extent_allocator: &'a dyn ExtentAllocator,
    data_config: &'a dyn DataConfig,
    page_type: PageType,
    meta_head: u64,
    meta_tail: AtomicU64,
    batches: Vec<BatchState>,
}

impl<'a> MiniAllocator<'a> {
    /// Creates a brand new mini allocator (`meta_tail == 0`) or attaches to
    /// an existing one recovered from a durable `meta_tail`. Returns the
    /// allocator together with the extent `batch` 0 will vend first.
    ///
    /// # Panics
    ///
    /// Panics if `num_batches` is zero or exceeds [`MINI_MAX_BATCHES`].
    pub fn init(
        cache: &'a dyn Cache,
        extent_allocator: &'a dyn ExtentAllocator,
        data_config: &'a dyn DataConfig,
        meta_head: u64,
        meta_tail: u64,
        num_batches: usize,
        page_type: PageType,
    ) -> Result<(Self, u64), MiniAllocatorError> {
        assert!(num_batches > 0, "mini-allocator: num_batches must be positive");
        assert!(
            num_batches <= MINI_MAX_BATCHES,
            "mini-allocator: num_batches exceeds MINI_MAX_BATCHES"
        );

        let fresh = meta_tail == 0;
        let mut meta_page = if fresh {
            let handle = cache.alloc(meta_head, page_type);
            LockedPage::from_exclusive(cache, handle)
        } else {
            LockedPage::acquire(cache, meta_tail, page_type)
        };

        if fresh {
            meta_entry::init_header(meta_page.data_mut());
        }

        let mut batches = Vec::with_capacity(num_batches);
        for _ in 0..num_batches {
            let batch = BatchState::new();
            let extent = match extent_allocator.alloc_extent() {
                Ok(addr) => addr,
                Err(err) => {
                    log::error!("mini-allocator: extent allocator exhausted during init");
                    meta_page.mark_dirty();
                    return Err(err);
                }
            };
            batch.set_next_extent(extent);
            batches.push(batch);
        }

        let first_next_extent = batches[0].next_extent();

        meta_page.mark_dirty();
        drop(meta_page);

        let mini = MiniAllocator {
            cache,
            extent_allocator,
            data_config,
            page_type,
            meta_head,
            meta_tail: AtomicU64::new(if fresh { meta_head } else { meta_tail }),
            batches,
        };

        Ok((mini, first_next_extent))
    }

    /// Vends the next page for `batch`, appending a meta entry whenever
    /// this call crosses into a new extent. Returns the vended page
    /// address and the extent `batch` will use after this one.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is out of range or `key` exceeds
    /// [`MAX_INLINE_KEY_SIZE`].
    pub fn alloc(&self, batch: usize, key: &[u8]) -> Result<(u64, u64), MiniAllocatorError> {
        assert!(batch < self.batches.len(), "mini-allocator: batch out of range");
        assert!(
            key.len() <= MAX_INLINE_KEY_SIZE,
            "mini-allocator: key exceeds MAX_INLINE_KEY_SIZE"
        );

        let batch_state = &self.batches[batch];
        let page_size = self.cache.page_size() as u64;
        let extent_size = self.cache.extent_size() as u64;

        let captured_next_addr = batch_state.lock();

        if captured_next_addr % extent_size != 0 {
            let next_extent = batch_state.next_extent();
            batch_state.unlock(captured_next_addr + page_size);
            return Ok((captured_next_addr, next_extent));
        }

        // Crossing into a new extent: the extent reserved last time around
        // is what we vend now, and we must reserve the next one before
        // anyone else can observe this batch's state. The sentinel stays
        // held across the meta entry append below, so a partial failure
        // there can roll back cleanly instead of leaving the batch's bump
        // cursor pointing past an extent nothing in the log ever recorded.
        let vended_extent_addr = batch_state.next_extent();
        let reserved_extent = match self.extent_allocator.alloc_extent() {
            Ok(addr) => addr,
            Err(err) => {
                log::error!("mini-allocator: extent allocator exhausted during alloc");
                batch_state.unlock(captured_next_addr);
                return Err(err);
            }
        };

        if let Err(err) = self.append_meta_entry(batch_state, vended_extent_addr, key) {
            log::error!(
                "mini-allocator: rolling back batch {} after meta log append failure",
                batch
            );
            batch_state.unlock(captured_next_addr);
            return Err(err);
        }

        batch_state.set_next_extent(reserved_extent);
        batch_state.unlock(vended_extent_addr + page_size);
        log::debug!("mini-allocator: batch crossed into extent {}", vended_extent_addr);

        Ok((vended_extent_addr, reserved_extent))
    }

    /// Grows the metadata log as needed and appends an entry recording
    /// `vended_extent_addr`, fixing up the previous entry's `end_key` for
    /// this batch if `key` is non-null.
    fn append_meta_entry(
        &self,
        batch_state: &BatchState,
        vended_extent_addr: u64,
        key: &[u8],
    ) -> Result<(), MiniAllocatorError> {
        let page_size = self.cache.page_size() as u64;
        let extent_size = self.cache.extent_size() as u64;

        // Get, claim and lock meta_tail, re-checking after the pin since
        // meta_tail is shared and may move before we get the claim.
        let mut wait = 1u64;
        let mut meta_page = loop {
            let tail_addr = self.meta_tail.load(Ordering::Acquire);
            let handle = self.cache.get(tail_addr, true, self.page_type);
            if handle.addr == self.meta_tail.load(Ordering::Acquire) && self.cache.claim(&handle) {
                break LockedPage::from_claimed(self.cache, handle);
            }
            self.cache.unget(handle);
            std::thread::sleep(std::time::Duration::from_micros(wait));
            wait = backoff(wait);
        };

        let entry_size = meta_entry::entry_size_for_key(key);
        if (page_size as usize) < meta_entry::write_pos(meta_page.data()) as usize + entry_size {
            let mut new_meta_tail = meta_page.addr() + page_size;
            if new_meta_tail % extent_size == 0 {
                new_meta_tail = match self.extent_allocator.alloc_extent() {
                    Ok(addr) => addr,
                    Err(err) => {
                        log::error!("mini-allocator: extent allocator exhausted growing the meta log");
                        meta_page.mark_dirty();
                        return Err(err);
                    }
                };
            }

            log::debug!("mini-allocator: meta log grew to page {}", new_meta_tail);
            meta_entry::set_next_meta_addr(meta_page.data_mut(), new_meta_tail);
            meta_page.mark_dirty();

            let new_handle = self.cache.alloc(new_meta_tail, self.page_type);
            self.meta_tail.store(new_meta_tail, Ordering::Release);
            drop(meta_page);

            meta_page = LockedPage::from_exclusive(self.cache, new_handle);
            meta_entry::init_header(meta_page.data_mut());
        }

        assert!(
            meta_entry::write_pos(meta_page.data()) as usize + entry_size <= page_size as usize,
            "mini-allocator: entry does not fit in meta page after growth"
        );

        let new_meta_addr = meta_page.addr();
        let pos = meta_entry::write_pos(meta_page.data()) as usize;

        if !is_null_key(key) {
            if batch_state.last_meta_addr() != 0 {
                self.fixup_previous_end_key(batch_state, &mut meta_page, key)?;
            }
            meta_entry::write_new_entry(meta_page.data_mut(), pos, self.data_config, vended_extent_addr, key);
            batch_state.set_last_meta(new_meta_addr, pos as u32);
        } else {
            meta_entry::write_new_entry(meta_page.data_mut(), pos, self.data_config, vended_extent_addr, key);
        }

        let num_entries = meta_entry::num_entries(meta_page.data());
        meta_entry::set_num_entries(meta_page.data_mut(), num_entries + 1);
        meta_entry::set_write_pos(meta_page.data_mut(), (pos + entry_size) as u32);
        meta_page.mark_dirty();

        Ok(())
    }

    /// Writes `key` as the `end_key` of `batch`'s previously-appended
    /// entry, reusing `current_meta_page` when it already is that entry's
    /// page (avoiding a double-acquire of the same lock).
    fn fixup_previous_end_key(
        &self,
        batch_state: &BatchState,
        current_meta_page: &mut LockedPage<'a>,
        key: &[u8],
    ) -> Result<(), MiniAllocatorError> {
        let last_addr = batch_state.last_meta_addr();
        let last_pos = batch_state.last_meta_pos() as usize;

        if last_addr == current_meta_page.addr() {
            meta_entry::set_end_key(current_meta_page.data_mut(), last_pos, self.data_config, key);
            current_meta_page.mark_dirty();
        } else {
            let mut last_meta_page = LockedPage::acquire(self.cache, last_addr, self.page_type);
            meta_entry::set_end_key(last_meta_page.data_mut(), last_pos, self.data_config, key);
            last_meta_page.mark_dirty();
        }
        Ok(())
    }

    /// Deallocates each batch's still-reserved next extent and fixes up
    /// the `end_key` of each batch's final entry. Call once, when the
    /// stream that owns this mini allocator is closed.
    pub fn release(&self, key: &[u8]) {
        assert!(
            key.len() <= MAX_INLINE_KEY_SIZE,
            "mini-allocator: key exceeds MAX_INLINE_KEY_SIZE"
        );

        for batch_state in &self.batches {
            self.cache.dealloc(batch_state.next_extent(), self.page_type);

            if !is_null_key(key) && batch_state.last_meta_addr() != 0 {
                let mut last_meta_page = LockedPage::acquire(
                    self.cache,
                    batch_state.last_meta_addr(),
                    self.page_type,
                );
                meta_entry::set_end_key(
                    last_meta_page.data_mut(),
                    batch_state.last_meta_pos() as usize,
                    self.data_config,
                    key,
                );
                last_meta_page.mark_dirty();
            }
        }
    }

    /// The root of this allocator's durable metadata log, for recovery or
    /// for passing to [`crate::ops`].
    pub fn meta_head(&self) -> u64 {
        self.meta_head
    }

    /// The current tail of this allocator's durable metadata log.
    pub fn meta_tail(&self) -> u64 {
        self.meta_tail.load(Ordering::Acquire)
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    /// Deallocates every extent in `[start_key, end_key]`. See
    /// [`ops::zap`].
    pub fn zap(&self, start_key: &[u8], end_key: &[u8]) -> bool {
        ops::zap(
            self.cache,
            self.data_config,
            self.page_type,
            self.meta_head,
            start_key,
            end_key,
        )
    }

    /// Bumps the refcount of every extent in `[start_key, end_key]`. See
    /// [`ops::inc_range`].
    pub fn inc_range(&self, start_key: &[u8], end_key: &[u8]) {
        ops::inc_range(
            self.cache,
            self.data_config,
            self.extent_allocator,
            self.page_type,
            self.meta_head,
            start_key,
            end_key,
        );
    }

    /// Requests writeback of every extent in the log. See [`ops::sync`].
    pub fn sync(&self) -> u64 {
        ops::sync(self.cache, self.page_type, self.meta_head)
    }

    /// Hints the cache to prefetch every extent in the log. See
    /// [`ops::prefetch`].
    pub fn prefetch(&self) {
        ops::prefetch(self.cache, self.page_type, self.meta_head);
    }

    /// Counts the extents in `[start_key, end_key]`. See
    /// [`ops::count_extents_in_range`].
    pub fn count_extents_in_range(&self, start_key: &[u8], end_key: &[u8]) -> u64 {
        ops::count_extents_in_range(
            self.cache,
            self.data_config,
            self.page_type,
            self.meta_head,
            start_key,
            end_key,
        )
    }

    /// Counts every meta page plus every not-yet-zapped extent. See
    /// [`ops::extent_count`].
    pub fn extent_count(&self) -> u64 {
        ops::extent_count(self.cache, self.page_type, self.meta_head)
    }
}
