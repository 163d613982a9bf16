//! RAII guards over the cache's pin/claim/lock protocol.
//!
//! Every meta-page mutation needs a strict get/claim/lock ...
//! unlock/unclaim/unget sequence, with every early return responsible for
//! unwinding whatever it had acquired so far. A guard that releases on
//! `Drop` gets that resource balance for free, including across panics
//! and `?`-propagated errors.
use crate::cache::{Cache, PageHandle, PageType};

/// A pinned, read-only page. Released on drop.
pub(crate) struct PinnedPage<'a> {
    cache: &'a dyn Cache,
    handle: Option<PageHandle>,
}

impl<'a> PinnedPage<'a> {
    pub(crate) fn new(cache: &'a dyn Cache, handle: PageHandle) -> Self {
        Self {
            cache,
            handle: Some(handle),
        }
    }

    pub(crate) fn addr(&self) -> u64 {
        self.handle.as_ref().unwrap().addr
    }

    pub(crate) fn data(&self) -> &[u8] {
        self.handle.as_ref().unwrap().data()
    }
}

impl<'a> Drop for PinnedPage<'a> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cache.unget(handle);
        }
    }
}

/// A pinned, claimed, locked page held for mutation. Released (unlock,
/// unclaim, unget, in that order) on drop; marks the page dirty first if
/// [`LockedPage::mark_dirty`] was ever called.
pub(crate) struct LockedPage<'a> {
    cache: &'a dyn Cache,
    handle: Option<PageHandle>,
    dirty: bool,
}

impl<'a> LockedPage<'a> {
    /// Pins `addr`, then claims and locks it, retrying the claim with
    /// bounded exponential backoff.
    pub(crate) fn acquire(cache: &'a dyn Cache, addr: u64, page_type: PageType) -> Self {
        let mut wait = 1u64;
        let handle = loop {
            let handle = cache.get(addr, true, page_type);
            if cache.claim(&handle) {
                break handle;
            }
            cache.unget(handle);
            if wait >= 1024 {
                log::warn!("mini-allocator: claim on page {} still contended at max backoff", addr);
            }
            std::thread::sleep(std::time::Duration::from_micros(wait));
            wait = backoff(wait);
        };
        Self::from_claimed(cache, handle)
    }

    /// Wraps a handle that has already been claimed (but not yet locked),
    /// locking it now. Used by the meta-tail re-check loop in
    /// `allocator.rs`, which needs to re-validate the address between
    /// `get` and `claim`.
    pub(crate) fn from_claimed(cache: &'a dyn Cache, handle: PageHandle) -> Self {
        cache.lock(&handle);
        Self {
            cache,
            handle: Some(handle),
            dirty: false,
        }
    }

    /// Wraps a handle freshly returned by `Cache::alloc`, which grants
    /// exclusive access outright (no separate claim/lock call needed).
    /// Still released through `unlock`/`unclaim`/`unget` on drop.
    pub(crate) fn from_exclusive(cache: &'a dyn Cache, handle: PageHandle) -> Self {
        Self {
            cache,
            handle: Some(handle),
            dirty: false,
        }
    }

    pub(crate) fn addr(&self) -> u64 {
        self.handle.as_ref().unwrap().addr
    }

    pub(crate) fn data(&self) -> &[u8] {
        self.handle.as_ref().unwrap().data()
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.handle.as_ref().unwrap().data_mut()
    }

    /// Marks the page dirty at drop time. Mutating `data_mut()` does not
    /// imply dirtiness on its own; callers must call this explicitly.
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl<'a> Drop for LockedPage<'a> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.dirty {
                self.cache.mark_dirty(&handle);
            }
            self.cache.unlock(&handle);
            self.cache.unclaim(&handle);
            self.cache.unget(handle);
        }
    }
}

/// Doubles `wait`, capping at 1024 (microseconds).
pub(crate) fn backoff(wait: u64) -> u64 {
    if wait >= 1024 {
        1024
    } else {
        wait * 2
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_caps_at_1024() {
        let mut wait = 1u64;
        for _ in 0..20 {
            wait = backoff(wait);
        }
        assert_eq!(wait, 1024);
    }
}
