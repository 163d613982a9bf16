//! Per-batch allocation state.
//!
//! Each batch serializes its own `alloc` calls behind a sentinel-CAS lock
//! on `next_addr`. Batches never contend with each other: a mini
//! allocator with `num_batches > 1` gives independent streams of `alloc`
//! calls independent bump cursors and independent next-extents, trading
//! page-granularity packing for batch-level parallelism.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::page_guard::backoff;

/// Sentinel value of `next_addr` meaning "a thread currently owns this
/// batch's bump cursor". No real page address ever equals this, since
/// address `1` is never page-aligned.
pub(crate) const MINI_WAIT: u64 = 1;

/// The mutable state private to one batch.
#[derive(Debug)]
pub(crate) struct BatchState {
    /// Bump cursor: address of the next page this batch will vend, or
    /// `MINI_WAIT` while a thread holds the lock.
    next_addr: AtomicU64,
    /// Extent this batch will cross into next.
    next_extent: AtomicU64,
    /// Address of the meta page holding this batch's most recent entry.
    last_meta_addr: AtomicU64,
    /// Byte offset, within `last_meta_addr`, of this batch's most recent
    /// entry.
    last_meta_pos: AtomicU32,
}

impl BatchState {
    pub(crate) fn new() -> Self {
        Self {
            next_addr: AtomicU64::new(0),
            next_extent: AtomicU64::new(0),
            last_meta_addr: AtomicU64::new(0),
            last_meta_pos: AtomicU32::new(0),
        }
    }

    /// Spins until this batch's lock is free, then claims it, returning
    /// the `next_addr` value that was locked in.
    pub(crate) fn lock(&self) -> u64 {
        let mut wait = 1u64;
        loop {
            let current = self.next_addr.load(Ordering::Relaxed);
            if current != MINI_WAIT
                && self
                    .next_addr
                    .compare_exchange(current, MINI_WAIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return current;
            }
            if wait >= 1024 {
                log::warn!("mini-allocator: batch lock still contended at max backoff");
            }
            std::thread::sleep(std::time::Duration::from_micros(wait));
            wait = backoff(wait);
        }
    }

    /// Releases this batch's lock, publishing `new_next_addr`.
    pub(crate) fn unlock(&self, new_next_addr: u64) {
        self.next_addr.store(new_next_addr, Ordering::Release);
    }

    pub(crate) fn next_extent(&self) -> u64 {
        self.next_extent.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next_extent(&self, value: u64) {
        self.next_extent.store(value, Ordering::Relaxed);
    }

    pub(crate) fn last_meta_addr(&self) -> u64 {
        self.last_meta_addr.load(Ordering::Relaxed)
    }

    pub(crate) fn last_meta_pos(&self) -> u32 {
        self.last_meta_pos.load(Ordering::Relaxed)
    }

    pub(crate) fn set_last_meta(&self, addr: u64, pos: u32) {
        self.last_meta_addr.store(addr, Ordering::Relaxed);
        self.last_meta_pos.store(pos, Ordering::Relaxed);
    }
}
