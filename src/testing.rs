//! In-memory test doubles for [`crate::cache::Cache`] and
//! [`crate::extent_allocator::ExtentAllocator`]: a minimal but functioning
//! stand-in good enough to drive this crate's own test suite, not a
//! production implementation.
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::cache::{Cache, PageHandle, PageType};
use crate::error::MiniAllocatorError;
use crate::extent_allocator::ExtentAllocator;

/// Default page size used by [`InMemoryCache::new`]. Shrunk under
/// `test_only_small_constants` so a handful of `alloc` calls is enough to
/// exercise meta-page growth, instead of needing hundreds of iterations
/// against a realistic page size.
#[cfg(not(feature = "test_only_small_constants"))]
pub const PAGE_SIZE: usize = 4096;
#[cfg(feature = "test_only_small_constants")]
pub const PAGE_SIZE: usize = 512;

/// Default extent size, in pages, used by [`InMemoryCache::new`].
pub const PAGES_PER_EXTENT: usize = 4;
pub const EXTENT_SIZE: u64 = (PAGE_SIZE * PAGES_PER_EXTENT) as u64;

/// A `PageType` tests can use when the value doesn't matter.
pub const TEST_PAGE_TYPE: PageType = PageType(0);

struct ExtentTable {
    extent_size: u64,
    refcounts: HashMap<u64, u32>,
    next_addr: u64,
}

/// Ground truth for extent allocation and refcounting, shared between an
/// [`InMemoryCache`]'s `dealloc` and its paired `ExtentAllocator` — mirror
/// of how a real cache and the extent allocator underneath it share one
/// underlying extent table.
pub struct InMemoryExtentAllocator {
    table: Mutex<ExtentTable>,
}

impl InMemoryExtentAllocator {
    /// `first_addr` is the address of the extent the caller will use for
    /// `meta_head`; the allocator starts vending extents after it.
    pub fn new(first_addr: u64) -> Arc<Self> {
        Self::with_extent_size(first_addr, EXTENT_SIZE)
    }

    /// As [`Self::new`], but with a caller-chosen extent size. Tests that
    /// want every `alloc` to cross into a fresh extent (one page per
    /// extent) use this with `extent_size == page_size`.
    pub fn with_extent_size(first_addr: u64, extent_size: u64) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(ExtentTable {
                extent_size,
                refcounts: HashMap::new(),
                next_addr: first_addr + extent_size,
            }),
        })
    }

    fn dec_refcount(&self, base_addr: u64) -> u32 {
        let mut table = self.table.lock().unwrap();
        let rc = table.refcounts.entry(base_addr).or_insert(0);
        if *rc > 0 {
            *rc -= 1;
        }
        *rc
    }
}

impl ExtentAllocator for InMemoryExtentAllocator {
    fn alloc_extent(&self) -> Result<u64, MiniAllocatorError> {
        let mut table = self.table.lock().unwrap();
        let addr = table.next_addr;
        table.next_addr += table.extent_size;
        table.refcounts.insert(addr, 1);
        Ok(addr)
    }

    fn inc_refcount(&self, base_addr: u64) {
        let mut table = self.table.lock().unwrap();
        *table.refcounts.entry(base_addr).or_insert(0) += 1;
    }

    fn get_refcount(&self, base_addr: u64) -> u32 {
        let table = self.table.lock().unwrap();
        *table.refcounts.get(&base_addr).unwrap_or(&0)
    }
}

struct PageState {
    data: Vec<u8>,
    claimed: bool,
    dirty: bool,
}

/// An in-memory stand-in for a real buffer cache. Pages live for as long
/// as the `InMemoryCache` does; `dealloc` only forwards to the paired
/// [`InMemoryExtentAllocator`]'s refcount, it does not reclaim page
/// storage (tests never reuse an address after it's been zapped).
pub struct InMemoryCache {
    page_size: usize,
    extent_size: u64,
    extents: Arc<InMemoryExtentAllocator>,
    pages: Mutex<HashMap<u64, PageState>>,
}

impl InMemoryCache {
    pub fn new(extents: Arc<InMemoryExtentAllocator>) -> Self {
        Self::with_sizes(PAGE_SIZE, EXTENT_SIZE, extents)
    }

    /// As [`Self::new`], but with caller-chosen page/extent sizes. Must
    /// agree with the sizes the paired `extents` allocator was built with.
    pub fn with_sizes(page_size: usize, extent_size: u64, extents: Arc<InMemoryExtentAllocator>) -> Self {
        Self {
            page_size,
            extent_size,
            extents,
            pages: Mutex::new(HashMap::new()),
        }
    }

    fn handle_for(pages: &mut HashMap<u64, PageState>, addr: u64) -> PageHandle {
        let page = pages.get_mut(&addr).expect("page must already be pinned");
        let ptr = NonNull::new(page.data.as_mut_ptr()).expect("page data is never empty");
        unsafe { PageHandle::new(addr, ptr, page.data.len()) }
    }
}

impl Cache for InMemoryCache {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn extent_size(&self) -> usize {
        self.extent_size as usize
    }

    fn alloc(&self, addr: u64, _page_type: PageType) -> PageHandle {
        let mut pages = self.pages.lock().unwrap();
        pages.insert(
            addr,
            PageState {
                data: vec![0u8; self.page_size],
                claimed: true,
                dirty: false,
            },
        );
        Self::handle_for(&mut pages, addr)
    }

    fn get(&self, addr: u64, _wait: bool, _page_type: PageType) -> PageHandle {
        let mut pages = self.pages.lock().unwrap();
        let page_size = self.page_size;
        pages.entry(addr).or_insert_with(|| PageState {
            data: vec![0u8; page_size],
            claimed: false,
            dirty: false,
        });
        Self::handle_for(&mut pages, addr)
    }

    fn claim(&self, page: &PageHandle) -> bool {
        let mut pages = self.pages.lock().unwrap();
        let state = pages.get_mut(&page.addr).expect("page must be pinned");
        if state.claimed {
            false
        } else {
            state.claimed = true;
            true
        }
    }

    fn unclaim(&self, page: &PageHandle) {
        let mut pages = self.pages.lock().unwrap();
        let state = pages.get_mut(&page.addr).expect("page must be pinned");
        state.claimed = false;
    }

    fn lock(&self, _page: &PageHandle) {}

    fn unlock(&self, _page: &PageHandle) {}

    fn mark_dirty(&self, page: &PageHandle) {
        let mut pages = self.pages.lock().unwrap();
        let state = pages.get_mut(&page.addr).expect("page must be pinned");
        state.dirty = true;
    }

    fn unget(&self, _page: PageHandle) {}

    fn dealloc(&self, addr: u64, _page_type: PageType) -> bool {
        self.extents.dec_refcount(addr) == 0
    }

    fn extent_sync(&self, base_addr: u64, pages_outstanding: &mut u64) {
        let mut pages = self.pages.lock().unwrap();
        for offset in (0..self.extent_size).step_by(self.page_size) {
            if let Some(state) = pages.get_mut(&(base_addr + offset)) {
                state.dirty = false;
            }
        }
        *pages_outstanding += 0;
    }

    fn prefetch(&self, _addr: u64, _page_type: PageType) {}
}
