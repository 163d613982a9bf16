//! A per-stream sub-allocator that hands out individual pages carved out
//! of extents, recording its work in a durable metadata log so a caller
//! can later query, prefetch, reference-count or reclaim the extents it
//! vended by key range.
mod actions;
mod allocator;
mod batch;
mod cache;
mod data_config;
mod error;
mod extent_allocator;
mod meta_entry;
mod ops;
mod page_guard;
mod print;
mod traversal;

#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use allocator::{MiniAllocator, MINI_MAX_BATCHES};
pub use cache::{Cache, PageHandle, PageType};
pub use data_config::{is_null_key, DataConfig, LexicographicDataConfig, MAX_INLINE_KEY_SIZE, NULL_KEY};
pub use error::MiniAllocatorError;
pub use extent_allocator::ExtentAllocator;
pub use ops::{count_extents_in_range, extent_count, inc_range, prefetch, sync, zap};
pub use print::print_log;
