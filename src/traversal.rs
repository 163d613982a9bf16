//! Range traversal of the metadata log.
//!
//! `for_each` is the single walk that every read-side operation (zap,
//! inc-range, sync, prefetch, count) is built from. Every entry whose
//! extent overlaps the query range is handed to `action`; its return
//! value becomes the entry's new `zapped` bit, and once *every* entry
//! reachable from `meta_head` carries `zapped == true`, a second
//! read-only pass reclaims the meta pages themselves.
use crate::cache::{Cache, PageType};
use crate::data_config::{is_null_key, DataConfig};
use crate::meta_entry;
use crate::page_guard::{LockedPage, PinnedPage};
use std::cmp::Ordering;

fn key_le(data_config: &dyn DataConfig, a: &[u8], b: &[u8]) -> bool {
    data_config.key_compare(a, b) != Ordering::Greater
}

/// Whether an entry spanning `[entry_start_key, entry_end_key]` overlaps
/// the query range `[query_start_key, query_end_key]`.
pub(crate) fn entry_in_range(
    data_config: Option<&dyn DataConfig>,
    query_start_key: &[u8],
    query_end_key: &[u8],
    entry_start_key: &[u8],
    entry_end_key: &[u8],
) -> bool {
    if is_null_key(query_start_key) && is_null_key(query_end_key) {
        // case 1: full range
        return true;
    }
    let dc = data_config.expect("data_config is required for a non-empty query range");
    if is_null_key(query_end_key) {
        // case 3: point query, using start_key as the point
        key_le(dc, query_start_key, entry_end_key) && key_le(dc, entry_start_key, query_start_key)
    } else {
        // case 2: range query
        key_le(dc, query_start_key, entry_end_key) && key_le(dc, entry_start_key, query_end_key)
    }
}

fn addrs_share_extent(cache: &dyn Cache, left_addr: u64, right_addr: u64) -> bool {
    let extent_size = cache.extent_size() as u64;
    left_addr / extent_size == right_addr / extent_size
}

/// Walks the metadata log reachable from `meta_head`, invoking `action` on
/// the extent of every entry overlapping `[start_key, end_key]`, then
/// reclaiming the log's own meta pages if every entry turned out to be
/// zapped. Returns that `fully_zapped` flag.
///
/// `data_config` may be omitted only for a full-range query (both keys
/// null).
pub(crate) fn for_each<F>(
    cache: &dyn Cache,
    data_config: Option<&dyn DataConfig>,
    page_type: PageType,
    meta_head: u64,
    start_key: &[u8],
    end_key: &[u8],
    mut action: F,
) -> bool
where
    F: FnMut(u64) -> bool,
{
    debug_assert!(data_config.is_some() || is_null_key(start_key));

    let mut fully_zapped = true;
    let mut next_meta_addr = meta_head;
    loop {
        let mut meta_page = LockedPage::acquire(cache, next_meta_addr, page_type);

        let num_entries = meta_entry::num_entries(meta_page.data());
        let mut pos = meta_entry::HEADER_SIZE;
        for _ in 0..num_entries {
            let data = meta_page.data();
            let entry_start = meta_entry::start_key(data, pos);
            let entry_end = meta_entry::end_key(data, pos);
            let extent_in_range =
                entry_in_range(data_config, start_key, end_key, entry_start, entry_end);

            if extent_in_range {
                if meta_entry::zapped(data, pos) {
                    log::error!(
                        "mini-allocator: entry {} already zapped",
                        meta_entry::extent_addr(data, pos)
                    );
                }
                assert!(
                    !meta_entry::zapped(data, pos),
                    "mini-allocator: entry {} already zapped",
                    meta_entry::extent_addr(data, pos)
                );
                let extent_addr = meta_entry::extent_addr(data, pos);
                let result = action(extent_addr);
                let data_mut = meta_page.data_mut();
                meta_entry::set_zapped(data_mut, pos, result);
                meta_page.mark_dirty();
            }

            fully_zapped = fully_zapped && meta_entry::zapped(meta_page.data(), pos);
            pos += meta_entry::entry_size_at(meta_page.data(), pos);
        }

        next_meta_addr = meta_entry::next_meta_addr(meta_page.data());
        drop(meta_page);

        if next_meta_addr == 0 {
            break;
        }
    }

    if fully_zapped {
        let mut next_meta_addr = meta_head;
        loop {
            let meta_page = PinnedPage::new(cache, cache.get(next_meta_addr, true, page_type));
            let last_meta_addr = next_meta_addr;
            next_meta_addr = meta_entry::next_meta_addr(meta_page.data());
            drop(meta_page);

            if !addrs_share_extent(cache, last_meta_addr, next_meta_addr) {
                let extent_size = cache.extent_size() as u64;
                let last_meta_base_addr = last_meta_addr / extent_size * extent_size;
                action(last_meta_base_addr);
            }

            if next_meta_addr == 0 {
                break;
            }
        }
    }

    fully_zapped
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data_config::LexicographicDataConfig;

    #[test]
    fn full_range_matches_every_entry() {
        assert!(entry_in_range(None, b"", b"", b"a", b"z"));
    }

    #[test]
    fn point_query_inside_entry() {
        let dc = LexicographicDataConfig;
        assert!(entry_in_range(Some(&dc), b"m", b"", b"a", b"z"));
        assert!(!entry_in_range(Some(&dc), b"m", b"", b"n", b"z"));
    }

    #[test]
    fn range_query_overlap() {
        let dc = LexicographicDataConfig;
        assert!(entry_in_range(Some(&dc), b"a", b"c", b"b", b"d"));
        assert!(!entry_in_range(Some(&dc), b"a", b"b", b"c", b"d"));
    }
}
