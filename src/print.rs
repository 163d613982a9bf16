//! Debug printer for a metadata log. Pins each meta page read-only; never
//! claims or locks, so it may race a concurrent writer and show a torn
//! snapshot — acceptable for a diagnostic tool.
use crate::cache::{Cache, PageType};
use crate::data_config::DataConfig;
use crate::extent_allocator::ExtentAllocator;
use crate::meta_entry;

/// Logs one line per meta page (`meta addr <addr>`) followed by one line
/// per entry: index, extent address, start key, end key, zapped flag, and
/// current refcount.
pub fn print_log(
    cache: &dyn Cache,
    extent_allocator: &dyn ExtentAllocator,
    data_config: &dyn DataConfig,
    page_type: PageType,
    meta_head: u64,
) {
    let mut next_meta_addr = meta_head;
    loop {
        let handle = cache.get(next_meta_addr, true, page_type);
        let data = handle.data();

        log::debug!("meta addr {}", next_meta_addr);

        let num_entries = meta_entry::num_entries(data);
        let mut pos = meta_entry::HEADER_SIZE;
        for i in 0..num_entries {
            let extent_addr = meta_entry::extent_addr(data, pos);
            let start_key_str = data_config.key_to_string(meta_entry::start_key(data, pos));
            let end_key_str = data_config.key_to_string(meta_entry::end_key(data, pos));
            let zapped = meta_entry::zapped(data, pos);
            let ref_count = extent_allocator.get_refcount(extent_addr);
            log::debug!(
                "{:2} {:12} {} {} {} ({})",
                i,
                extent_addr,
                start_key_str,
                end_key_str,
                zapped,
                ref_count
            );
            pos += meta_entry::entry_size_at(data, pos);
        }

        next_meta_addr = meta_entry::next_meta_addr(data);
        cache.unget(handle);

        if next_meta_addr == 0 {
            break;
        }
    }
}
