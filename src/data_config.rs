//! Key comparison, copying and formatting: the last external collaborator.
//! The mini-allocator treats keys as opaque byte slices of bounded
//! length; logical order is defined entirely by `key_compare`, never by
//! byte order.
use std::cmp::Ordering;

/// Maximum length, in bytes, of a key stored inline in a meta entry.
pub const MAX_INLINE_KEY_SIZE: usize = 256;

/// A zero-length key is the sentinel for "unspecified bound" everywhere a
/// mini-allocator call takes a key (a "null slice").
pub const NULL_KEY: &[u8] = &[];

/// Returns whether `key` is the null-slice sentinel.
#[inline]
pub fn is_null_key(key: &[u8]) -> bool {
    key.is_empty()
}

/// The key-comparison / message-merging policy collaborator.
///
/// This crate never inspects key bytes itself beyond copying and bounds
/// checks; all logical ordering goes through `key_compare`.
pub trait DataConfig: Sync {
    /// Three-way comparison, in the spirit of `Ord::cmp`.
    fn key_compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Renders `key` for the debug printer.
    fn key_to_string(&self, key: &[u8]) -> String;

    /// Copies `src` into `dst`.  `dst` must be at least `src.len()` bytes.
    ///
    /// The default implementation is a plain byte copy; data configs with
    /// an exotic on-disk key encoding may override it.
    fn key_copy(&self, dst: &mut [u8], src: &[u8]) {
        dst[..src.len()].copy_from_slice(src);
    }
}

/// A `DataConfig` over keys compared lexicographically as raw bytes.
///
/// Used by this crate's own tests as a minimal, concrete stand-in for a
/// real key-comparison policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicographicDataConfig;

impl DataConfig for LexicographicDataConfig {
    fn key_compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn key_to_string(&self, key: &[u8]) -> String {
        match std::str::from_utf8(key) {
            Ok(s) => s.to_string(),
            Err(_) => format!("{:02x?}", key),
        }
    }
}
