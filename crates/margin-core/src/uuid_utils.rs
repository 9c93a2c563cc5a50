//! UUID v7 utilities for time-ordered identifiers.
//!
//! UUIDv7 embeds a Unix millisecond timestamp in its first 48 bits, so ids
//! generated later sort after ids generated earlier. Transcript entries,
//! events and uploaded filenames all use them.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use margin_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
