//! Hash-slot computation.
//!
//! Keys map to one of 16384 slots via CRC16 modulo the slot count. A hash
//! tag (`{...}`) overrides full-key hashing so related keys can be forced
//! onto the same slot.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in the cluster keyspace.
pub const SLOT_COUNT: u16 = 16384;

/// CRC-16/XMODEM: polynomial 0x1021, initial value 0, no reflection, no
/// final XOR. This is the cluster's canonical key hash.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot for a key.
///
/// If the key contains a non-empty hash tag (`{...}`), only the tag content
/// is hashed, so keys sharing a tag land on the same slot and stay eligible
/// for multi-key operations.
///
/// # Examples
///
/// ```
/// use slotwise::key_slot;
///
/// assert_eq!(key_slot("foo"), 12182);
/// assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
/// ```
pub fn key_slot(key: &str) -> u16 {
    let hashed = hash_tag(key);
    CRC16.checksum(hashed.as_bytes()) % SLOT_COUNT
}

/// Extracts the hash tag from a key, or returns the whole key.
///
/// The tag is the substring between the first `{` and the next `}`; an
/// empty tag (`{}`) or unmatched braces leave the whole key in effect.
fn hash_tag(key: &str) -> &str {
    if let Some(open) = key.find('{') {
        if let Some(len) = key[open + 1..].find('}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}
