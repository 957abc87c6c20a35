//! Merge policy for concurrent writers
//!
//! Position updates, media-ended handlers and quiz submissions can land on
//! the same lesson in any order. Every write goes through one of these:
//! positions take the max, flags OR together, sets union.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Max-merge a position into a map. Returns true if the stored value grew.
pub fn max_merge<K: Eq + Hash>(map: &mut HashMap<K, f64>, key: K, value: f64) -> bool {
    if !value.is_finite() || value < 0.0 {
        return false;
    }
    let slot = map.entry(key).or_insert(0.0);
    if value > *slot {
        *slot = value;
        true
    } else {
        false
    }
}

/// OR-merge a one-way flag. Returns true only on a false -> true flip.
pub fn or_merge<K: Eq + Hash>(map: &mut HashMap<K, bool>, key: K, value: bool) -> bool {
    let slot = map.entry(key).or_insert(false);
    let flipped = value && !*slot;
    *slot = *slot || value;
    flipped
}

/// Union `incoming` into `set`. Returns the number of new members.
pub fn union<T: Ord + Clone>(set: &mut BTreeSet<T>, incoming: impl IntoIterator<Item = T>) -> usize {
    let before = set.len();
    set.extend(incoming);
    set.len() - before
}
