//! Collection helpers that keep comparisons stable.

use std::collections::BTreeMap;

/// Union of `base` and `overlay`; keys in `overlay` win.
pub fn merge_maps(
    base: Option<&BTreeMap<String, String>>,
    overlay: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut out = base.cloned().unwrap_or_default();
    if let Some(overlay) = overlay {
        out.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    out
}

/// Absent and empty maps compare equal.
pub fn maps_equivalent<K: Ord, V: PartialEq>(
    a: Option<&BTreeMap<K, V>>,
    b: Option<&BTreeMap<K, V>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (Some(m), None) | (None, Some(m)) => m.is_empty(),
        (None, None) => true,
    }
}

/// Absent and empty lists compare equal.
pub fn lists_equivalent<T: PartialEq>(a: Option<&[T]>, b: Option<&[T]>) -> bool {
    a.unwrap_or_default() == b.unwrap_or_default()
}

pub fn none_if_empty<T>(v: Option<Vec<T>>) -> Option<Vec<T>> {
    v.filter(|v| !v.is_empty())
}

pub fn none_if_empty_map<K, V>(m: Option<BTreeMap<K, V>>) -> Option<BTreeMap<K, V>> {
    m.filter(|m| !m.is_empty())
}
