//! Compare two fingerprint maps, yielding updated / existing / removed path
//! lists. Mirrors `internal/stat/stat.go`.

use std::collections::HashMap;
use std::time::SystemTime;

/// `path -> last-modified timestamp`.
pub type Fingerprint = HashMap<String, SystemTime>;

/// Paths in `next` whose timestamp differs from (or is absent in) `prev`,
/// and paths in `next` whose timestamp matches `prev` exactly. Ordering is
/// unspecified.
pub fn updated(prev: &Fingerprint, next: &Fingerprint) -> (Vec<String>, Vec<String>) {
    let mut changed = Vec::with_capacity(next.len());
    let mut existing = Vec::with_capacity(next.len());

    for (path, ts) in next {
        match prev.get(path) {
            Some(prev_ts) if prev_ts == ts => existing.push(path.clone()),
            _ => changed.push(path.clone()),
        }
    }

    (changed, existing)
}

/// Paths present in `prev` but absent from `next`.
pub fn removed(prev: &Fingerprint, next: &Fingerprint) -> Vec<String> {
    prev.keys()
        .filter(|path| !next.contains_key(*path))
        .cloned()
        .collect()
}
