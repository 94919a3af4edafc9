// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C1: BSSID-keyed scan-result store with age eviction (spec §4.1).
//!
//! Thread-safe via a single short-held mutex; neither operation calls back
//! into the FSM while holding the lock (spec §5).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::{Mac, ScanResult};

#[derive(Debug, thiserror::Error)]
#[error("requested maxAge {requested} exceeds configured maxAge {configured}")]
pub struct MaxAgeExceeded {
    requested: u64,
    configured: u64,
}

pub struct ScanCache {
    max_age_ms: u64,
    entries: Mutex<HashMap<Mac, ScanResult>>,
}

impl ScanCache {
    pub fn new(max_age_ms: u64) -> Self {
        ScanCache { max_age_ms, entries: Mutex::new(HashMap::new()) }
    }

    /// Prunes entries older than `maxAge`, then merges `batch` in: an
    /// incoming result replaces the stored one only if its timestamp is
    /// strictly greater (equal timestamps are suppressed to stay
    /// deterministic under duplicate frames, spec §4.1).
    pub fn update(&self, now_ms: u64, batch: Vec<ScanResult>) {
        let mut entries = self.entries.lock();
        entries.retain(|_, v| now_ms.saturating_sub(v.timestamp_ms) <= self.max_age_ms);
        for incoming in batch {
            match entries.get(&incoming.bssid) {
                Some(existing) if existing.timestamp_ms >= incoming.timestamp_ms => {
                    // stale or duplicate frame; drop silently
                }
                _ => {
                    entries.insert(incoming.bssid, incoming);
                }
            }
        }
    }

    /// Returns copies of all entries no older than `maxAge`. Fails if
    /// `maxAge` exceeds the cache's configured maximum.
    pub fn snapshot(&self, now_ms: u64, max_age_ms: u64) -> Result<Vec<ScanResult>, MaxAgeExceeded> {
        if max_age_ms > self.max_age_ms {
            return Err(MaxAgeExceeded { requested: max_age_ms, configured: self.max_age_ms });
        }
        let entries = self.entries.lock();
        Ok(entries
            .values()
            .filter(|v| now_ms.saturating_sub(v.timestamp_ms) <= max_age_ms)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(bssid: u8, ts: u64) -> ScanResult {
        ScanResult { bssid: Mac([bssid, 0, 0, 0, 0, 0]), timestamp_ms: ts, payload: vec![] }
    }

    #[test]
    fn later_timestamp_replaces_stored_entry() {
        let cache = ScanCache::new(1000);
        cache.update(100, vec![result(1, 100)]);
        cache.update(100, vec![result(1, 50)]);
        let snap = cache.snapshot(200, 1000).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].timestamp_ms, 100);
    }

    #[test]
    fn equal_timestamp_is_ignored() {
        let cache = ScanCache::new(1000);
        cache.update(100, vec![result(1, 100)]);
        cache.update(100, vec![ScanResult { payload: vec![9], ..result(1, 100) }]);
        let snap = cache.snapshot(200, 1000).unwrap();
        assert_eq!(snap[0].payload, Vec::<u8>::new());
    }

    #[test]
    fn snapshot_excludes_aged_out_entries() {
        let cache = ScanCache::new(1000);
        cache.update(0, vec![result(1, 0)]);
        let snap = cache.snapshot(2000, 10).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn snapshot_rejects_max_age_over_configured() {
        let cache = ScanCache::new(10);
        assert!(cache.snapshot(100, 11).is_err());
    }

    #[test]
    fn update_prunes_before_merging() {
        let cache = ScanCache::new(10);
        cache.update(0, vec![result(1, 0)]);
        // now=100 is far past maxAge; the stale entry is pruned even though
        // this batch doesn't touch BSSID 1.
        cache.update(100, vec![result(2, 100)]);
        let snap = cache.snapshot(100, 10).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].bssid, Mac([2, 0, 0, 0, 0, 0]));
    }
}
