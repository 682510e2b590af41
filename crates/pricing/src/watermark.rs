//! Highest committed height per denom

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use liqcap_core::{Denom, Height};

/// Per-denom height watermark.
///
/// Heights only move forward. Overlapping repricing cycles race on
/// [`HeightWatermark::commit_if_newer`], and the loser sees `false`.
#[derive(Debug, Default)]
pub struct HeightWatermark {
    heights: DashMap<Denom, Height>,
}

impl HeightWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, denom: &str) -> Option<Height> {
        self.heights.get(denom).map(|h| *h)
    }

    /// True if a later height has already been committed for `denom`
    pub fn is_stale(&self, denom: &str, height: Height) -> bool {
        self.get(denom).is_some_and(|committed| height < committed)
    }

    /// Records `height` for `denom` unless a later height is already committed.
    /// The check and the write happen under the same shard lock.
    pub fn commit_if_newer(&self, denom: &str, height: Height) -> bool {
        match self.heights.entry(denom.to_string()) {
            Entry::Occupied(mut committed) => {
                if height < *committed.get() {
                    return false;
                }
                committed.insert(height);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(height);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_heights_never_move_backwards() {
        let watermark = HeightWatermark::new();

        assert!(!watermark.is_stale("uosmo", 1));
        assert!(watermark.commit_if_newer("uosmo", 10));
        assert!(watermark.commit_if_newer("uosmo", 10));
        assert!(!watermark.commit_if_newer("uosmo", 9));
        assert!(watermark.is_stale("uosmo", 9));
        assert!(!watermark.is_stale("uosmo", 11));
        assert_eq!(watermark.get("uosmo"), Some(10));
        assert_eq!(watermark.get("atom"), None);
    }

    #[test]
    fn test_concurrent_commits_keep_maximum() {
        let watermark = Arc::new(HeightWatermark::new());

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let watermark = Arc::clone(&watermark);
                thread::spawn(move || {
                    for h in (0..500u64).map(|i| i * 8 + t) {
                        watermark.commit_if_newer("uosmo", h);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(watermark.get("uosmo"), Some(499 * 8 + 7));
        assert_eq!(watermark.len(), 1);
    }
}
