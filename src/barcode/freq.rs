//! Concurrent barcode frequency table.
//!
//! Many density-pipeline workers upsert into the table with no external
//! synchronization; once the pipeline joins, the table is read-only and can
//! be snapshotted for the knee selector.

use dashmap::DashMap;

/// Thread-safe map from barcode to observation count.
#[derive(Debug, Default)]
pub struct FreqCounter {
    map: DashMap<String, u32>,
}

impl FreqCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Increment the count for `barcode`, inserting with count 1 if absent.
    ///
    /// Safe from arbitrarily many threads.
    pub fn upsert(&self, barcode: &str) {
        self.map
            .entry(barcode.to_owned())
            .and_modify(|c| *c += 1)
            .or_insert(1);
    }

    /// Snapshot read of a single barcode's count.
    pub fn find(&self, barcode: &str) -> Option<u32> {
        self.map.get(barcode).map(|e| *e.value())
    }

    /// Whether `barcode` has been observed at all.
    pub fn contains(&self, barcode: &str) -> bool {
        self.map.contains_key(barcode)
    }

    /// Number of distinct barcodes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Collect the table into `(barcode, count)` pairs.
    ///
    /// Only valid after all writers have finished; iteration order is
    /// unspecified.
    pub fn snapshot(&self) -> Vec<(String, u32)> {
        self.map
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_find() {
        let fc = FreqCounter::new();
        fc.upsert("ACGT");
        fc.upsert("ACGT");
        fc.upsert("TTTT");
        assert_eq!(fc.find("ACGT"), Some(2));
        assert_eq!(fc.find("TTTT"), Some(1));
        assert_eq!(fc.find("GGGG"), None);
        assert!(fc.contains("ACGT"));
        assert!(!fc.contains("GGGG"));
        assert_eq!(fc.len(), 2);
    }

    #[test]
    fn test_snapshot_counts() {
        let fc = FreqCounter::new();
        for _ in 0..5 {
            fc.upsert("AAAA");
        }
        fc.upsert("CCCC");
        let mut snap = fc.snapshot();
        snap.sort();
        assert_eq!(
            snap,
            vec![("AAAA".to_string(), 5), ("CCCC".to_string(), 1)]
        );
    }

    #[test]
    fn test_concurrent_upserts() {
        use std::sync::Arc;
        let fc = Arc::new(FreqCounter::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let fc = Arc::clone(&fc);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    fc.upsert("ACGTACGT");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(fc.find("ACGTACGT"), Some(4000));
    }
}
