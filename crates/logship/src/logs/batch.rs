// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory batch owned by the batch service.
//!
//! # Batching Strategy
//!
//! Entries are appended in arrival order until one of two ceilings would be
//! crossed by the next entry:
//! 1. **Count limit**: the batch already holds `max_batch_entries_size` entries
//! 2. **Size limit**: the running byte size plus the next entry reaches
//!    `max_content_size_bytes`
//!
//! When either applies the caller must flush (take) the batch before pushing.
//! The running byte size is therefore always strictly below the content limit.
//!
//! Only the single consumer task mutates a `Batch`, so it holds no locks.

use crate::constants;

/// A serialized log record, opaque to the pipeline.
pub type Entry = Vec<u8>;

#[derive(Debug, Clone)]
pub struct Batch {
    /// Entries waiting for delivery, in enqueue order.
    entries: Vec<Entry>,

    /// Sum of the lengths of `entries`.
    byte_size: usize,

    /// Maximum number of entries per batch.
    ///
    /// Typically [`constants::MAX_BATCH_ENTRIES_SIZE`] (1,000).
    max_batch_entries_size: usize,

    /// Running byte size the batch must stay below.
    ///
    /// Typically [`constants::MAX_CONTENT_SIZE_BYTES`] (5MB).
    max_content_size_bytes: usize,
}

impl Default for Batch {
    fn default() -> Self {
        Batch::new(
            constants::MAX_BATCH_ENTRIES_SIZE,
            constants::MAX_CONTENT_SIZE_BYTES,
        )
    }
}

impl Batch {
    #[must_use]
    pub fn new(max_batch_entries_size: usize, max_content_size_bytes: usize) -> Self {
        Batch {
            entries: Vec::with_capacity(max_batch_entries_size.min(constants::MAX_BATCH_ENTRIES_SIZE)),
            byte_size: 0,
            max_batch_entries_size,
            max_content_size_bytes,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns true when `entry` cannot join the batch without crossing a
    /// ceiling. An empty batch accepts anything.
    #[must_use]
    pub fn is_full_for(&self, entry: &[u8]) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.entries.len() >= self.max_batch_entries_size
            || self.byte_size + entry.len() >= self.max_content_size_bytes
    }

    /// Appends an entry. Callers check [`Batch::is_full_for`] first.
    pub fn push(&mut self, entry: Entry) {
        self.byte_size += entry.len();
        self.entries.push(entry);
    }

    /// Empties the batch, returning its entries in enqueue order.
    pub fn take(&mut self) -> Vec<Entry> {
        self.byte_size = 0;
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create_log_entry(content: &str) -> Entry {
        format!("{{\"message\":\"{content}\"}}").into_bytes()
    }

    #[test]
    fn test_batch_default() {
        let batch = Batch::default();

        assert_eq!(
            batch.max_batch_entries_size,
            constants::MAX_BATCH_ENTRIES_SIZE
        );
        assert_eq!(
            batch.max_content_size_bytes,
            constants::MAX_CONTENT_SIZE_BYTES
        );
        assert!(batch.is_empty());
        assert_eq!(batch.byte_size(), 0);
    }

    #[test]
    fn test_push_tracks_count_and_size() {
        let mut batch = Batch::new(10, 100);
        let log = create_log_entry("a");
        let log_len = log.len();

        batch.push(log.clone());
        batch.push(log);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.byte_size(), 2 * log_len);
    }

    #[test]
    fn test_empty_batch_is_never_full() {
        let batch = Batch::new(1, 10);
        assert!(!batch.is_full_for(&[b'x'; 64]));
    }

    #[test]
    fn test_full_at_max_entries() {
        let mut batch = Batch::new(3, 1000);
        for i in 0..3 {
            let entry = create_log_entry(&i.to_string());
            assert!(!batch.is_full_for(&entry));
            batch.push(entry);
        }
        assert!(batch.is_full_for(&create_log_entry("3")));
    }

    #[test]
    fn test_full_when_size_reaches_content_limit() {
        // 15 + 15 = 30 stays under 31, a third entry reaches 45
        let mut batch = Batch::new(100, 31);
        batch.push(create_log_entry("a"));
        assert!(!batch.is_full_for(&create_log_entry("b")));
        batch.push(create_log_entry("b"));
        assert!(batch.is_full_for(&create_log_entry("c")));
    }

    #[test]
    fn test_full_when_size_lands_exactly_on_limit() {
        let log = create_log_entry("x");
        let mut batch = Batch::new(100, log.len() * 2);
        batch.push(log.clone());
        // equal to the limit is already too much
        assert!(batch.is_full_for(&log));
    }

    #[test]
    fn test_take_resets_batch() {
        let mut batch = Batch::new(10, 1000);
        let logs = vec![
            create_log_entry("first"),
            create_log_entry("second"),
            create_log_entry("third"),
        ];
        for log in logs.clone() {
            batch.push(log);
        }

        let taken = batch.take();

        assert_eq!(taken, logs);
        assert!(batch.is_empty());
        assert_eq!(batch.byte_size(), 0);
        assert!(batch.take().is_empty());
    }

    #[test]
    fn test_thousand_one_byte_entries_fill_one_batch() {
        let mut batch = Batch::default();
        for _ in 0..1000 {
            assert!(!batch.is_full_for(b"1"));
            batch.push(b"1".to_vec());
        }
        assert!(batch.is_full_for(b"1"));
        assert_eq!(batch.take().len(), 1000);
    }

    /// Drives a batch the way the service does and returns every flushed batch.
    fn assemble(entries: Vec<Entry>, max_entries: usize, max_bytes: usize) -> Vec<Vec<Entry>> {
        let mut batch = Batch::new(max_entries, max_bytes);
        let mut flushed = Vec::new();
        for entry in entries {
            if batch.is_full_for(&entry) {
                flushed.push(batch.take());
            }
            batch.push(entry);
        }
        if !batch.is_empty() {
            flushed.push(batch.take());
        }
        flushed
    }

    proptest! {
        #[test]
        fn prop_batches_preserve_order_and_respect_ceilings(
            entries in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..40), 0..300),
            max_entries in 1usize..50,
        ) {
            // entries are at most 39 bytes, below the content limit
            let max_bytes = 200;
            let flushed = assemble(entries.clone(), max_entries, max_bytes);

            for batch in &flushed {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= max_entries);
                prop_assert!(batch.iter().map(Vec::len).sum::<usize>() < max_bytes);
            }

            let delivered: Vec<Entry> = flushed.into_iter().flatten().collect();
            prop_assert_eq!(delivered, entries);
        }
    }
}
