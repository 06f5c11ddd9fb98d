// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery counters for a pipeline.
//!
//! Every entry accepted by the sink is eventually counted either as delivered
//! or as dropped, which is the only record kept of best-effort losses.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct PipelineCounters {
    entries_accepted: AtomicU64,
    entries_too_large: AtomicU64,
    entries_queue_full: AtomicU64,
    batches_delivered: AtomicU64,
    entries_delivered: AtomicU64,
    batches_failed: AtomicU64,
    entries_dropped: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn record_accepted(&self) {
        self.entries_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_too_large(&self) {
        self.entries_too_large.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_full(&self) {
        self.entries_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, entries: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.entries_delivered
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, entries: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.entries_dropped.fetch_add(entries as u64, Ordering::Relaxed);
    }

    /// Captures a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            entries_accepted: self.entries_accepted.load(Ordering::Relaxed),
            entries_too_large: self.entries_too_large.load(Ordering::Relaxed),
            entries_queue_full: self.entries_queue_full.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            entries_delivered: self.entries_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Plain data representation of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    /// Entries enqueued by the sink.
    pub entries_accepted: u64,
    /// Entries rejected for exceeding the per-entry limit.
    pub entries_too_large: u64,
    /// Entries rejected because the queue was at capacity.
    pub entries_queue_full: u64,
    /// Batches the intake accepted.
    pub batches_delivered: u64,
    /// Entries inside delivered batches.
    pub entries_delivered: u64,
    /// Batches dropped after an encoding failure or exhausted retries.
    pub batches_failed: u64,
    /// Entries inside failed batches.
    pub entries_dropped: u64,
}

impl fmt::Display for PipelineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries_accepted={}, entries_too_large={}, entries_queue_full={}, batches_delivered={}, entries_delivered={}, batches_failed={}, entries_dropped={}",
            self.entries_accepted,
            self.entries_too_large,
            self.entries_queue_full,
            self.batches_delivered,
            self.entries_delivered,
            self.batches_failed,
            self.entries_dropped,
        )
    }
}
