// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The single consumer of the log queue.
//!
//! [`BatchService::run`] waits on three sources and services whichever is
//! ready first, in this priority order:
//!
//! 1. **Shutdown**: the cancellation token fired. The queue is closed, every
//!    entry still in it is batched, the remainder is flushed and the loop ends.
//! 2. **Tick**: the periodic timer elapsed. A non-empty batch is flushed.
//! 3. **Entry**: a new entry was dequeued. If it does not fit in the current
//!    batch, the batch is flushed first, then the entry is appended.
//!
//! Flushes are awaited in the loop, so no entry is dequeued while a delivery
//! (including its backoff sleeps) is in progress. A cancellation arriving
//! during a flush is observed on the next iteration. Entries that reached the
//! queue before the queue was closed are always delivered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Config;
use crate::logs::batch::{Batch, Entry};
use crate::logs::flusher::Flusher;
use crate::logs::stats::PipelineCounters;

pub struct BatchService<F: Flusher> {
    rx: mpsc::Receiver<Entry>,
    batch: Batch,
    flusher: F,
    flush_interval: Duration,
    cancel_token: CancellationToken,
    counters: Arc<PipelineCounters>,
}

impl<F: Flusher> BatchService<F> {
    #[must_use]
    pub fn new(
        rx: mpsc::Receiver<Entry>,
        config: &Config,
        flusher: F,
        cancel_token: CancellationToken,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        BatchService {
            rx,
            batch: Batch::new(config.max_batch_entries_size, config.max_content_size_bytes),
            flusher,
            flush_interval: config.flush_interval,
            cancel_token,
            counters,
        }
    }

    /// Runs until cancelled or until every sender is gone.
    pub async fn run(mut self) {
        // first tick one full interval after start
        let mut interval = time::interval_at(
            Instant::now() + self.flush_interval,
            self.flush_interval,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "LOGS | Batch service started, flushing every {} ms",
            self.flush_interval.as_millis()
        );

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("LOGS | Received shutdown signal, draining remaining entries");
                    self.drain().await;
                    break;
                }
                _ = interval.tick() => {
                    self.flush().await;
                }
                entry = self.rx.recv() => match entry {
                    Some(entry) => self.add(entry).await,
                    None => {
                        debug!("LOGS | All sinks dropped, flushing final batch");
                        self.flush().await;
                        break;
                    }
                },
            }
        }

        debug!("LOGS | Batch service stopped");
    }

    async fn add(&mut self, entry: Entry) {
        if self.batch.is_full_for(&entry) {
            self.flush().await;
        }
        self.batch.push(entry);
    }

    /// Closes the queue and batches whatever producers managed to enqueue.
    ///
    /// After `close` no new permits are handed out; `recv` still yields every
    /// entry already sent, waits for in-flight permits, then returns `None`.
    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0;
        while let Some(entry) = self.rx.recv().await {
            self.add(entry).await;
            drained += 1;
        }
        if drained > 0 {
            debug!("LOGS | Drained {} entries from the queue", drained);
        }
        self.flush().await;
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let entries = self.batch.take();
        match self.flusher.flush(&entries).await {
            Ok(()) => {
                debug!("LOGS | Flushed batch of {} entries", entries.len());
                self.counters.record_delivered(entries.len());
            }
            Err(e) => {
                error!("LOGS | Failed to flush {} entries: {}", entries.len(), e);
                self.counters.record_failed(entries.len());
            }
        }
    }
}
