// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Write boundary of the pipeline.
//!
//! A [`LogSink`] is cheap to clone and can be shared across threads and tasks.
//! Writes never block: an entry that does not fit in the queue is rejected
//! with [`SinkError::QueueFull`] instead of waiting for the consumer.
//!
//! The sink also implements [`std::io::Write`] and tracing-subscriber's
//! [`MakeWriter`], so a formatting layer can write encoded records straight
//! into the pipeline, one record per write.

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing_subscriber::fmt::MakeWriter;

use crate::error::SinkError;
use crate::logs::batch::Entry;
use crate::logs::stats::PipelineCounters;

#[derive(Clone, Debug)]
pub struct LogSink {
    tx: mpsc::Sender<Entry>,
    max_log_size_bytes: usize,
    counters: Arc<PipelineCounters>,
}

impl LogSink {
    pub(crate) fn new(
        tx: mpsc::Sender<Entry>,
        max_log_size_bytes: usize,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        LogSink {
            tx,
            max_log_size_bytes,
            counters,
        }
    }

    /// Copies `entry` into the queue.
    ///
    /// Returns the number of bytes accepted, which is always `entry.len()`.
    pub fn write(&self, entry: &[u8]) -> Result<usize, SinkError> {
        self.send(entry.to_vec())
    }

    /// Moves an owned entry into the queue.
    pub fn send(&self, entry: Entry) -> Result<usize, SinkError> {
        let size = entry.len();
        if size > self.max_log_size_bytes {
            self.counters.record_too_large();
            return Err(SinkError::EntryTooLarge {
                size,
                max: self.max_log_size_bytes,
            });
        }

        match self.tx.try_send(entry) {
            Ok(()) => {
                self.counters.record_accepted();
                Ok(size)
            }
            Err(TrySendError::Full(_)) => {
                self.counters.record_queue_full();
                Err(SinkError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// Returns true once the batch service has stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        LogSink::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
