// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits for the log intake and the delivery pipeline.
//!
//! These are the defaults every [`crate::config::Config`] starts from. The
//! intake rejects requests above the content and count limits, so the batch
//! assembler never builds a batch that crosses them.

use std::time::Duration;

/// Maximum content size per request (uncompressed) in bytes: 5MB.
///
/// A batch is flushed before an entry that would bring its running byte size
/// to this value is appended.
pub const MAX_CONTENT_SIZE_BYTES: usize = 5 * 1_024 * 1_024;

/// Maximum size of a single log entry in bytes: 256kB.
///
/// Unlike the intake, the sink does not truncate: larger entries are rejected
/// with [`crate::error::SinkError::EntryTooLarge`].
pub const MAX_LOG_SIZE_BYTES: usize = 256 * 1_024;

/// Maximum number of log entries sent in a single request.
pub const MAX_BATCH_ENTRIES_SIZE: usize = 1_000;

/// Capacity of the queue between the sink and the batch assembler.
pub const QUEUE_CAPACITY: usize = 1_000;

/// Delivery attempts per batch before it is dropped.
pub const MAX_DELIVERY_ATTEMPTS: u64 = 5;

/// Linear backoff step between delivery attempts, in milliseconds.
pub const RETRY_BACKOFF_STEP_MS: u64 = 10;

/// Interval of the periodic flush that bounds delivery latency.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Per-request HTTP timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Intake used when `LOGSHIP_LOGS_URL` is not set.
pub const DEFAULT_LOGS_URL: &str = "https://in.logs.betterstack.com";
