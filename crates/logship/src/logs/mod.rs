// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched delivery of serialized log entries.
//!
//! ```text
//!   callers ──> LogSink ──> mpsc (bounded) ──> BatchService ──> Flusher ──> intake
//!               (size check,                   (batch, timer,    (JSON array,
//!                try_send)                      shutdown)         retries)
//! ```

pub mod batch;
pub mod flusher;
pub mod service;
pub mod sink;
pub mod stats;
