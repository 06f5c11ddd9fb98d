// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # logship
//!
//! Structured JSON logging for services, with build and request-trace
//! metadata on every record, and batched delivery of those records to a
//! remote log intake.
//!
//! ## Modules
//!
//! - [`logs`]: the delivery pipeline (sink, batching, HTTP flusher)
//! - [`pipeline`]: [`LogPipeline`], owner of one pipeline's lifecycle
//! - [`logger`]: `tracing` formatter producing the JSON records
//! - [`metadata`]: build and runtime metadata attached to each record
//! - [`trace`]: trace context propagated through request headers
//! - [`config`], [`constants`], [`error`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pipeline = LogPipeline::new(Config::from_env()?)?;
//! pipeline.start();
//! logship::logger::init("info", Some(pipeline.sink()))?;
//!
//! tracing::info!(user = 42, "signed in");
//!
//! pipeline.shutdown().await;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod error;
pub mod logger;
pub mod logs;
pub mod metadata;
pub mod pipeline;
pub mod trace;

pub use config::{Config, RetryStrategy};
pub use error::{AttemptError, ConfigError, FlushError, SinkError};
pub use logs::flusher::{Flusher, HttpFlusher};
pub use logs::sink::LogSink;
pub use logs::stats::PipelineSnapshot;
pub use metadata::Metadata;
pub use pipeline::LogPipeline;
pub use trace::TraceContext;
