// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

use reqwest::StatusCode;

/// Errors returned synchronously to a caller writing into a [`crate::logs::sink::LogSink`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("log entry too large: {size} bytes > {max} bytes")]
    EntryTooLarge { size: usize, max: usize },

    #[error("failed to write log, queue is full")]
    QueueFull,

    #[error("failed to write log, pipeline is shut down")]
    Closed,
}

impl From<SinkError> for io::Error {
    fn from(err: SinkError) -> Self {
        let kind = match err {
            SinkError::EntryTooLarge { .. } => io::ErrorKind::InvalidInput,
            SinkError::QueueFull => io::ErrorKind::WouldBlock,
            SinkError::Closed => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, err)
    }
}

/// A single failed delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to send logs: {0}")]
    Status(StatusCode),
}

/// Errors produced while flushing a batch.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    /// The batch could not be serialized. Not retried.
    #[error("failed to encode batch: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Every attempt failed; the batch is dropped.
    #[error("failed to send logs after {attempts} attempts: [{}]", join_errors(.errors))]
    Delivery {
        attempts: u64,
        errors: Vec<AttemptError>,
    },
}

fn join_errors(errors: &[AttemptError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("LOGSHIP_API_KEY environment variable is not set")]
    MissingApiKey,

    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error("Invalid logs URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}
