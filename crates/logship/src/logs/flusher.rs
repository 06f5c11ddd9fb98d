// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of batches to the log intake.
//!
//! A batch is encoded as a JSON array of the raw entries and sent with one
//! HTTP POST per attempt:
//!
//! ```text
//!   Batch ──> encode_batch ──> POST <logs_url> ──> 2xx/3xx? ──> done
//!                                   ^                 │
//!                                   └── sleep step*i ─┘ (up to N attempts)
//! ```
//!
//! A status of 400 or above counts as a failed attempt, as does a transport
//! error. After the last attempt the batch is dropped and the collected
//! errors are returned in [`FlushError::Delivery`].

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::value::RawValue;
use tracing::{debug, error};

use crate::config::{Config, RetryStrategy};
use crate::error::{AttemptError, ConfigError, FlushError};
use crate::logs::batch::Entry;

/// Ships one batch of entries somewhere.
///
/// The batch service awaits each flush before servicing its queue again.
#[async_trait]
pub trait Flusher: Send + Sync {
    async fn flush(&self, entries: &[Entry]) -> Result<(), FlushError>;
}

/// Encodes entries as a JSON array without re-encoding them.
///
/// Each entry must be a complete JSON value; whitespace around it (such as the
/// newline a formatter appends) is dropped, the value itself is copied as is.
pub fn encode_batch(entries: &[Entry]) -> Result<Vec<u8>, serde_json::Error> {
    let values = entries
        .iter()
        .map(|entry| serde_json::from_slice::<&RawValue>(entry))
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_vec(&values)
}

/// Flusher for a single HTTP logs endpoint.
#[derive(Debug, Clone)]
pub struct HttpFlusher {
    /// HTTP client, shared connection pool across attempts.
    client: reqwest::Client,
    /// Full intake URL, batches are posted here as is.
    endpoint: String,
    headers: HeaderMap,
    retry_strategy: RetryStrategy,
}

impl HttpFlusher {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let api_key =
            HeaderValue::from_str(&config.api_key).map_err(|_| ConfigError::InvalidApiKey)?;
        headers.insert(AUTHORIZATION, api_key);

        Ok(HttpFlusher {
            client: get_client(config),
            endpoint: config.logs_url.clone(),
            headers,
            retry_strategy: config.retry_strategy,
        })
    }

    async fn send(&self, body: Bytes) -> Result<(), FlushError> {
        let attempts = self.retry_strategy.attempts();
        let mut errors = Vec::new();

        for attempt in 0..attempts {
            let delay = self.retry_strategy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let time = Instant::now();
            let resp = self
                .client
                .post(&self.endpoint)
                .headers(self.headers.clone())
                .body(body.clone())
                .send()
                .await;
            let elapsed = time.elapsed();

            match resp {
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() >= 400 {
                        debug!(
                            "LOGS | Attempt {} rejected with {} after {} ms",
                            attempt + 1,
                            status,
                            elapsed.as_millis()
                        );
                        errors.push(AttemptError::Status(status));
                        continue;
                    }
                    debug!(
                        "LOGS | Sent {} bytes in {} ms on attempt {}",
                        body.len(),
                        elapsed.as_millis(),
                        attempt + 1
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        "LOGS | Attempt {} failed after {} ms: {}",
                        attempt + 1,
                        elapsed.as_millis(),
                        e
                    );
                    errors.push(AttemptError::Transport(e));
                }
            }
        }

        Err(FlushError::Delivery { attempts, errors })
    }
}

#[async_trait]
impl Flusher for HttpFlusher {
    async fn flush(&self, entries: &[Entry]) -> Result<(), FlushError> {
        if entries.is_empty() {
            return Ok(());
        }
        let body = encode_batch(entries)?;
        self.send(Bytes::from(body)).await
    }
}

/// Builds the shared client with the per-request timeout.
///
/// Falls back to reqwest defaults if the builder fails, so the pipeline keeps
/// running without the timeout rather than not at all.
fn get_client(config: &Config) -> reqwest::Client {
    match reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("LOGS | Failed to build HTTP client: {}, using reqwest defaults", e);
            reqwest::Client::new()
        }
    }
}
