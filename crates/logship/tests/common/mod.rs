// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common helpers for the pipeline integration tests

use std::time::Duration;

use logship::{Config, RetryStrategy};

pub const TEST_API_KEY: &str = "mock-api-key";

/// Pipeline configuration pointed at a mock intake.
///
/// The flush interval is long so that only the test decides when a batch
/// leaves, either by filling it or by shutting down.
#[allow(dead_code)]
pub fn test_config(url: String) -> Config {
    Config {
        logs_url: url,
        flush_interval: Duration::from_secs(60),
        request_timeout: Duration::from_secs(5),
        retry_strategy: RetryStrategy::LinearBackoff(5, 10),
        ..Config::new(TEST_API_KEY)
    }
}

/// A serialized entry the way the logger would produce it.
#[allow(dead_code)]
pub fn entry(msg: &str) -> Vec<u8> {
    format!("{{\"msg\":\"{msg}\"}}\n").into_bytes()
}
