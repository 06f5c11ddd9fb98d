// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderValue;

use crate::constants;
use crate::error::ConfigError;

/// How a failed delivery is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Number of attempts, no delay between them.
    Immediate(u64),
    /// Number of attempts, and the delay step in milliseconds: attempt `i`
    /// (0-indexed) waits `step * i` before it is sent.
    LinearBackoff(u64, u64),
}

impl RetryStrategy {
    #[must_use]
    pub fn attempts(&self) -> u64 {
        match self {
            Self::Immediate(attempts) | Self::LinearBackoff(attempts, _) => *attempts,
        }
    }

    #[must_use]
    pub fn delay_before(&self, attempt: u64) -> Duration {
        match self {
            Self::Immediate(_) => Duration::ZERO,
            Self::LinearBackoff(_, step_ms) => Duration::from_millis(step_ms.saturating_mul(attempt)),
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::LinearBackoff(
            constants::MAX_DELIVERY_ATTEMPTS,
            constants::RETRY_BACKOFF_STEP_MS,
        )
    }
}

/// Destination and limits of a log pipeline.
///
/// Resolved once at startup. The sink, the batch service and the flusher copy
/// the fields they need when built; the pipeline keeps the full value.
#[derive(Clone)]
pub struct Config {
    pub logs_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub api_key: String,
    pub queue_capacity: usize,
    pub max_log_size_bytes: usize,
    pub max_content_size_bytes: usize,
    pub max_batch_entries_size: usize,
    pub flush_interval: Duration,
    pub request_timeout: Duration,
    pub retry_strategy: RetryStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logs_url: constants::DEFAULT_LOGS_URL.to_string(),
            api_key: String::new(),
            queue_capacity: constants::QUEUE_CAPACITY,
            max_log_size_bytes: constants::MAX_LOG_SIZE_BYTES,
            max_content_size_bytes: constants::MAX_CONTENT_SIZE_BYTES,
            max_batch_entries_size: constants::MAX_BATCH_ENTRIES_SIZE,
            flush_interval: constants::FLUSH_INTERVAL,
            request_timeout: constants::REQUEST_TIMEOUT,
            retry_strategy: RetryStrategy::default(),
        }
    }
}

impl Config {
    /// Builds a configuration with default limits for the given credential.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Config {
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    /// Reads `LOGSHIP_API_KEY` (required) and `LOGSHIP_LOGS_URL`.
    pub fn from_env() -> Result<Config, ConfigError> {
        let api_key = env::var("LOGSHIP_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        // LOGSHIP_LOGS_URL is mostly used to point integration tests at a local intake
        let logs_url = env::var("LOGSHIP_LOGS_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| constants::DEFAULT_LOGS_URL.to_string());

        let config = Config {
            logs_url,
            api_key,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if HeaderValue::from_str(&self.api_key).is_err() {
            return Err(ConfigError::InvalidApiKey);
        }

        let url = reqwest::Url::parse(&self.logs_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.logs_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.logs_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let non_zero = [
            ("queue_capacity", self.queue_capacity),
            ("max_log_size_bytes", self.max_log_size_bytes),
            ("max_content_size_bytes", self.max_content_size_bytes),
            ("max_batch_entries_size", self.max_batch_entries_size),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidLimit(format!("{name} must be non-zero")));
            }
        }
        if self.max_log_size_bytes >= self.max_content_size_bytes {
            return Err(ConfigError::InvalidLimit(format!(
                "max_log_size_bytes ({}) must be smaller than max_content_size_bytes ({})",
                self.max_log_size_bytes, self.max_content_size_bytes
            )));
        }
        if self.retry_strategy.attempts() == 0 {
            return Err(ConfigError::InvalidLimit(
                "retry strategy needs at least one attempt".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidLimit(
                "flush_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("logs_url", &self.logs_url)
            .field("api_key", &"<redacted>")
            .field("queue_capacity", &self.queue_capacity)
            .field("max_log_size_bytes", &self.max_log_size_bytes)
            .field("max_content_size_bytes", &self.max_content_size_bytes)
            .field("max_batch_entries_size", &self.max_batch_entries_size)
            .field("flush_interval", &self.flush_interval)
            .field("request_timeout", &self.request_timeout)
            .field("retry_strategy", &self.retry_strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::env;

    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::new("key");
        assert_eq!(config.logs_url, "https://in.logs.betterstack.com");
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.max_log_size_bytes, 256 * 1024);
        assert_eq!(config.max_content_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_batch_entries_size, 1000);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(config.retry_strategy, RetryStrategy::LinearBackoff(5, 10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_linear_backoff_delays() {
        let strategy = RetryStrategy::default();
        let delays: Vec<u128> = (0..strategy.attempts())
            .map(|i| strategy.delay_before(i).as_millis())
            .collect();
        assert_eq!(delays, vec![0, 10, 20, 30, 40]);

        let immediate = RetryStrategy::Immediate(3);
        assert_eq!(immediate.attempts(), 3);
        assert_eq!(immediate.delay_before(2), Duration::ZERO);
    }

    #[test]
    #[serial]
    fn test_error_if_no_api_key_env_var() {
        env::remove_var("LOGSHIP_API_KEY");
        let config = Config::from_env();
        assert_eq!(config.unwrap_err(), ConfigError::MissingApiKey);
        assert_eq!(
            ConfigError::MissingApiKey.to_string(),
            "LOGSHIP_API_KEY environment variable is not set"
        );
    }

    #[test]
    #[serial]
    fn test_error_if_api_key_blank() {
        env::set_var("LOGSHIP_API_KEY", "   ");
        let config = Config::from_env();
        assert_eq!(config.unwrap_err(), ConfigError::MissingApiKey);
        env::remove_var("LOGSHIP_API_KEY");
    }

    #[test]
    #[serial]
    fn test_default_logs_url() {
        env::set_var("LOGSHIP_API_KEY", "_not_a_real_key_");
        env::remove_var("LOGSHIP_LOGS_URL");
        let config = Config::from_env().unwrap();
        assert_eq!(config.logs_url, "https://in.logs.betterstack.com");
        assert_eq!(config.api_key, "_not_a_real_key_");
        env::remove_var("LOGSHIP_API_KEY");
    }

    #[test]
    #[serial]
    fn test_logs_url_override() {
        env::set_var("LOGSHIP_API_KEY", "_not_a_real_key_");
        env::set_var("LOGSHIP_LOGS_URL", "http://127.0.0.1:3333/logs");
        let config = Config::from_env().unwrap();
        assert_eq!(config.logs_url, "http://127.0.0.1:3333/logs");
        env::remove_var("LOGSHIP_API_KEY");
        env::remove_var("LOGSHIP_LOGS_URL");
    }

    #[test]
    #[serial]
    fn test_invalid_logs_url_from_env() {
        env::set_var("LOGSHIP_API_KEY", "_not_a_real_key_");
        env::set_var("LOGSHIP_LOGS_URL", "not a url");
        let config = Config::from_env();
        assert!(matches!(config, Err(ConfigError::InvalidUrl { .. })));
        env::remove_var("LOGSHIP_API_KEY");
        env::remove_var("LOGSHIP_LOGS_URL");
    }

    #[test]
    fn test_validate_rejects_unsupported_scheme() {
        let config = Config {
            logs_url: "ftp://logs.example.com".to_string(),
            ..Config::new("key")
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported scheme ftp"));
    }

    #[test]
    fn test_validate_rejects_header_unsafe_key() {
        let config = Config::new("bad\nkey");
        assert_eq!(config.validate().unwrap_err(), ConfigError::InvalidApiKey);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = Config {
            queue_capacity: 0,
            ..Config::new("key")
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::InvalidLimit("queue_capacity must be non-zero".to_string())
        );

        let config = Config {
            retry_strategy: RetryStrategy::Immediate(0),
            ..Config::new("key")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_entry_limit_above_content_limit() {
        let config = Config {
            max_log_size_bytes: 1024,
            max_content_size_bytes: 1024,
            ..Config::new("key")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::new("super-secret");
        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("<redacted>"));
        assert!(!debug_str.contains("super-secret"));
    }
}
