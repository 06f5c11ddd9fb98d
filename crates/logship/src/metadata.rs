// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Build and runtime metadata attached to every log record under `meta`.
//!
//! Collected once per process and immutable afterwards. Build values come
//! from environment variables set at compile time:
//!
//! - `LOGSHIP_BUILD_COMMIT`: VCS commit the binary was built from
//! - `LOGSHIP_BUILD_CHECKSUM`: checksum of the built artifact
//! - `LOGSHIP_BUILD_VERSION`: release version, defaults to the crate version
//! - `LOGSHIP_RUSTC_VERSION`: compiler version, e.g. the output of `rustc -V`
//!
//! Runtime values are read from `ENV` and `LOGSHIP_SERVICE_NAME`.

use std::env;
use std::sync::OnceLock;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

const UNKNOWN: &str = "unknown";

static METADATA: OnceLock<Metadata> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Empty unless the build provides one.
    pub checksum: String,
    pub commit: String,
    /// Deployment environment, `dev` unless `ENV` is set.
    pub env: String,
    /// Unique per process start (UUIDv7, so instance ids sort by start time).
    pub instance_id: String,
    pub language_version: String,
    pub repo_path: String,
    /// RFC 3339 UTC timestamp of the first metadata lookup.
    pub service_start: String,
    #[serde(rename = "service")]
    pub service_name: String,
    pub service_version: String,
}

impl Metadata {
    /// Process-wide metadata, collected from the real environment on first use.
    pub fn get() -> &'static Metadata {
        METADATA.get_or_init(|| Metadata::from_lookup(|key| env::var(key).ok()))
    }

    /// Collects metadata using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Metadata
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Metadata {
            checksum: build_value(option_env!("LOGSHIP_BUILD_CHECKSUM"), ""),
            commit: build_value(option_env!("LOGSHIP_BUILD_COMMIT"), ""),
            env: var_or("ENV", "dev"),
            instance_id: Uuid::now_v7().to_string(),
            language_version: build_value(option_env!("LOGSHIP_RUSTC_VERSION"), UNKNOWN),
            repo_path: build_value(option_env!("CARGO_PKG_REPOSITORY"), UNKNOWN),
            service_start: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            service_name: var_or("LOGSHIP_SERVICE_NAME", UNKNOWN),
            service_version: build_value(
                option_env!("LOGSHIP_BUILD_VERSION"),
                env!("CARGO_PKG_VERSION"),
            ),
        }
    }
}

fn build_value(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}
