// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON log records for `tracing` events.
//!
//! [`JsonFormatter`] renders each event as one JSON object per line:
//!
//! ```text
//! {"time":"2025-01-07T10:00:00.123Z","level":"INFO","msg":"request served",
//!  "target":"billing::http","source":"src/http.rs:42","status":200,
//!  "meta":{"env":"prod","service":"billing",...},
//!  "trace":{"trace_id":"...","request_id":"...","trace_elapsed_ms":18,"request_elapsed_ms":3}}
//! ```
//!
//! `meta` is the process [`Metadata`]; `trace` is only present when the event
//! is emitted inside [`TraceContext::scope`].
//!
//! [`init`] installs the formatter on stderr and, given a [`LogSink`], on the
//! log pipeline as well. Events from this crate and from the HTTP stack never
//! reach the pipeline, so delivery diagnostics cannot feed back into it.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::{self, EnvFilter};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext,
};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::logs::sink::LogSink;
use crate::metadata::Metadata;
use crate::trace::TraceContext;

/// Keys the formatter owns; event fields with these names are dropped.
const RESERVED_KEYS: [&str; 7] = ["time", "level", "msg", "target", "source", "meta", "trace"];

/// Targets that must not be shipped through the pipeline: its own delivery
/// logs and the HTTP stack underneath.
const INTERNAL_TARGETS: [&str; 6] = [
    "logship::logs",
    "logship::pipeline",
    "hyper",
    "reqwest",
    "h2",
    "rustls",
];

#[derive(Debug, Clone)]
pub struct JsonFormatter {
    /// Serialized once, cloned into every record.
    meta: Value,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        JsonFormatter::with_metadata(Metadata::get())
    }
}

impl JsonFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_metadata(metadata: &Metadata) -> Self {
        JsonFormatter {
            meta: serde_json::to_value(metadata).unwrap_or(Value::Null),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = Utc::now();
        let metadata = event.metadata();

        let mut fields = Map::new();
        event.record(&mut JsonVisitor(&mut fields));
        let msg = match fields.remove("message") {
            Some(Value::String(msg)) => msg,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let mut record = Map::new();
        record.insert(
            "time".to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert("level".to_string(), Value::String(metadata.level().to_string()));
        record.insert("msg".to_string(), Value::String(msg));
        record.insert("target".to_string(), Value::String(metadata.target().to_string()));
        if let (Some(file), Some(line)) = (metadata.file(), metadata.line()) {
            record.insert("source".to_string(), Value::String(format!("{file}:{line}")));
        }
        for (key, value) in fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                record.insert(key, value);
            }
        }
        record.insert("meta".to_string(), self.meta.clone());
        if let Some(trace) = TraceContext::current() {
            record.insert("trace".to_string(), trace_value(&trace, now));
        }

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

fn trace_value(trace: &TraceContext, now: chrono::DateTime<Utc>) -> Value {
    serde_json::json!({
        "trace_id": trace.trace_id,
        "request_id": trace.request_id,
        "trace_elapsed_ms": trace.trace_elapsed_ms(now),
        "request_elapsed_ms": trace.request_elapsed_ms(now),
    })
}

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }
}

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|internal| {
        target
            .strip_prefix(internal)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Layer writing JSON records into the pipeline, minus internal targets.
pub fn pipeline_layer<S>(sink: LogSink) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(JsonFormatter::new())
        .with_writer(sink)
        // a rejected write (full queue, oversized record) is counted by the sink
        .log_internal_errors(false)
        .with_filter(filter::filter_fn(|metadata| !is_internal(metadata.target())))
}

/// Builds the level filter, e.g. from `LOGSHIP_LOG_LEVEL`.
///
/// The HTTP stack is silenced whatever the level; an unparsable level falls
/// back to `info`.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{level}"))
        .unwrap_or_else(|_| EnvFilter::new("h2=off,hyper=off,rustls=off,info"))
}

/// Installs the global subscriber: JSON to stderr, and to `sink` when given.
pub fn init(level: &str, sink: Option<LogSink>) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(JsonFormatter::new())
                .with_writer(std::io::stderr),
        )
        .with(sink.map(pipeline_layer))
        .try_init()
}
