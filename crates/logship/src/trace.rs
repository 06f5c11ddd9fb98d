// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace context propagated across service boundaries.
//!
//! A trace id is created once, at the edge, and travels with every request
//! derived from it. A request id is created per hop: the client side makes a
//! new one for each outgoing request ([`TraceContext::for_outgoing_request`]),
//! the server side reads it back ([`TraceContext::from_headers_or_new`]).
//!
//! Inside a service the context is ambient to the task: run the handler with
//! [`TraceContext::scope`] and the logger picks it up through
//! [`TraceContext::current`].
//!
//! Headers:
//!
//! | Header             | Value                                   |
//! |--------------------|-----------------------------------------|
//! | `X-Trace-ID`       | trace id                                |
//! | `X-Request-ID`     | request id                              |
//! | `X-Trace-Start`    | trace start, RFC 3339 UTC, seconds      |
//! | `X-Trace-Source`   | service that started the trace          |
//! | `X-Request-Source` | service that sent the request           |
//!
//! There is no request start header; a request starts when it is received.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;
use uuid::Uuid;

// lowercase, as `HeaderName::from_static` requires
pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_START_HEADER: &str = "x-trace-start";
pub const TRACE_SOURCE_HEADER: &str = "x-trace-source";
pub const REQUEST_SOURCE_HEADER: &str = "x-request-source";

tokio::task_local! {
    static CURRENT: TraceContext;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub request_id: String,
    pub trace_source: String,
    pub request_source: String,
    pub trace_start: DateTime<Utc>,
    pub request_start: DateTime<Utc>,
}

impl TraceContext {
    /// Starts a new trace originating in `service`.
    #[must_use]
    pub fn new(service: &str) -> Self {
        let now = Utc::now();
        TraceContext {
            trace_id: new_id(),
            request_id: new_id(),
            trace_source: service.to_string(),
            request_source: service.to_string(),
            trace_start: now,
            request_start: now,
        }
    }

    /// Same trace, new request id, for a request this service is about to send.
    #[must_use]
    pub fn for_outgoing_request(&self) -> Self {
        TraceContext {
            request_id: new_id(),
            ..self.clone()
        }
    }

    /// Writes the context into `headers`, replacing any previous values.
    pub fn save_to_headers(&self, headers: &mut HeaderMap) {
        let values = [
            (TRACE_ID_HEADER, self.trace_id.clone()),
            (REQUEST_ID_HEADER, self.request_id.clone()),
            (
                TRACE_START_HEADER,
                self.trace_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (TRACE_SOURCE_HEADER, self.trace_source.clone()),
            (REQUEST_SOURCE_HEADER, self.request_source.clone()),
        ];
        for (name, value) in values {
            // service names are free-form; skip one that is not a legal header value
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }

    /// Reads the context of an incoming request.
    ///
    /// Missing ids are generated, so the result is always usable. An absent or
    /// unparsable trace start is taken as now, and so is one in the future.
    /// Missing sources default to `service`.
    #[must_use]
    pub fn from_headers_or_new(headers: &HeaderMap, service: &str) -> Self {
        let now = Utc::now();

        let mut trace_start = header_str(headers, TRACE_START_HEADER)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map_or(now, |start| start.with_timezone(&Utc));
        if trace_start > now {
            warn!(
                trace_start = %trace_start.to_rfc3339(),
                now = %now.to_rfc3339(),
                "trace start is in the future"
            );
            trace_start = now;
        }

        let or_service =
            |name: &str| header_str(headers, name).map_or_else(|| service.to_string(), String::from);

        TraceContext {
            trace_id: header_str(headers, TRACE_ID_HEADER).map_or_else(new_id, String::from),
            request_id: header_str(headers, REQUEST_ID_HEADER).map_or_else(new_id, String::from),
            trace_source: or_service(TRACE_SOURCE_HEADER),
            request_source: or_service(REQUEST_SOURCE_HEADER),
            trace_start,
            request_start: now,
        }
    }

    /// Attaches the context of the current task to an outgoing request.
    ///
    /// Outside of [`TraceContext::scope`] a new trace is started.
    #[must_use]
    pub fn inject(builder: reqwest::RequestBuilder, service: &str) -> reqwest::RequestBuilder {
        let context = match TraceContext::current() {
            Some(current) => current.for_outgoing_request(),
            None => TraceContext::new(service),
        };
        let mut headers = HeaderMap::new();
        context.save_to_headers(&mut headers);
        builder.headers(headers)
    }

    /// Runs `fut` with this context as the task's current trace.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// The context of the enclosing [`TraceContext::scope`], if any.
    #[must_use]
    pub fn current() -> Option<TraceContext> {
        CURRENT.try_with(Clone::clone).ok()
    }

    #[must_use]
    pub fn trace_elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.trace_start).num_milliseconds()
    }

    #[must_use]
    pub fn request_elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.request_start).num_milliseconds()
    }
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_trace() {
        let context = TraceContext::new("billing");
        assert_ne!(context.trace_id, context.request_id);
        assert_eq!(context.trace_source, "billing");
        assert_eq!(context.request_source, "billing");
        assert_eq!(context.trace_start, context.request_start);
        assert_eq!(Uuid::parse_str(&context.trace_id).unwrap().get_version_num(), 7);
    }

    #[test]
    fn test_outgoing_request_keeps_trace() {
        let context = TraceContext::new("billing");
        let outgoing = context.for_outgoing_request();
        assert_eq!(outgoing.trace_id, context.trace_id);
        assert_eq!(outgoing.trace_start, context.trace_start);
        assert_ne!(outgoing.request_id, context.request_id);
    }

    #[test]
    fn test_headers_round_trip_across_services() {
        let client = TraceContext::new("gateway");
        let mut headers = HeaderMap::new();
        client.save_to_headers(&mut headers);

        assert_eq!(headers.get("x-trace-id").unwrap(), client.trace_id.as_str());
        assert_eq!(headers.get("X-Request-Source").unwrap(), "gateway");

        let server = TraceContext::from_headers_or_new(&headers, "billing");
        assert_eq!(server.trace_id, client.trace_id);
        assert_eq!(server.request_id, client.request_id);
        assert_eq!(server.trace_source, "gateway");
        assert_eq!(server.request_source, "gateway");
        // the header only carries seconds
        assert_eq!(server.trace_start.timestamp(), client.trace_start.timestamp());
        assert!(server.request_start >= client.request_start);
    }

    #[test]
    fn test_missing_headers_start_new_trace() {
        let context = TraceContext::from_headers_or_new(&HeaderMap::new(), "billing");
        assert!(!context.trace_id.is_empty());
        assert!(!context.request_id.is_empty());
        assert_eq!(context.trace_source, "billing");
        assert_eq!(context.trace_start, context.request_start);
    }

    #[test]
    fn test_unparsable_start_is_now() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-start", HeaderValue::from_static("yesterday"));
        let context = TraceContext::from_headers_or_new(&headers, "billing");
        assert_eq!(context.trace_start, context.request_start);
    }

    #[test]
    fn test_future_start_is_clamped() {
        let future = Utc::now() + Duration::hours(1);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-trace-start",
            HeaderValue::from_str(&future.to_rfc3339()).unwrap(),
        );
        let context = TraceContext::from_headers_or_new(&headers, "billing");
        assert_eq!(context.trace_start, context.request_start);
    }

    #[test]
    fn test_elapsed() {
        let mut context = TraceContext::new("billing");
        context.trace_start -= Duration::milliseconds(1500);
        let now = context.request_start + Duration::milliseconds(250);
        assert_eq!(context.trace_elapsed_ms(now), 1750);
        assert_eq!(context.request_elapsed_ms(now), 250);
    }

    #[tokio::test]
    async fn test_scope_sets_current() {
        assert!(TraceContext::current().is_none());

        let context = TraceContext::new("billing");
        let expected = context.clone();
        let seen = context.scope(async { TraceContext::current() }).await;

        assert_eq!(seen, Some(expected));
        assert!(TraceContext::current().is_none());
    }

    #[tokio::test]
    async fn test_inject_uses_current_trace() {
        let client = reqwest::Client::new();
        let context = TraceContext::new("gateway");
        let trace_id = context.trace_id.clone();
        let request_id = context.request_id.clone();

        let request = context
            .scope(async {
                TraceContext::inject(client.get("http://127.0.0.1:1/"), "gateway")
                    .build()
                    .unwrap()
            })
            .await;

        let headers = request.headers();
        assert_eq!(headers.get("x-trace-id").unwrap(), trace_id.as_str());
        assert_ne!(headers.get("x-request-id").unwrap(), request_id.as_str());
    }
}
