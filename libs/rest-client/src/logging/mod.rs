//! Request logging.
//!
//! A [`RequestLogger`] receives every successful response and every
//! classified failure. Two implementations ship with the crate, both emitting
//! `tracing` events with the same information:
//!
//! - [`StructuredLogger`]: one event per request with key/value fields
//! - [`TextLogger`]: one event per request whose message is a multi-line banner
//!
//! [`NoopLogger`] is used when nothing is configured.
//!
//! Successful `GET`s are logged at `DEBUG`, other verbs at `INFO`. Failures
//! are logged at `ERROR`, except cancellations which use `WARN`. Headers and
//! options are redacted before they reach any output.

mod structured;
mod text;

pub use structured::StructuredLogger;
pub use text::TextLogger;

use crate::error::RequestError;
use crate::options::{ResolvedOptions, duration_ms};
use crate::redact::redact_headers;
use http::{HeaderMap, Method, StatusCode};
use std::backtrace::BacktraceStatus;
use std::error::Error as StdError;
use std::time::Duration;

/// Consumer of request outcomes.
///
/// Implementations must not mutate or retain the options they are given.
pub trait RequestLogger: Send + Sync {
    fn log_success(&self, response: &ResponseSummary, options: &ResolvedOptions);

    fn log_failure(&self, error: &RequestError);
}

/// Logger that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl RequestLogger for NoopLogger {
    fn log_success(&self, _response: &ResponseSummary, _options: &ResolvedOptions) {}

    fn log_failure(&self, _error: &RequestError) {}
}

/// Response metadata handed to [`RequestLogger::log_success`].
#[derive(Debug, Clone)]
pub struct ResponseSummary {
    pub method: Method,
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Redacted, pre-rendered fields of a successful request.
pub(crate) struct SuccessEntry {
    pub severity: Severity,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub content_type: String,
    pub headers: String,
    pub options: String,
}

impl SuccessEntry {
    pub fn new(response: &ResponseSummary, options: &ResolvedOptions) -> Self {
        let severity = if response.method == Method::GET {
            Severity::Debug
        } else {
            Severity::Info
        };
        Self {
            severity,
            method: response.method.to_string(),
            url: response.url.clone(),
            status: response.status.as_u16(),
            duration_ms: duration_ms(response.duration),
            content_type: response
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned(),
            headers: to_json(&redact_headers(&options.headers)),
            options: to_json(options),
        }
    }
}

/// Redacted, pre-rendered fields of a failed request.
pub(crate) struct FailureEntry {
    pub severity: Severity,
    pub method: String,
    pub url: String,
    /// Status code, else transport error code, else `unknown`
    pub status: String,
    pub duration_ms: u64,
    pub headers: String,
    pub options: String,
    pub response_body: Option<String>,
    pub message: String,
    pub stack: String,
}

impl FailureEntry {
    pub fn new(error: &RequestError) -> Self {
        let severity = if error.is_cancelled() {
            Severity::Warn
        } else {
            Severity::Error
        };
        let status = error
            .status_code()
            .map(|s| s.as_u16().to_string())
            .or_else(|| error.error_code().map(str::to_owned))
            .unwrap_or_else(|| "unknown".to_owned());
        Self {
            severity,
            method: error.method().to_string(),
            url: error.url().to_owned(),
            status,
            duration_ms: duration_ms(error.duration()),
            headers: to_json(&redact_headers(&error.options().headers)),
            options: to_json(error.options()),
            response_body: error.response_body().map(to_json),
            message: error.message().to_owned(),
            stack: stack_trace(error),
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Source chain, followed by the captured backtrace when there is one.
fn stack_trace(error: &RequestError) -> String {
    let mut lines = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(err) = current {
        lines.push(format!("caused by: {err}"));
        current = err.source();
    }
    let backtrace = error.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        lines.push(backtrace.to_string());
    }
    lines.join("\n")
}


#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::classify::{FailedCall, Timings, classify};
    use crate::error::TransportError;
    use crate::headers::Headers;

    #[test]
    fn success_severity_depends_on_verb() {
        let summary = |method: Method| ResponseSummary {
            method,
            url: "http://h/x".to_owned(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            duration: Duration::from_millis(3),
        };
        let get = SuccessEntry::new(&summary(Method::GET), &ResolvedOptions::bare(Method::GET));
        let post = SuccessEntry::new(&summary(Method::POST), &ResolvedOptions::bare(Method::POST));
        assert_eq!(get.severity, Severity::Debug);
        assert_eq!(post.severity, Severity::Info);
        assert_eq!(get.duration_ms, 3);
    }

    #[test]
    fn failure_status_falls_back_to_code() {
        let options = ResolvedOptions {
            headers: Headers::from([("Authorization", "Bearer t0k")]),
            ..ResolvedOptions::bare(Method::GET)
        };
        let err = classify(FailedCall {
            options: options.clone(),
            url: "http://h/x".to_owned(),
            error: TransportError::Timeout(Duration::from_secs(1)),
            timings: Timings::start(),
        });
        let entry = FailureEntry::new(&err);
        assert_eq!(entry.status, "timeout");
        assert_eq!(entry.severity, Severity::Error);
        assert!(!entry.headers.contains("t0k"));
        assert!(!entry.options.contains("t0k"));
        assert!(entry.stack.starts_with("caused by: Request attempt timed out"));
        assert_eq!(options.headers.get("Authorization"), Some("Bearer t0k"));

        let cancelled = classify(FailedCall {
            options,
            url: "http://h/x".to_owned(),
            error: TransportError::Cancelled,
            timings: Timings::start(),
        });
        assert_eq!(FailureEntry::new(&cancelled).severity, Severity::Warn);
    }
}
