use super::{FailureEntry, RequestLogger, ResponseSummary, Severity, SuccessEntry};
use crate::error::RequestError;
use crate::options::ResolvedOptions;

/// Emits one `tracing` event per request whose message is a readable
/// multi-line banner.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLogger;

impl TextLogger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn success_banner(entry: &SuccessEntry) -> String {
    let mut lines = vec![format!(
        "{} {} -> {} ({} ms)",
        entry.method, entry.url, entry.status, entry.duration_ms
    )];
    if !entry.content_type.is_empty() {
        lines.push(format!("  content-type: {}", entry.content_type));
    }
    lines.push(format!("  headers: {}", entry.headers));
    lines.push(format!("  options: {}", entry.options));
    lines.join("\n")
}

fn failure_banner(entry: &FailureEntry) -> String {
    let mut lines = vec![
        format!(
            "{} {} -> {} ({} ms)",
            entry.method, entry.url, entry.status, entry.duration_ms
        ),
        format!("  error: {}", entry.message),
        format!("  headers: {}", entry.headers),
        format!("  options: {}", entry.options),
    ];
    if let Some(body) = &entry.response_body {
        lines.push(format!("  response: {body}"));
    }
    if !entry.stack.is_empty() {
        lines.push(format!("  stack:\n    {}", entry.stack.replace('\n', "\n    ")));
    }
    lines.join("\n")
}

fn emit(severity: Severity, banner: &str) {
    match severity {
        Severity::Debug => tracing::debug!("{banner}"),
        Severity::Info => tracing::info!("{banner}"),
        Severity::Warn => tracing::warn!("{banner}"),
        Severity::Error => tracing::error!("{banner}"),
    }
}

impl RequestLogger for TextLogger {
    fn log_success(&self, response: &ResponseSummary, options: &ResolvedOptions) {
        let entry = SuccessEntry::new(response, options);
        emit(entry.severity, &success_banner(&entry));
    }

    fn log_failure(&self, error: &RequestError) {
        let entry = FailureEntry::new(error);
        emit(entry.severity, &failure_banner(&entry));
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::classify::{FailedCall, Timings, classify};
    use crate::error::TransportError;
    use crate::headers::Headers;
    use crate::logging::test_support::capture;
    use crate::options::RequestBody;
    use http::{HeaderMap, Method, StatusCode};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn success_banner_is_redacted() {
        let options = ResolvedOptions {
            headers: Headers::from([("authorization", "Basic Zm9vOmJhcg==")]),
            body: Some(RequestBody::Form(json!({"client_secret": "s", "scope": "read"}))),
            ..ResolvedOptions::bare(Method::PUT)
        };
        let response = ResponseSummary {
            method: Method::PUT,
            url: "http://h/token".to_owned(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            duration: Duration::from_millis(5),
        };

        let events = capture(|| TextLogger::new().log_success(&response, &options));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, tracing::Level::INFO);
        let message = &events[0].fields["message"];
        assert!(message.starts_with("PUT http://h/token -> 200 (5 ms)\n"));
        assert!(message.contains("scope"));
        assert!(!message.contains("Zm9vOmJhcg=="));
        assert!(message.contains(r#""client_secret":"<redacted>""#));
    }

    #[test]
    fn failure_banner_lists_status_and_error() {
        let err = classify(FailedCall {
            options: ResolvedOptions::bare(Method::GET),
            url: "http://h/slow".to_owned(),
            error: TransportError::Cancelled,
            timings: Timings::start(),
        });

        let events = capture(|| TextLogger::new().log_failure(&err));

        assert_eq!(events[0].level, tracing::Level::WARN);
        let message = &events[0].fields["message"];
        assert!(message.starts_with("GET http://h/slow -> cancelled"));
        assert!(message.contains("error: GET http://h/slow failed: Request cancelled"));
        assert!(message.contains("stack:\n    caused by: Request cancelled"));
    }
}
