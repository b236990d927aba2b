use super::{FailureEntry, RequestLogger, ResponseSummary, Severity, SuccessEntry};
use crate::error::RequestError;
use crate::options::ResolvedOptions;

/// Emits one `tracing` event per request with every detail as a field.
///
/// Meant for JSON log pipelines: pair it with a `tracing-subscriber` JSON
/// formatter and each field lands as its own key.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredLogger;

impl StructuredLogger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

macro_rules! emit {
    ($severity:expr, $($rest:tt)+) => {
        match $severity {
            Severity::Debug => tracing::debug!($($rest)+),
            Severity::Info => tracing::info!($($rest)+),
            Severity::Warn => tracing::warn!($($rest)+),
            Severity::Error => tracing::error!($($rest)+),
        }
    };
}

impl RequestLogger for StructuredLogger {
    fn log_success(&self, response: &ResponseSummary, options: &ResolvedOptions) {
        let entry = SuccessEntry::new(response, options);
        emit!(
            entry.severity,
            method = %entry.method,
            url = %entry.url,
            status = entry.status,
            duration_ms = entry.duration_ms,
            content_type = %entry.content_type,
            headers = %entry.headers,
            options = %entry.options,
            "request succeeded"
        );
    }

    fn log_failure(&self, error: &RequestError) {
        let entry = FailureEntry::new(error);
        let response_body = entry.response_body.as_deref().unwrap_or_default();
        emit!(
            entry.severity,
            method = %entry.method,
            url = %entry.url,
            status = %entry.status,
            duration_ms = entry.duration_ms,
            headers = %entry.headers,
            options = %entry.options,
            response_body = %response_body,
            error = %entry.message,
            stack = %entry.stack,
            "request failed"
        );
    }
}
