use crate::options::ResolvedOptions;
use crate::problem::ProblemDetails;
use http::{Method, StatusCode};
use serde_json::Value;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by the transport stack, before any classification.
///
/// This is what [`RestClient::raw`](crate::RestClient::raw) returns unmodified,
/// and what [`RequestError::inner`] wraps.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (failed to parse, unsupported scheme, or no host)
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired while the request was in flight
    #[error("Request cancelled")]
    Cancelled,

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
}

impl From<hyper::Error> for TransportError {
    fn from(err: hyper::Error) -> Self {
        TransportError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for TransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        TransportError::Transport(Box::new(err))
    }
}

impl TransportError {
    /// HTTP status of a non-2xx response.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// Transport-level error code, used when no HTTP status is available.
    ///
    /// An I/O error anywhere in the source chain wins (`connection refused`,
    /// `timed out`, ...); otherwise a fixed code per variant.
    #[must_use]
    pub fn code(&self) -> String {
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            if let Some(io) = err.downcast_ref::<std::io::Error>() {
                return io.kind().to_string();
            }
            current = err.source();
        }

        match self {
            TransportError::RequestBuild(_) => "request_build",
            TransportError::InvalidHeaderName(_) | TransportError::InvalidHeaderValue(_) => {
                "invalid_header"
            }
            TransportError::InvalidUri { .. } => "invalid_url",
            TransportError::Timeout(_) => "timeout",
            TransportError::Cancelled => "cancelled",
            TransportError::Transport(_) => "transport",
            TransportError::BodyTooLarge { .. } => "body_too_large",
            TransportError::HttpStatus { .. } => "http_status",
            TransportError::Json(_) => "json",
            TransportError::FormEncode(_) => "form_encode",
        }
        .to_owned()
    }
}

/// Context captured when a call fails.
pub struct FailureDetails {
    message: String,
    method: Method,
    url: String,
    status: Option<StatusCode>,
    error_code: Option<String>,
    duration: Duration,
    options: ResolvedOptions,
    response_body: Option<Value>,
    stack: Backtrace,
}

impl FailureDetails {
    pub(crate) fn new(
        options: ResolvedOptions,
        url: String,
        inner: &TransportError,
        duration: Duration,
    ) -> Self {
        let method = options.method.clone();
        let status = inner.status();
        Self {
            message: format!("{method} {url} failed: {inner}"),
            error_code: status.is_none().then(|| inner.code()),
            method,
            url,
            status,
            duration,
            options,
            response_body: None,
            stack: Backtrace::capture(),
        }
    }

    pub(crate) fn with_response_body(mut self, body: Value) -> Self {
        self.response_body = Some(body);
        self
    }
}

impl fmt::Debug for FailureDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureDetails")
            .field("message", &self.message)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("status", &self.status)
            .field("error_code", &self.error_code)
            .field("duration", &self.duration)
            .field("options", &self.options)
            .field("response_body", &self.response_body)
            .finish_non_exhaustive()
    }
}

/// The only error type returned by [`RestClient`](crate::RestClient) calls.
///
/// [`ProblemDetails`](RequestError::ProblemDetails) is produced only when the
/// server answered with `application/problem+json` and the body carries both
/// `type` and `title`; every other failure is a plain
/// [`Request`](RequestError::Request) error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    #[error("{}", .details.message)]
    Request {
        details: Box<FailureDetails>,
        #[source]
        inner: TransportError,
    },

    #[error("{}", .details.message)]
    ProblemDetails {
        details: Box<FailureDetails>,
        problem: Box<ProblemDetails>,
        #[source]
        inner: TransportError,
    },
}

impl RequestError {
    /// Failure raised before anything was sent, e.g. a body that cannot be
    /// serialized. Not passed to the request logger.
    pub(crate) fn local(method: Method, url: String, inner: TransportError) -> Self {
        let details = FailureDetails::new(ResolvedOptions::bare(method), url, &inner, Duration::ZERO);
        RequestError::Request {
            details: Box::new(details),
            inner,
        }
    }

    fn details(&self) -> &FailureDetails {
        match self {
            RequestError::Request { details, .. } | RequestError::ProblemDetails { details, .. } => {
                details
            }
        }
    }

    /// Message prefixed with the verb and target URL.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.details().message
    }

    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.details().status
    }

    /// Transport-level code, set only when there is no status code.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.details().error_code.as_deref()
    }

    /// The wrapped transport error.
    #[must_use]
    pub fn inner(&self) -> &TransportError {
        match self {
            RequestError::Request { inner, .. } | RequestError::ProblemDetails { inner, .. } => {
                inner
            }
        }
    }

    /// Parsed JSON error body, when the server sent one.
    #[must_use]
    pub fn response_body(&self) -> Option<&Value> {
        self.details().response_body.as_ref()
    }

    #[must_use]
    pub fn problem(&self) -> Option<&ProblemDetails> {
        match self {
            RequestError::ProblemDetails { problem, .. } => Some(problem),
            RequestError::Request { .. } => None,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.details().duration
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.details().method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.details().url
    }

    /// Options the failed request was sent with. Redacted on output.
    #[must_use]
    pub fn options(&self) -> &ResolvedOptions {
        &self.details().options
    }

    /// Stack captured at classification time. Empty unless
    /// `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE` enables capture.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.details().stack
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner().is_cancelled()
    }
}

/// Invalid client configuration, reported by the builder.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid default header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("TLS initialization failed: {0}")]
    Tls(#[source] Box<dyn StdError + Send + Sync>),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::headers::Headers;

    #[test]
    fn transport_error_preserves_io_source_and_code() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::Transport(Box::new(io));

        let source = err.source().unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
        assert_eq!(err.code(), std::io::ErrorKind::ConnectionRefused.to_string());
    }

    #[test]
    fn variant_codes_without_io_source() {
        assert_eq!(TransportError::Cancelled.code(), "cancelled");
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(1)).code(),
            "timeout"
        );
    }

    #[test]
    fn message_is_prefixed_with_verb_and_url() {
        let err = RequestError::local(
            Method::POST,
            "http://localhost/items".to_owned(),
            TransportError::Timeout(Duration::from_secs(2)),
        );
        assert!(err.message().starts_with("POST http://localhost/items failed"));
        assert_eq!(err.to_string(), err.message());
        assert_eq!(err.error_code(), Some("timeout"));
        assert!(err.status_code().is_none());
        assert!(err.problem().is_none());
    }

    #[test]
    fn status_suppresses_error_code() {
        let inner = TransportError::HttpStatus {
            status: StatusCode::NOT_FOUND,
            body_preview: String::new(),
            content_type: None,
        };
        let err = RequestError::local(Method::GET, "http://h/x".to_owned(), inner);
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
        assert!(err.error_code().is_none());
    }

    #[test]
    fn debug_does_not_leak_credentials() {
        let options = ResolvedOptions {
            headers: Headers::from([("Authorization", "Bearer s3cr3t")]),
            ..ResolvedOptions::bare(Method::GET)
        };
        let details = FailureDetails::new(
            options,
            "http://h/x".to_owned(),
            &TransportError::Cancelled,
            Duration::ZERO,
        );
        let err = RequestError::Request {
            details: Box::new(details),
            inner: TransportError::Cancelled,
        };
        assert!(!format!("{err:?}").contains("s3cr3t"));
        assert!(err.is_cancelled());
    }
}
