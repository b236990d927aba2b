//! Maps a failed transport call to a [`RequestError`].
//!
//! Rules are tried in order, and the first match wins:
//!
//! 1. cancellation: plain error, no status
//! 2. `application/problem+json` body with string `type` and `title`:
//!    [`RequestError::ProblemDetails`]
//! 3. any other JSON-family body that parses: plain error carrying the body
//! 4. everything else: plain error with the status if there was a response,
//!    otherwise a transport error code
//!
//! Classification never fails; a body that does not parse falls through to
//! the next rule.

use crate::error::{FailureDetails, RequestError, TransportError};
use crate::options::ResolvedOptions;
use crate::problem::{ProblemDetails, is_json_content_type, is_problem_json};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Timestamps of one call.
///
/// `end` is set when a response arrived, `error` when the transport failed
/// without one.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub start: Instant,
    pub end: Option<Instant>,
    pub error: Option<Instant>,
}

impl Timings {
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            end: None,
            error: None,
        }
    }

    /// Elapsed time up to completion, or up to the error when there was no
    /// response.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end
            .or(self.error)
            .map_or(Duration::ZERO, |t| t.saturating_duration_since(self.start))
    }
}

/// Everything known about a call that failed.
#[derive(Debug)]
pub struct FailedCall {
    pub options: ResolvedOptions,
    pub url: String,
    pub error: TransportError,
    pub timings: Timings,
}

#[must_use]
pub fn classify(call: FailedCall) -> RequestError {
    let duration = call.timings.duration();
    let FailedCall {
        options,
        url,
        error: inner,
        ..
    } = call;
    let details = FailureDetails::new(options, url, &inner, duration);

    if inner.is_cancelled() {
        return RequestError::Request {
            details: Box::new(details),
            inner,
        };
    }

    let Some((body, problem_json)) = json_error_body(&inner) else {
        return RequestError::Request {
            details: Box::new(details),
            inner,
        };
    };

    let problem = if problem_json {
        ProblemDetails::from_value(&body)
    } else {
        None
    };
    let details = Box::new(details.with_response_body(body));
    match problem {
        Some(problem) => RequestError::ProblemDetails {
            details,
            problem: Box::new(problem),
            inner,
        },
        None => RequestError::Request { details, inner },
    }
}

/// Parsed error body and whether it was declared as problem+json.
fn json_error_body(err: &TransportError) -> Option<(Value, bool)> {
    let TransportError::HttpStatus {
        body_preview,
        content_type: Some(content_type),
        ..
    } = err
    else {
        return None;
    };
    if !is_json_content_type(content_type) {
        return None;
    }
    let body = serde_json::from_str::<Value>(body_preview).ok()?;
    Some((body, is_problem_json(content_type)))
}
