//! Redaction rules for logged request data.
//!
//! Only top-level keys are inspected: header names, and the keys of a JSON or
//! form body object. Nested objects are left untouched, so
//! `{"profile": {"password": "..."}}` is logged as is.

use crate::headers::Headers;
use crate::options::{RequestBody, ResolvedOptions};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Placeholder substituted for sensitive values.
pub const REDACTION_MARKER: &str = "<redacted>";

#[allow(clippy::expect_used)] // literal pattern
static SENSITIVE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)authorization").expect("static regex should not panic")
});

// The sensitive word must be the whole key or its last `_`/`-`/`.` or
// camelCase segment: `access_token`, `userEmail` and `ClientSecret` match,
// `users`, `compass` and `user_agent` do not.
#[allow(clippy::expect_used)] // literal pattern
static SENSITIVE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"(?i:(?:.*[_\-.])?(?:pass(?:word)?|email|token|secret|user(?:_?name)?|client_?id))",
        r"|.*[a-z0-9](?:Pass(?:word)?|Email|Token|Secret|User(?:_?[Nn]ame)?|Client_?Id)",
        r")$",
    ))
    .expect("static regex should not panic")
});

#[must_use]
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADER.is_match(name)
}

#[must_use]
pub fn is_sensitive_field(name: &str) -> bool {
    SENSITIVE_FIELD.is_match(name)
}

/// Copy of `headers` with sensitive values replaced by [`REDACTION_MARKER`].
#[must_use]
pub fn redact_headers(headers: &Headers) -> Headers {
    let mut copy = headers.clone();
    for (name, value) in copy.values_mut() {
        if is_sensitive_header(name) {
            REDACTION_MARKER.clone_into(value);
        }
    }
    copy
}

/// Copy of `value` with sensitive top-level object keys redacted.
///
/// Non-object values are returned unchanged.
#[must_use]
pub fn redact_value(value: &Value) -> Value {
    let mut copy = value.clone();
    if let Value::Object(map) = &mut copy {
        for (key, field) in map.iter_mut() {
            if is_sensitive_field(key) {
                *field = Value::from(REDACTION_MARKER);
            }
        }
    }
    copy
}

#[must_use]
pub fn redact_body(body: &RequestBody) -> RequestBody {
    match body {
        RequestBody::Json(v) => RequestBody::Json(redact_value(v)),
        RequestBody::Form(v) => RequestBody::Form(redact_value(v)),
    }
}

/// Redacted copy of `options`; the original is never modified.
#[must_use]
pub fn redact_options(options: &ResolvedOptions) -> ResolvedOptions {
    ResolvedOptions {
        method: options.method.clone(),
        headers: redact_headers(&options.headers),
        body: options.body.as_ref().map(redact_body),
        timeout: options.timeout,
        decompress: options.decompress,
        retries: options.retries,
        follow_redirects: options.follow_redirects,
        cancel: options.cancel.clone(),
    }
}
