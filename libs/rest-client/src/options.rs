//! Request option composition.
//!
//! [`compose`] turns a verb, an optional payload and the caller's
//! [`RequestOptions`] into the [`ResolvedOptions`] handed to the transport.
//! It is a pure function: nothing here touches the network or shared state.

use crate::headers::Headers;
use crate::redact;
use http::Method;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Request body placement. JSON and form encoding are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as `application/json`
    Json(Value),
    /// Serialized as `application/x-www-form-urlencoded`
    Form(Value),
}

impl RequestBody {
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match self {
            RequestBody::Json(v) => Some(v),
            RequestBody::Form(_) => None,
        }
    }

    #[must_use]
    pub fn form(&self) -> Option<&Value> {
        match self {
            RequestBody::Form(v) => Some(v),
            RequestBody::Json(_) => None,
        }
    }
}

/// Per-call overrides.
///
/// Unset fields fall back to the client's transport configuration.
///
/// # Example
///
/// ```ignore
/// let token = CancellationToken::new();
/// let options = RequestOptions::new()
///     .timeout(Duration::from_secs(5))
///     .header("x-request-id", "abc123")
///     .cancel_on(token.clone());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub decompress: Option<bool>,
    pub retries: Option<usize>,
    pub headers: Headers,
    /// Send the payload form-encoded instead of as JSON
    pub is_form: bool,
    pub follow_redirects: Option<bool>,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn decompress(mut self, decompress: bool) -> Self {
        self.decompress = Some(decompress);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the per-call header set.
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn form(mut self) -> Self {
        self.is_form = true;
        self
    }

    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Abort the call when `token` is cancelled.
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Transport-ready options for a single call.
///
/// `Debug` and `Serialize` output is redacted, so a `ResolvedOptions` can be
/// logged or attached to an error without leaking credentials.
#[derive(Clone)]
pub struct ResolvedOptions {
    pub method: Method,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub timeout: Option<Duration>,
    pub decompress: Option<bool>,
    pub retries: Option<usize>,
    pub follow_redirects: Option<bool>,
    pub cancel: Option<CancellationToken>,
}

impl ResolvedOptions {
    /// Options for a body-less request with no overrides.
    #[must_use]
    pub fn bare(method: Method) -> Self {
        Self {
            method,
            headers: Headers::new(),
            body: None,
            timeout: None,
            decompress: None,
            retries: None,
            follow_redirects: None,
            cancel: None,
        }
    }

    /// Same fields serialized without redaction.
    ///
    /// Only meant for assertions on composed requests; log output goes
    /// through the redacting `Serialize` impl instead.
    #[must_use]
    pub fn to_unredacted_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("method".to_owned(), Value::from(self.method.as_str()));
        map.insert(
            "headers".to_owned(),
            self.headers
                .iter()
                .map(|(n, v)| (n.to_owned(), Value::from(v)))
                .collect::<serde_json::Map<_, _>>()
                .into(),
        );
        match &self.body {
            Some(RequestBody::Json(v)) => {
                map.insert("json".to_owned(), v.clone());
            }
            Some(RequestBody::Form(v)) => {
                map.insert("form".to_owned(), v.clone());
            }
            None => {}
        }
        if let Some(timeout) = self.timeout {
            map.insert("timeout_ms".to_owned(), Value::from(duration_ms(timeout)));
        }
        if let Some(decompress) = self.decompress {
            map.insert("decompress".to_owned(), Value::from(decompress));
        }
        if let Some(retries) = self.retries {
            map.insert("retries".to_owned(), Value::from(retries));
        }
        if let Some(follow) = self.follow_redirects {
            map.insert("follow_redirects".to_owned(), Value::from(follow));
        }
        Value::Object(map)
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Serialize for ResolvedOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let redacted = redact::redact_options(self);
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("method", redacted.method.as_str())?;
        map.serialize_entry("headers", &redacted.headers)?;
        match &redacted.body {
            Some(RequestBody::Json(v)) => map.serialize_entry("json", v)?,
            Some(RequestBody::Form(v)) => map.serialize_entry("form", v)?,
            None => {}
        }
        if let Some(timeout) = redacted.timeout {
            map.serialize_entry("timeout_ms", &duration_ms(timeout))?;
        }
        if let Some(decompress) = redacted.decompress {
            map.serialize_entry("decompress", &decompress)?;
        }
        if let Some(retries) = redacted.retries {
            map.serialize_entry("retries", &retries)?;
        }
        if let Some(follow) = redacted.follow_redirects {
            map.serialize_entry("follow_redirects", &follow)?;
        }
        map.end()
    }
}

impl fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = redact::redact_options(self);
        f.debug_struct("ResolvedOptions")
            .field("method", &redacted.method)
            .field("headers", &redacted.headers)
            .field("body", &redacted.body)
            .field("timeout", &redacted.timeout)
            .field("decompress", &redacted.decompress)
            .field("retries", &redacted.retries)
            .field("follow_redirects", &redacted.follow_redirects)
            .field("cancellable", &redacted.cancel.is_some())
            .finish()
    }
}

/// Compose the final options for one request.
///
/// Body placement: form when `options.is_form` is set, JSON otherwise; a
/// missing or `null` payload yields no body at all.
///
/// Header precedence, low to high: `defaults` (computed at client
/// construction), the per-call `options.headers`, then `generated` (the
/// header generator's output for this call).
#[must_use]
pub fn compose(
    method: Method,
    payload: Option<Value>,
    options: &RequestOptions,
    defaults: &Headers,
    generated: Option<&Headers>,
) -> ResolvedOptions {
    let body = payload
        .filter(|p| !p.is_null())
        .map(|p| {
            if options.is_form {
                RequestBody::Form(p)
            } else {
                RequestBody::Json(p)
            }
        });

    let mut headers = defaults.clone().merged(&options.headers);
    if let Some(generated) = generated {
        headers.merge(generated);
    }

    ResolvedOptions {
        method,
        headers,
        body,
        timeout: options.timeout,
        decompress: options.decompress,
        retries: options.retries,
        follow_redirects: options.follow_redirects,
        cancel: options.cancel.clone(),
    }
}
