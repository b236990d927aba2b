//! RFC 9457 Problem Details as seen from the client side.
//!
//! Servers are free to add members, so everything beyond `type`, `title`,
//! `detail` and `instance` (including `status`) is kept as an extension.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content type for Problem Details as per RFC 9457.
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

/// A parsed problem-details error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Every other member of the body.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    /// Extract problem details from a parsed body.
    ///
    /// Returns `None` unless the body is an object with string `type` and
    /// `title` members. A non-string `detail` or `instance` is kept as an
    /// extension instead of rejecting the whole body.
    #[must_use]
    pub fn from_value(body: &Value) -> Option<Self> {
        let mut members = body.as_object()?.clone();

        let type_url = take_string(&mut members, "type")?;
        let title = take_string(&mut members, "title")?;
        let detail = take_string(&mut members, "detail");
        let instance = take_string(&mut members, "instance");

        Some(Self {
            type_url,
            title,
            detail,
            instance,
            extensions: members,
        })
    }

    /// The `status` extension, when the server included a valid one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.extensions
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
    }
}

fn take_string(members: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !members.get(key).is_some_and(Value::is_string) {
        return None;
    }
    members.remove(key).and_then(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// True for `application/problem+json`, ignoring parameters and casing.
#[must_use]
pub fn is_problem_json(content_type: &str) -> bool {
    essence(content_type) == APPLICATION_PROBLEM_JSON
}

/// True for `application/json` and any `+json` structured-syntax type.
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence == "application/json" || essence.ends_with("+json")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_required_and_optional_members() {
        let body = json!({
            "type": "about:blank",
            "title": "Bad Request",
            "detail": "x is required",
            "status": 400,
            "trace_id": "abc"
        });
        let problem = ProblemDetails::from_value(&body).unwrap();

        assert_eq!(problem.type_url, "about:blank");
        assert_eq!(problem.title, "Bad Request");
        assert_eq!(problem.detail.as_deref(), Some("x is required"));
        assert!(problem.instance.is_none());
        assert_eq!(problem.status(), Some(400));
        assert_eq!(problem.extensions["trace_id"], "abc");
        assert!(!problem.extensions.contains_key("title"));
    }

    #[test]
    fn requires_type_and_title() {
        assert!(ProblemDetails::from_value(&json!({"title": "x"})).is_none());
        assert!(ProblemDetails::from_value(&json!({"type": "x"})).is_none());
        assert!(ProblemDetails::from_value(&json!({"type": 1, "title": "x"})).is_none());
        assert!(ProblemDetails::from_value(&json!(["type", "title"])).is_none());
    }

    #[test]
    fn non_string_detail_becomes_extension() {
        let body = json!({"type": "t", "title": "x", "detail": {"field": "name"}});
        let problem = ProblemDetails::from_value(&body).unwrap();
        assert!(problem.detail.is_none());
        assert_eq!(problem.extensions["detail"]["field"], "name");
    }

    #[test]
    fn serializes_back_to_flat_object() {
        let body = json!({"type": "t", "title": "x", "code": "E1"});
        let problem = ProblemDetails::from_value(&body).unwrap();
        assert_eq!(serde_json::to_value(&problem).unwrap(), body);
    }

    #[test]
    fn content_type_detection() {
        assert!(is_problem_json("application/problem+json"));
        assert!(is_problem_json("Application/Problem+JSON; charset=utf-8"));
        assert!(!is_problem_json("application/json"));

        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(is_json_content_type("application/vnd.api+json"));
        assert!(!is_json_content_type("text/html"));
        assert!(!is_json_content_type(""));
    }
}
