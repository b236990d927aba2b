//! Ordered header mapping used for request composition and logging.
//!
//! Header names compare case-insensitively (as HTTP requires) but keep the
//! casing they were inserted with, so logged output shows what the caller wrote.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Case-insensitive, case-preserving, insertion-ordered header mapping.
///
/// Inserting a name that already exists under any casing replaces the value
/// in place and adopts the new casing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].1.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove a header regardless of casing, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Overlay `other` on top of `self`: headers in `other` win.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in &other.entries {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Consuming form of [`merge`](Self::merge).
    #[must_use]
    pub fn merged(mut self, other: &Headers) -> Self {
        self.merge(other);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Mutable access to every value, used by redaction.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = (&str, &mut String)> {
        self.entries.iter_mut().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Headers {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    headers.insert(name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_case_insensitively_and_keeps_position() {
        let mut headers = Headers::from([("Accept", "text/plain"), ("X-Id", "1")]);
        headers.insert("accept", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("ACCEPT"), Some("application/json"));
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["accept", "X-Id"]);
    }

    #[test]
    fn merge_lets_overlay_win() {
        let base = Headers::from([("A", "1"), ("C", "5")]);
        let overlay = Headers::from([("a", "2"), ("B", "3")]);

        let merged = base.merged(&overlay);
        assert_eq!(merged.get("A"), Some("2"));
        assert_eq!(merged.get("B"), Some("3"));
        assert_eq!(merged.get("C"), Some("5"));
    }

    #[test]
    fn remove_ignores_case() {
        let mut headers = Headers::from([("Authorization", "Bearer x")]);
        assert_eq!(headers.remove("authorization"), Some("Bearer x".to_owned()));
        assert!(headers.is_empty());
    }

    #[test]
    fn serde_round_trips_as_map() {
        let headers = Headers::from([("X-Trace", "abc")]);
        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"X-Trace":"abc"}"#);

        let parsed: Headers = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, headers);
    }
}
