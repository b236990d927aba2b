//! Read-through response cache over the `GET` path.

use crate::client::RestClient;
use crate::config::CacheConfig;
use crate::error::{RequestError, TransportError};
use crate::options::RequestOptions;
use crate::transport::RawResponse;
use async_trait::async_trait;
use http::Method;
use moka::future::Cache;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Caches parsed `GET` bodies by request path.
///
/// - Keys are the path exactly as passed: the method, query-string ordering
///   and base URL are not part of the key.
/// - Other verbs and [`raw`](RestClient::raw) pass straight through and never
///   invalidate anything.
/// - Failures are not cached and propagate unchanged. A body that does not
///   fit the requested type is a failure of the inner call.
///
/// Entries are whole JSON values; concurrent misses on the same path may both
/// reach the inner client, and the last write wins.
pub struct CachedRestClient<C> {
    inner: C,
    cache: Cache<String, Value>,
}

impl<C: fmt::Debug> fmt::Debug for CachedRestClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRestClient")
            .field("inner", &self.inner)
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

/// Body parsed as `T` that keeps its JSON form for the cache.
///
/// Parsing happens inside the inner client, so a shape mismatch takes its
/// failure path (classified, logged once) instead of its success path.
struct Typed<T> {
    json: Value,
    value: T,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Typed<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Value::deserialize(deserializer)?;
        let value = T::deserialize(&json).map_err(de::Error::custom)?;
        Ok(Self { json, value })
    }
}

impl<C: RestClient> CachedRestClient<C> {
    #[must_use]
    pub fn new(inner: C, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { inner, cache }
    }

    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Always call through, then refresh the entry for `path`.
    ///
    /// # Errors
    /// Returns the inner client's error unchanged; the cache is left as is.
    pub async fn get_no_cache<T>(&self, path: &str, options: RequestOptions) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.fetch(path, options).await
    }

    /// Whether an unexpired entry exists for `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.cache.contains_key(path)
    }

    /// Drop the entry for `path`, if any.
    pub async fn invalidate(&self, path: &str) {
        self.cache.invalidate(path).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    async fn fetch<T>(&self, path: &str, options: RequestOptions) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let typed: Typed<T> = self.inner.send(Method::GET, path, None, options).await?;
        self.cache.insert(path.to_owned(), typed.json).await;
        Ok(typed.value)
    }
}

#[async_trait]
impl<C: RestClient> RestClient for CachedRestClient<C> {
    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if method != Method::GET {
            return self.inner.send(method, path, body, options).await;
        }

        if let Some(hit) = self.cache.get(path).await {
            // An entry stored for a differently shaped type is a miss.
            match serde_json::from_value(hit) {
                Ok(value) => {
                    tracing::trace!(path, "response cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::trace!(path, error = %e, "cached entry does not fit, refetching"),
            }
        }
        self.fetch(path, options).await
    }

    async fn raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<RawResponse, TransportError> {
        self.inner.raw(method, path, body, options).await
    }
}
