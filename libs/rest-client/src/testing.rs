//! In-memory [`RestClient`] for tests of code that depends on one.
//!
//! ```ignore
//! use rest_client::testing::{FakeRestClient, RecordedPayload};
//!
//! let fake = FakeRestClient::new()
//!     .route(Method::GET, "/users/1", json!({"id": 1}))
//!     .route(Method::POST, "/users", json!({"id": 2}));
//!
//! let service = UserService::new(fake.clone());
//! service.rename(1, "alice").await?;
//!
//! assert_eq!(
//!     fake.last_payload(&Method::POST, "/users"),
//!     Some(RecordedPayload::Body(json!({"name": "alice"})))
//! );
//! ```

use crate::client::RestClient;
use crate::error::{RequestError, TransportError};
use crate::options::RequestOptions;
use crate::transport::RawResponse;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What a call carried as its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedPayload {
    /// No body, as for `GET` and `DELETE`
    Empty,
    Body(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub route: String,
    pub payload: RecordedPayload,
}

/// Canned-response stand-in for [`HttpRestClient`](crate::HttpRestClient).
///
/// Responses come from a fixed `method -> route -> JSON` table. Routes match
/// after dropping one leading `/`, the same way the real client treats paths.
/// A route with no entry fails with a 404 [`RequestError`] whose body reads
/// `route not found: <route>`.
///
/// Every call is recorded before it resolves. Clones share the call log.
/// Nothing is logged and errors are not classified.
#[derive(Debug, Clone, Default)]
pub struct FakeRestClient {
    routes: Arc<HashMap<Method, HashMap<String, Value>>>,
    calls: Arc<Mutex<HashMap<Method, Vec<RecordedCall>>>>,
}

fn normalize(route: &str) -> &str {
    route.strip_prefix('/').unwrap_or(route)
}

impl FakeRestClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a canned response
    #[must_use]
    pub fn route(mut self, method: Method, route: &str, response: Value) -> Self {
        Arc::make_mut(&mut self.routes)
            .entry(method)
            .or_default()
            .insert(normalize(route).to_owned(), response);
        self
    }

    /// Forget every recorded call; the routing table is kept.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Calls made with `method`, oldest first.
    #[must_use]
    pub fn calls_for(&self, method: &Method) -> Vec<RecordedCall> {
        self.calls.lock().get(method).cloned().unwrap_or_default()
    }

    /// Payload of the most recent `method` call to `route`.
    #[must_use]
    pub fn last_payload(&self, method: &Method, route: &str) -> Option<RecordedPayload> {
        let route = normalize(route);
        self.calls
            .lock()
            .get(method)?
            .iter()
            .rev()
            .find(|call| call.route == route)
            .map(|call| call.payload.clone())
    }

    #[must_use]
    pub fn was_called(&self, method: &Method, route: &str) -> bool {
        self.last_payload(method, route).is_some()
    }

    fn record(&self, method: &Method, route: &str, body: Option<&Value>) {
        let payload = body.map_or(RecordedPayload::Empty, |b| RecordedPayload::Body(b.clone()));
        self.calls
            .lock()
            .entry(method.clone())
            .or_default()
            .push(RecordedCall {
                route: route.to_owned(),
                payload,
            });
    }

    fn lookup(&self, method: &Method, route: &str) -> Option<&Value> {
        self.routes.get(method)?.get(route)
    }
}

#[async_trait]
impl RestClient for FakeRestClient {
    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        _options: RequestOptions,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let route = normalize(path);
        self.record(&method, route, body.as_ref());

        let Some(value) = self.lookup(&method, route) else {
            let inner = TransportError::HttpStatus {
                status: StatusCode::NOT_FOUND,
                body_preview: format!("route not found: {route}"),
                content_type: None,
            };
            return Err(RequestError::local(method, route.to_owned(), inner));
        };

        serde_json::from_value(value.clone())
            .map_err(|e| RequestError::local(method, route.to_owned(), TransportError::Json(e)))
    }

    async fn raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        _options: RequestOptions,
    ) -> Result<RawResponse, TransportError> {
        let route = normalize(path);
        self.record(&method, route, body.as_ref());

        let mut headers = HeaderMap::new();
        let (status, body) = match self.lookup(&method, route) {
            Some(value) => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                (StatusCode::OK, Bytes::from(serde_json::to_vec(value)?))
            }
            None => (
                StatusCode::NOT_FOUND,
                Bytes::from(format!("route not found: {route}")),
            ),
        };
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
