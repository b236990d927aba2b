use crate::error::{RequestError, TransportError};
use crate::options::RequestOptions;
use crate::transport::RawResponse;
use async_trait::async_trait;
use http::Method;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::Value;

/// Public contract shared by the executor, the cache decorator and the test
/// double.
///
/// Implementors provide [`send`](Self::send) and [`raw`](Self::raw); the verb
/// helpers are built on top of them.
///
/// Write helpers take the body by reference. Anything that serializes to
/// `null` (`&()`, `&None::<T>`) sends no body at all.
///
/// # Example
///
/// ```ignore
/// use rest_client::{RestClient, RestClientBuilder, RequestOptions};
///
/// let client = RestClientBuilder::new()
///     .base_url("https://api.example.com/v1")
///     .bearer_token("t0k")
///     .build()?;
///
/// let user: User = client.get("/users/42", RequestOptions::new()).await?;
/// let created: User = client.post("users", &new_user, RequestOptions::new()).await?;
/// ```
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Issue one request and parse the 2xx body as `T`.
    ///
    /// An empty body parses as JSON `null`, so `Option<_>`, `()` and
    /// [`IgnoredAny`] accept it.
    ///
    /// # Errors
    /// Returns [`RequestError`] for every failure, after it has been logged.
    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static;

    /// Issue one request and hand back status, headers and body untouched.
    ///
    /// Non-2xx statuses are returned, not raised. Nothing is logged and
    /// failures are not classified.
    ///
    /// # Errors
    /// Returns the [`TransportError`] as the transport produced it.
    async fn raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<RawResponse, TransportError>;

    /// # Errors
    /// See [`send`](Self::send).
    async fn get<T>(&self, path: &str, options: RequestOptions) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.send(Method::GET, path, None, options).await
    }

    /// # Errors
    /// See [`send`](Self::send); a body that cannot be serialized fails
    /// before anything is sent.
    async fn post<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + Sync + ?Sized,
    {
        let body = encode_body(&Method::POST, path, body)?;
        self.send(Method::POST, path, body, options).await
    }

    /// # Errors
    /// See [`post`](Self::post).
    async fn put<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + Sync + ?Sized,
    {
        let body = encode_body(&Method::PUT, path, body)?;
        self.send(Method::PUT, path, body, options).await
    }

    /// # Errors
    /// See [`post`](Self::post).
    async fn patch<T, B>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + Sync + ?Sized,
    {
        let body = encode_body(&Method::PATCH, path, body)?;
        self.send(Method::PATCH, path, body, options).await
    }

    /// Any response body is discarded.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    async fn delete(&self, path: &str, options: RequestOptions) -> Result<(), RequestError> {
        self.send::<IgnoredAny>(Method::DELETE, path, None, options)
            .await
            .map(|_| ())
    }
}

/// Serialize a write body up front. Failures here are local: nothing was
/// sent, so they are not passed to the logger.
fn encode_body<B>(method: &Method, path: &str, body: &B) -> Result<Option<Value>, RequestError>
where
    B: Serialize + ?Sized,
{
    match serde_json::to_value(body) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(RequestError::local(
            method.clone(),
            path.to_owned(),
            TransportError::Json(e),
        )),
    }
}
