//! HTTP transport: pooled hyper client over rustls, wrapped in a tower stack.
//!
//! Request flow (outer to inner):
//!
//! ```text
//! RequestPolicy (timeout, retries) -> Decompression -> FollowRedirect -> hyper
//! ```
//!
//! Per-call overrides travel as a [`RequestPolicy`] in the request
//! extensions, so one shared stack serves every call.

use crate::config::TransportConfig;
use crate::error::{ConfigError, TransportError};
use crate::layers::{AttemptDeadline, RedirectPolicy, RequestPolicy, RequestPolicyLayer};
use crate::options::{RequestBody, ResolvedOptions};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, header};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

/// Boxed response body produced by the decompression layer
pub type ResponseBody = BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

type HttpService = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, TransportError>;

/// Upper bound on the error body kept for classification and messages
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 64 * 1024;

/// Fully read response, as returned by [`RestClient::raw`](crate::RestClient::raw).
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON. An empty body parses as `null`.
    ///
    /// # Errors
    /// Returns `TransportError::Json` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        if self.body.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into `TransportError::HttpStatus`.
    ///
    /// # Errors
    /// Returns `TransportError::HttpStatus` with a bounded body preview.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let preview = &self.body[..self.body.len().min(ERROR_BODY_PREVIEW_LIMIT)];
        Err(TransportError::HttpStatus {
            status: self.status,
            body_preview: String::from_utf8_lossy(preview).into_owned(),
            content_type: self.content_type().map(str::to_owned),
        })
    }
}

/// Transport defaults that per-call options override.
#[derive(Debug, Clone, Copy)]
struct Defaults {
    timeout: Duration,
    retries: usize,
    follow_redirects: bool,
    decompress: bool,
    max_body_size: usize,
}

/// Shared, cloneable HTTP transport.
#[derive(Clone)]
pub struct Transport {
    service: HttpService,
    defaults: Arc<Defaults>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Build the hyper client and tower stack.
    ///
    /// # Errors
    /// Returns `ConfigError::Tls` if the TLS connector cannot be initialized.
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let https = build_https_connector()?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(RedirectPolicy::new(
                config.max_redirects,
            )))
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(TransportError::from);

        let service = ServiceBuilder::new()
            .layer(RequestPolicyLayer::new(config.backoff.clone()))
            .service(service);

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            defaults: Arc::new(Defaults {
                timeout: config.timeout,
                retries: config.retries,
                follow_redirects: config.follow_redirects,
                decompress: config.decompress,
                max_body_size: config.max_body_size,
            }),
        })
    }

    /// Build the outgoing request for `url` from resolved options.
    ///
    /// # Errors
    /// Returns an error for invalid URLs, header names or values, and bodies
    /// that cannot be encoded.
    pub fn build_request(
        &self,
        url: &str,
        options: &ResolvedOptions,
    ) -> Result<Request<Full<Bytes>>, TransportError> {
        let uri = validate_url(url)?;

        let mut headers = HeaderMap::with_capacity(options.headers.len() + 1);
        for (name, value) in options.headers.iter() {
            headers.insert(
                HeaderName::try_from(name)?,
                HeaderValue::try_from(value)?,
            );
        }

        let body = match &options.body {
            None => Bytes::new(),
            Some(RequestBody::Json(value)) => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                }
                Bytes::from(serde_json::to_vec(value)?)
            }
            Some(RequestBody::Form(value)) => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                }
                Bytes::from(serde_urlencoded::to_string(value)?)
            }
        };

        if !options.decompress.unwrap_or(self.defaults.decompress) {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }

        let mut request = Request::builder()
            .method(options.method.clone())
            .uri(uri)
            .body(Full::new(body))?;
        *request.headers_mut() = headers;
        request.extensions_mut().insert(self.policy_for(options));
        Ok(request)
    }

    fn policy_for(&self, options: &ResolvedOptions) -> RequestPolicy {
        RequestPolicy {
            timeout: options.timeout.unwrap_or(self.defaults.timeout),
            retries: options.retries.unwrap_or(self.defaults.retries),
            follow_redirects: options
                .follow_redirects
                .unwrap_or(self.defaults.follow_redirects),
        }
    }

    /// Send one request and read the whole body, whatever the status.
    ///
    /// Cancelling `options.cancel` aborts the call with
    /// `TransportError::Cancelled`; nothing is delivered afterwards.
    ///
    /// # Errors
    /// Returns `TransportError` for build, transport, timeout, body size and
    /// cancellation failures. Non-2xx statuses are not errors here.
    pub async fn send(
        &self,
        url: &str,
        options: &ResolvedOptions,
    ) -> Result<RawResponse, TransportError> {
        let exchange = self.exchange(url, options);
        match &options.cancel {
            Some(token) => with_cancellation(token, exchange).await,
            None => exchange.await,
        }
    }

    async fn exchange(
        &self,
        url: &str,
        options: &ResolvedOptions,
    ) -> Result<RawResponse, TransportError> {
        let request = self.build_request(url, options)?;
        let timeout = self.policy_for(options).timeout;

        let response = self.service.clone().oneshot(request).await?;
        let (parts, body) = response.into_parts();
        let deadline = parts
            .extensions
            .get::<AttemptDeadline>()
            .map_or_else(|| tokio::time::Instant::now() + timeout, |d| d.0);
        let body = match tokio::time::timeout_at(
            deadline,
            read_body_limited(body, self.defaults.max_body_size),
        )
        .await
        {
            Ok(body) => body?,
            Err(_elapsed) => return Err(TransportError::Timeout(timeout)),
        };

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Race `fut` against `token`; cancellation wins ties.
async fn with_cancellation<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(TransportError::Cancelled),
        result = fut => result,
    }
}

fn validate_url(url: &str) -> Result<http::Uri, TransportError> {
    let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
        TransportError::InvalidUri {
            url: url.to_owned(),
            reason: e.to_string(),
        }
    })?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(TransportError::InvalidUri {
                url: url.to_owned(),
                reason: format!("unsupported scheme '{scheme}'"),
            });
        }
        None => {
            return Err(TransportError::InvalidUri {
                url: url.to_owned(),
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.authority().is_none() {
        return Err(TransportError::InvalidUri {
            url: url.to_owned(),
            reason: "missing host/authority".to_owned(),
        });
    }
    Ok(uri)
}

/// Read the (decompressed) body, failing once it exceeds `limit` bytes.
async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, TransportError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(TransportError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// HTTPS connector with webpki roots; plain `http://` is allowed too.
fn build_https_connector() -> Result<HttpsConnector<HttpConnector>, ConfigError> {
    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(provider)
        .map_err(|e| ConfigError::Tls(Box::new(e)))?
        .https_or_http()
        .enable_all_versions()
        .build();
    Ok(connector)
}
