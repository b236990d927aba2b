use crate::classify::{FailedCall, Timings, classify};
use crate::client::RestClient;
use crate::error::{RequestError, TransportError};
use crate::headers::Headers;
use crate::logging::{RequestLogger, ResponseSummary};
use crate::options::{RequestOptions, ResolvedOptions, compose};
use crate::transport::{RawResponse, Transport};
use async_trait::async_trait;
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Callback producing extra headers for every request, e.g. a fresh
/// correlation id or a short-lived token.
pub type HeaderGenerator = Arc<dyn Fn() -> Headers + Send + Sync>;

/// Request executor over the HTTP transport.
///
/// Cheap to clone; clones share the connection pool and logger. Build one
/// with [`RestClientBuilder`](crate::RestClientBuilder).
#[derive(Clone)]
pub struct HttpRestClient {
    transport: Transport,
    base_url: Option<String>,
    default_headers: Arc<Headers>,
    header_generator: Option<HeaderGenerator>,
    logger: Arc<dyn RequestLogger>,
}

impl fmt::Debug for HttpRestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRestClient")
            .field("transport", &self.transport)
            .field("base_url", &self.base_url)
            .field("default_headers", &crate::redact::redact_headers(&self.default_headers))
            .field("header_generator", &self.header_generator.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpRestClient {
    pub(crate) fn new(
        transport: Transport,
        base_url: Option<String>,
        default_headers: Headers,
        header_generator: Option<HeaderGenerator>,
        logger: Arc<dyn RequestLogger>,
    ) -> Self {
        Self {
            transport,
            base_url,
            default_headers: Arc::new(default_headers),
            header_generator,
            logger,
        }
    }

    /// Headers computed at construction and sent with every request.
    #[must_use]
    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    /// Target URL for `path`: one leading `/` is dropped, then the rest is
    /// joined to the base URL. Without a base URL the path must be absolute.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        match &self.base_url {
            Some(base) if path.is_empty() => base.clone(),
            Some(base) => format!("{}/{path}", base.trim_end_matches('/')),
            None => path.to_owned(),
        }
    }

    /// Compose the options for one call. The header generator runs here, once
    /// per request.
    fn resolve(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> (String, ResolvedOptions) {
        let generated = self.header_generator.as_ref().map(|generate| generate());
        let resolved = compose(
            method,
            body,
            options,
            &self.default_headers,
            generated.as_ref(),
        );
        (self.url_for(path), resolved)
    }
}

/// Check the status and parse the body. Parse errors share the failure path
/// with transport errors.
fn parse_success<T: DeserializeOwned>(response: RawResponse) -> Result<(T, RawResponse), TransportError> {
    let response = response.error_for_status()?;
    let value = response.json()?;
    Ok((value, response))
}

#[async_trait]
impl RestClient for HttpRestClient {
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
        let (url, options) = self.resolve(method, path, body, &options);
        let mut timings = Timings::start();

        let error = match self.transport.send(&url, &options).await {
            Ok(response) => {
                timings.end = Some(Instant::now());
                match parse_success::<T>(response) {
                    Ok((value, response)) => {
                        let summary = ResponseSummary {
                            method: options.method.clone(),
                            url,
                            status: response.status,
                            headers: response.headers,
                            duration: timings.duration(),
                        };
                        self.logger.log_success(&summary, &options);
                        return Ok(value);
                    }
                    Err(error) => error,
                }
            }
            Err(error) => {
                timings.error = Some(Instant::now());
                error
            }
        };

        let error = classify(FailedCall {
            options,
            url,
            error,
            timings,
        });
        self.logger.log_failure(&error);
        Err(error)
    }

    async fn raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<RawResponse, TransportError> {
        let (url, options) = self.resolve(method, path, body, &options);
        self.transport.send(&url, &options).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::logging::NoopLogger;

    fn client(base_url: Option<&str>) -> HttpRestClient {
        HttpRestClient::new(
            Transport::new(&TransportConfig::default()).unwrap(),
            base_url.map(str::to_owned),
            Headers::new(),
            None,
            Arc::new(NoopLogger),
        )
    }

    #[tokio::test]
    async fn strips_a_single_leading_slash() {
        let c = client(Some("http://h/api"));
        assert_eq!(c.url_for("/users"), "http://h/api/users");
        assert_eq!(c.url_for("users"), "http://h/api/users");
        assert_eq!(c.url_for("//users"), "http://h/api//users");
        assert_eq!(c.url_for(""), "http://h/api");
    }

    #[tokio::test]
    async fn trailing_slash_on_base_is_not_doubled() {
        let c = client(Some("http://h/api/"));
        assert_eq!(c.url_for("/users"), "http://h/api/users");
    }

    #[tokio::test]
    async fn without_base_url_the_path_is_the_url() {
        let c = client(None);
        assert_eq!(c.url_for("http://h/x"), "http://h/x");
    }

    #[tokio::test]
    async fn generator_runs_once_per_request_and_wins() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator: HeaderGenerator = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Headers::from([("A", "4")]).with("X-Seq", n.to_string())
        });
        let c = HttpRestClient::new(
            Transport::new(&TransportConfig::default()).unwrap(),
            None,
            Headers::from([("A", "1")]),
            Some(generator),
            Arc::new(NoopLogger),
        );

        let options = RequestOptions::new().header("A", "2").header("B", "3");
        let (_, first) = c.resolve(Method::GET, "http://h/x", None, &options);
        let (_, second) = c.resolve(Method::GET, "http://h/x", None, &options);

        assert_eq!(first.headers.get("A"), Some("4"));
        assert_eq!(first.headers.get("B"), Some("3"));
        assert_eq!(first.headers.get("X-Seq"), Some("0"));
        assert_eq!(second.headers.get("X-Seq"), Some("1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
