use crate::cache::CachedRestClient;
use crate::config::{ExponentialBackoff, LogFormat, RestClientConfig, default_headers};
use crate::error::ConfigError;
use crate::executor::{HeaderGenerator, HttpRestClient};
use crate::headers::Headers;
use crate::logging::RequestLogger;
use crate::secret::Secret;
use crate::transport::Transport;
use http::{HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`HttpRestClient`] and [`CachedRestClient`].
///
/// Every [`RestClientConfig`] field has a setter. The logger and header
/// generator can only be set here since they are code, not configuration.
pub struct RestClientBuilder {
    config: RestClientConfig,
    logger: Option<Arc<dyn RequestLogger>>,
    header_generator: Option<HeaderGenerator>,
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RestClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RestClientConfig::default())
    }

    /// Start from a loaded configuration
    #[must_use]
    pub fn with_config(config: RestClientConfig) -> Self {
        Self {
            config,
            logger: None,
            header_generator: None,
        }
    }

    /// Prefix joined with every request path
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Send `Authorization: Basic ...` with every request.
    ///
    /// Takes precedence over [`bearer_token`](Self::bearer_token).
    #[must_use]
    pub fn basic_auth(mut self, user_name: impl Into<String>, password: impl Into<Secret>) -> Self {
        self.config.auth.basic_auth_user_name = Some(user_name.into());
        self.config.auth.basic_auth_password = Some(password.into());
        self
    }

    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<Secret>) -> Self {
        self.config.auth.bearer_token = Some(token.into());
        self
    }

    /// Add a static header sent with every request
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name, value);
        self
    }

    /// Set the user agent string; an empty string disables the header
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Pick one of the bundled loggers. Ignored when [`logger`](Self::logger)
    /// is set.
    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Inject a logger implementation
    #[must_use]
    pub fn logger(mut self, logger: impl RequestLogger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Headers produced by `generator` are added to every request, on top
    /// of the default and per-call headers.
    #[must_use]
    pub fn header_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Headers + Send + Sync + 'static,
    {
        self.header_generator = Some(Arc::new(generator));
        self
    }

    /// Timeout for each attempt
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout = timeout;
        self
    }

    /// Retries after the first attempt (default 0)
    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.config.transport.retries = retries;
        self
    }

    /// Delay between retries
    #[must_use]
    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.config.transport.backoff = backoff;
        self
    }

    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.transport.follow_redirects = follow;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.transport.max_redirects = max;
        self
    }

    #[must_use]
    pub fn decompress(mut self, decompress: bool) -> Self {
        self.config.transport.decompress = decompress;
        self
    }

    /// Set the maximum response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.transport.max_body_size = size;
        self
    }

    /// Lifetime of cached responses ([`build_cached`](Self::build_cached) only)
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    #[must_use]
    pub fn cache_max_entries(mut self, max_entries: u64) -> Self {
        self.config.cache.max_entries = max_entries;
        self
    }

    /// Build the request executor.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the base URL is not an absolute `http(s)`
    /// URL, a default header cannot be encoded, or TLS initialization fails.
    pub fn build(self) -> Result<HttpRestClient, ConfigError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .map(validate_base_url)
            .transpose()?;

        let headers = default_headers(&self.config);
        validate_headers(&headers)?;

        let transport = Transport::new(&self.config.transport)?;
        let logger = self
            .logger
            .unwrap_or_else(|| self.config.log_format.logger());

        tracing::debug!(
            base_url = base_url.as_deref().unwrap_or_default(),
            retries = self.config.transport.retries,
            "REST client built"
        );

        Ok(HttpRestClient::new(
            transport,
            base_url,
            headers,
            self.header_generator,
            logger,
        ))
    }

    /// Build the executor wrapped in the read-through cache.
    ///
    /// # Errors
    /// See [`build`](Self::build).
    pub fn build_cached(self) -> Result<CachedRestClient<HttpRestClient>, ConfigError> {
        let cache = self.config.cache.clone();
        Ok(CachedRestClient::new(self.build()?, &cache))
    }
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_owned(),
        reason,
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host().is_none() {
        return Err(invalid("missing host".to_owned()));
    }
    // Keep the caller's spelling; Url::parse would append a '/' to bare hosts.
    Ok(raw.to_owned())
}

fn validate_headers(headers: &Headers) -> Result<(), ConfigError> {
    for (name, value) in headers.iter() {
        HeaderName::try_from(name).map_err(|e| ConfigError::InvalidHeader {
            name: name.to_owned(),
            reason: e.to_string(),
        })?;
        HeaderValue::try_from(value).map_err(|e| ConfigError::InvalidHeader {
            name: name.to_owned(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
