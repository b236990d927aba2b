use crate::headers::Headers;
use crate::logging::{NoopLogger, RequestLogger, StructuredLogger, TextLogger};
use crate::secret::Secret;
use base64::Engine;
use base64::engine::general_purpose;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("cf-rest-client/", env!("CARGO_PKG_VERSION"));

/// Default maximum response body size (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Which request logger the client is built with.
///
/// Selected explicitly; an injected [`RequestLogger`] on the builder takes
/// precedence over this setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Nothing is logged
    #[default]
    None,
    /// Human-readable multi-line banners
    Text,
    /// Key/value records for log pipelines
    Structured,
}

impl LogFormat {
    #[must_use]
    pub fn logger(self) -> Arc<dyn RequestLogger> {
        match self {
            LogFormat::None => Arc::new(NoopLogger),
            LogFormat::Text => Arc::new(TextLogger::new()),
            LogFormat::Structured => Arc::new(StructuredLogger::new()),
        }
    }
}

/// Credentials turned into an `Authorization` header at construction time.
///
/// Basic auth wins when both the basic-auth pair and a bearer token are set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub basic_auth_user_name: Option<String>,
    pub basic_auth_password: Option<Secret>,
    pub bearer_token: Option<Secret>,
}

impl AuthConfig {
    /// Compute the `Authorization` header value, if any credentials are set.
    #[must_use]
    pub fn authorization(&self) -> Option<Zeroizing<String>> {
        if let (Some(user), Some(password)) = (&self.basic_auth_user_name, &self.basic_auth_password)
        {
            let credentials = Zeroizing::new(format!("{user}:{}", password.expose()));
            let encoded = Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
            return Some(Zeroizing::new(format!("Basic {}", &*encoded)));
        }
        self.bearer_token
            .as_ref()
            .map(|token| Zeroizing::new(format!("Bearer {}", token.expose())))
    }
}

/// Settings forwarded to the underlying transport stack.
///
/// Every field can be overridden per call through
/// [`RequestOptions`](crate::RequestOptions) except the pool and body limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Per-attempt timeout, covering connect, response headers and body
    /// read (default: 30s)
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Retries after the first attempt (default: 0)
    pub retries: usize,

    /// Follow 3xx redirects (default: true)
    pub follow_redirects: bool,

    /// Upper bound on redirects followed per request (default: 10)
    pub max_redirects: usize,

    /// Transparently decompress gzip/br/deflate responses (default: true)
    pub decompress: bool,

    /// Maximum response body size in bytes, applied after decompression
    pub max_body_size: usize,

    /// Idle pooled connections are closed after this long (default: 90s)
    #[serde(with = "humantime_option_duration")]
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Delay between retries
    pub backoff: ExponentialBackoff,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 0,
            follow_redirects: true,
            max_redirects: 10,
            decompress: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            backoff: ExponentialBackoff::default(),
        }
    }
}

/// Exponential backoff between retries
///
/// Computes delay as: `min(initial * multiplier^attempt, max)` with optional jitter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    #[serde(with = "humantime_duration")]
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    #[serde(with = "humantime_duration")]
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Adds a random 0-25% on top of each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Delay before retry number `attempt + 1`.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        const MAX_BACKOFF_SECS: f64 = 86400.0;

        let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };
        let max_secs = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);

        let base = self.initial.as_secs_f64() * multiplier.powi(attempt);
        let clamped = if base.is_finite() {
            base.min(max_secs).max(0.0)
        } else {
            max_secs
        };
        let duration = Duration::from_secs_f64(clamped);

        if self.jitter {
            let factor = rand::rng().random_range(0.0..=0.25);
            duration + duration.mul_f64(factor)
        } else {
            duration
        }
    }
}

/// Response cache sizing for [`CachedRestClient`](crate::CachedRestClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

/// Complete client configuration.
///
/// Deserializable so host applications can load it from their own config
/// files; durations are humantime strings such as `"30s"` or `"250ms"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestClientConfig {
    /// Prefix joined with every request path
    pub base_url: Option<String>,
    pub auth: AuthConfig,
    /// Static headers sent with every request
    pub default_headers: Headers,
    pub user_agent: String,
    pub log_format: LogFormat,
    pub transport: TransportConfig,
    pub cache: CacheConfig,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            auth: AuthConfig::default(),
            default_headers: Headers::new(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            log_format: LogFormat::None,
            transport: TransportConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Build the construction-time default headers.
///
/// Precedence low to high: `User-Agent`, the computed `Authorization`
/// header, then the configured static headers.
#[must_use]
pub fn default_headers(config: &RestClientConfig) -> Headers {
    let mut headers = Headers::new();
    if !config.user_agent.is_empty() {
        headers.insert("User-Agent", config.user_agent.as_str());
    }
    if let Some(value) = config.auth.authorization() {
        headers.insert("Authorization", value.as_str());
    }
    headers.merged(&config.default_headers)
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod humantime_option_duration {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header_is_base64_of_user_and_password() {
        let auth = AuthConfig {
            basic_auth_user_name: Some("myname".to_owned()),
            basic_auth_password: Some(Secret::new("1234")),
            bearer_token: None,
        };
        assert_eq!(
            auth.authorization().as_deref().map(String::as_str),
            Some("Basic bXluYW1lOjEyMzQ=")
        );
    }

    #[test]
    fn basic_auth_wins_over_bearer_token() {
        let auth = AuthConfig {
            basic_auth_user_name: Some("myname".to_owned()),
            basic_auth_password: Some(Secret::new("1234")),
            bearer_token: Some(Secret::new("tok")),
        };
        assert!(auth.authorization().unwrap().starts_with("Basic "));
    }

    #[test]
    fn incomplete_basic_pair_falls_back_to_bearer() {
        let auth = AuthConfig {
            basic_auth_user_name: Some("myname".to_owned()),
            basic_auth_password: None,
            bearer_token: Some(Secret::new("tok")),
        };
        assert_eq!(auth.authorization().unwrap().as_str(), "Bearer tok");
    }

    #[test]
    fn no_credentials_no_header() {
        assert!(AuthConfig::default().authorization().is_none());
    }

    #[test]
    fn configured_headers_sit_over_auth_and_user_agent() {
        let config = RestClientConfig {
            auth: AuthConfig {
                bearer_token: Some(Secret::new("tok")),
                ..AuthConfig::default()
            },
            default_headers: Headers::from([("authorization", "Custom xyz"), ("X-App", "a")]),
            ..RestClientConfig::default()
        };

        let headers = default_headers(&config);
        assert_eq!(headers.get("Authorization"), Some("Custom xyz"));
        assert_eq!(headers.get("x-app"), Some("a"));
        assert_eq!(headers.get("user-agent"), Some(DEFAULT_USER_AGENT));
    }

    #[test]
    fn empty_user_agent_is_omitted() {
        let config = RestClientConfig {
            user_agent: String::new(),
            ..RestClientConfig::default()
        };
        assert!(default_headers(&config).is_empty());
    }

    #[test]
    fn default_headers_is_pure() {
        let config = RestClientConfig::default();
        assert_eq!(default_headers(&config), default_headers(&config));
    }

    #[test]
    fn loads_full_yaml_config() {
        let yaml = r#"
base_url: "https://api.example.com/v1"
auth:
  basic_auth_user_name: myname
  basic_auth_password: "1234"
default_headers:
  X-Tenant: acme
user_agent: billing-sync/2.1
log_format: structured
transport:
  timeout: 2s 500ms
  retries: 2
  follow_redirects: false
  pool_idle_timeout: 5m
  backoff:
    initial: 250ms
    max: 5s
    jitter: false
cache:
  ttl: 10m
  max_entries: 500
"#;
        let config: RestClientConfig = serde_saphyr::from_str(yaml).unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com/v1"));
        assert_eq!(config.log_format, LogFormat::Structured);
        assert_eq!(config.transport.timeout, Duration::from_millis(2500));
        assert_eq!(config.transport.retries, 2);
        assert!(!config.transport.follow_redirects);
        assert_eq!(config.transport.max_redirects, 10);
        assert_eq!(config.transport.pool_idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(
            config.transport.backoff,
            ExponentialBackoff {
                initial: Duration::from_millis(250),
                max: Duration::from_secs(5),
                multiplier: 2.0,
                jitter: false,
            }
        );
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert_eq!(config.cache.max_entries, 500);

        let headers = default_headers(&config);
        assert_eq!(headers.get("Authorization"), Some("Basic bXluYW1lOjEyMzQ="));
        assert_eq!(headers.get("User-Agent"), Some("billing-sync/2.1"));
        assert_eq!(headers.get("x-tenant"), Some("acme"));
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let config: RestClientConfig = serde_saphyr::from_str("{}").unwrap();
        assert!(config.base_url.is_none());
        assert_eq!(config.log_format, LogFormat::None);
        assert_eq!(config.transport.timeout, Duration::from_secs(30));
        assert_eq!(config.transport.retries, 0);
        assert_eq!(config.transport.backoff, ExponentialBackoff::default());
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_durations() {
        let unknown: Result<RestClientConfig, _> = serde_saphyr::from_str("retry_count: 3");
        assert!(unknown.is_err());

        let bad: Result<RestClientConfig, _> =
            serde_saphyr::from_str("transport:\n  timeout: soon\n");
        assert!(bad.is_err());
    }

    #[test]
    fn secret_does_not_show_in_debug() {
        let config: RestClientConfig =
            serde_saphyr::from_str("auth:\n  bearer_token: s3cr3t-token\n").unwrap();
        assert!(!format!("{config:?}").contains("s3cr3t-token"));
        assert_eq!(
            config.auth.authorization().unwrap().as_str(),
            "Bearer s3cr3t-token"
        );
    }
}
