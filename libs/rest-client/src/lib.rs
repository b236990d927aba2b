#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! REST client for JSON services.
//!
//! Built on the hyper/tower transport of this workspace, it adds:
//! - `Authorization` and default header injection, computed once at build time
//! - Per-request header generation (correlation ids, short-lived tokens)
//! - Success/failure logging through a pluggable [`RequestLogger`], with
//!   credentials and personal fields redacted
//! - One error type, [`RequestError`], with RFC 9457 problem details recognized
//! - Cancellation through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - A read-through `GET` cache ([`CachedRestClient`])
//! - A canned-response double for consumers' tests ([`testing::FakeRestClient`])
//!
//! # Example
//!
//! ```ignore
//! use rest_client::{LogFormat, RequestOptions, RestClient, RestClientBuilder};
//! use std::time::Duration;
//!
//! let client = RestClientBuilder::new()
//!     .base_url("https://api.example.com/v1")
//!     .basic_auth("svc-user", "p4ss")
//!     .log_format(LogFormat::Structured)
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let order: Order = client
//!     .get("/orders/17", RequestOptions::new().retries(2))
//!     .await?;
//! ```

mod builder;
mod cache;
pub mod classify;
mod client;
mod config;
mod error;
mod executor;
mod headers;
pub mod layers;
pub mod logging;
pub mod options;
pub mod problem;
pub mod redact;
mod secret;
pub mod testing;
pub mod transport;

pub use builder::RestClientBuilder;
pub use cache::CachedRestClient;
pub use client::RestClient;
pub use config::{
    AuthConfig, CacheConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, ExponentialBackoff, LogFormat,
    RestClientConfig, TransportConfig, default_headers,
};
pub use error::{ConfigError, FailureDetails, RequestError, TransportError};
pub use executor::{HeaderGenerator, HttpRestClient};
pub use headers::Headers;
pub use logging::{NoopLogger, RequestLogger, ResponseSummary, StructuredLogger, TextLogger};
pub use options::{RequestBody, RequestOptions, ResolvedOptions};
pub use problem::ProblemDetails;
pub use secret::Secret;
pub use transport::RawResponse;
