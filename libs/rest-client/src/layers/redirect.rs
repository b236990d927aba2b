//! Redirect policy for the transport stack
//!
//! - Follows redirects only when the request's [`RequestPolicy`] allows it
//! - Limits total redirects per request
//! - Blocks HTTPS → HTTP downgrades
//! - Strips `Authorization`, `Cookie` and `Proxy-Authorization` once the chain
//!   leaves the original origin
//!
//! A redirect that is not followed is returned to the caller as the 3xx
//! response itself.

use super::RequestPolicy;
use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Cloned per request by `FollowRedirect`, so the counters start fresh.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    max_redirects: usize,
    redirect_count: usize,
    /// Read from the first request's extensions
    follow: Option<bool>,
    cross_origin_detected: bool,
}

impl RedirectPolicy {
    #[must_use]
    pub fn new(max_redirects: usize) -> Self {
        Self {
            max_redirects,
            redirect_count: 0,
            follow: None,
            cross_origin_detected: false,
        }
    }

    fn is_same_origin(original: &Uri, target: &Uri) -> bool {
        let orig_scheme = original.scheme_str().unwrap_or("https");
        let target_scheme = target.scheme_str().unwrap_or("https");
        let orig_port = original
            .port_u16()
            .unwrap_or_else(|| default_port(orig_scheme));
        let target_port = target
            .port_u16()
            .unwrap_or_else(|| default_port(target_scheme));

        orig_scheme == target_scheme
            && original.host().unwrap_or("") == target.host().unwrap_or("")
            && orig_port == target_port
    }

    fn is_https_downgrade(original: &Uri, target: &Uri) -> bool {
        original.scheme_str().unwrap_or("https") == "https"
            && target.scheme_str().unwrap_or("https") == "http"
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

impl<B: Clone, E> Policy<B, E> for RedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        if self.follow == Some(false) {
            return Ok(Action::Stop);
        }

        self.redirect_count += 1;
        if self.redirect_count > self.max_redirects {
            tracing::debug!(
                count = self.redirect_count,
                max = self.max_redirects,
                "Redirect limit reached"
            );
            return Ok(Action::Stop);
        }

        let original = attempt.previous();
        let target = attempt.location();

        if Self::is_https_downgrade(original, target) {
            tracing::warn!(
                original = %original,
                target = %target,
                "Blocking HTTPS to HTTP downgrade redirect"
            );
            return Ok(Action::Stop);
        }

        if !Self::is_same_origin(original, target) {
            self.cross_origin_detected = true;
        }

        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        // Also called for the initial request, before any redirect.
        if self.follow.is_none() {
            self.follow = Some(
                request
                    .extensions()
                    .get::<RequestPolicy>()
                    .is_none_or(|p| p.follow_redirects),
            );
        }

        if self.cross_origin_detected {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "Stripped sensitive header on cross-origin redirect");
                }
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 resend the body
        Some(body.clone())
    }
}
