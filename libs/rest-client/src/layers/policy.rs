use crate::config::ExponentialBackoff;
use crate::error::TransportError;
use crate::transport::ResponseBody;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

/// Per-request transport policy, carried in the request extensions.
///
/// Requests without one get [`RequestPolicy::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Timeout for each attempt, body read included
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retries: usize,
    pub follow_redirects: bool,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 0,
            follow_redirects: true,
        }
    }
}

/// Deadline of the attempt that produced a response.
///
/// Inserted into the response extensions; the body must be read by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptDeadline(pub Instant);

/// Idempotent methods per RFC 9110.
fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// 429 is retried for every method (the server did not process the request);
/// gateway errors only for idempotent ones.
fn is_retryable_status(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            is_idempotent(method)
        }
        _ => false,
    }
}

fn is_retryable_error(err: &TransportError, method: &Method) -> bool {
    matches!(
        err,
        TransportError::Transport(_) | TransportError::Timeout(_)
    ) && is_idempotent(method)
}

/// Tower layer applying [`RequestPolicy`] timeouts and retries
#[derive(Debug, Clone, Default)]
pub struct RequestPolicyLayer {
    backoff: ExponentialBackoff,
}

impl RequestPolicyLayer {
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self { backoff }
    }
}

impl<S> Layer<S> for RequestPolicyLayer {
    type Service = RequestPolicyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestPolicyService {
            inner,
            backoff: self.backoff.clone(),
        }
    }
}

/// Service enforcing the per-attempt timeout and retrying failed attempts
///
/// The number of retries comes from the request's [`RequestPolicy`]; zero
/// means exactly one attempt.
#[derive(Debug, Clone)]
pub struct RequestPolicyService<S> {
    inner: S,
    backoff: ExponentialBackoff,
}

impl<S> Service<Request<Full<Bytes>>> for RequestPolicyService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = TransportError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Consume the instance that was poll_ready'd, keep a fresh clone.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let backoff = self.backoff.clone();

        let policy = req
            .extensions()
            .get::<RequestPolicy>()
            .copied()
            .unwrap_or_default();
        let (parts, body) = req.into_parts();
        let version = parts.version;
        let extensions = parts.extensions.clone();

        Box::pin(async move {
            let method = parts.method.clone();
            let mut attempt = 0usize;
            loop {
                let mut req = Request::from_parts(parts.clone(), body.clone());
                *req.version_mut() = version;
                *req.extensions_mut() = extensions.clone();

                let mut svc = inner.clone();
                svc.ready().await?;

                let deadline = Instant::now() + policy.timeout;
                let result = match tokio::time::timeout_at(deadline, svc.call(req)).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(TransportError::Timeout(policy.timeout)),
                };

                let retry = attempt < policy.retries
                    && match &result {
                        Ok(resp) => is_retryable_status(resp.status(), &method),
                        Err(err) => is_retryable_error(err, &method),
                    };
                if !retry {
                    return result.map(|mut resp| {
                        resp.extensions_mut().insert(AttemptDeadline(deadline));
                        resp
                    });
                }

                let delay = backoff.delay(attempt);
                match &result {
                    Ok(resp) => tracing::debug!(
                        retry = attempt + 1,
                        max_retries = policy.retries,
                        status = resp.status().as_u16(),
                        method = %method,
                        backoff_ms = delay.as_millis(),
                        "Retrying request after status code"
                    ),
                    Err(err) => tracing::debug!(
                        retry = attempt + 1,
                        max_retries = policy.retries,
                        error = %err,
                        method = %method,
                        backoff_ms = delay.as_millis(),
                        "Retrying request after error"
                    ),
                }
                drop(result);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::util::BoxCloneService;

    fn empty_response(status: StatusCode) -> Response<ResponseBody> {
        let body: ResponseBody = Full::new(Bytes::new())
            .map_err(|never: Infallible| -> Box<dyn std::error::Error + Send + Sync> {
                match never {}
            })
            .boxed();
        let mut resp = Response::new(body);
        *resp.status_mut() = status;
        resp
    }

    fn no_jitter() -> ExponentialBackoff {
        ExponentialBackoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn request(method: Method, policy: RequestPolicy) -> Request<Full<Bytes>> {
        let mut req = Request::builder()
            .method(method)
            .uri("http://localhost/")
            .body(Full::new(Bytes::new()))
            .unwrap();
        req.extensions_mut().insert(policy);
        req
    }

    type TestService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, TransportError>;

    /// Service answering with `statuses` in order, then 200.
    fn scripted(statuses: Vec<StatusCode>, calls: Arc<AtomicUsize>) -> TestService {
        let statuses = Arc::new(statuses);
        BoxCloneService::new(tower::service_fn(move |_req: Request<Full<Bytes>>| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let status = statuses.get(n).copied().unwrap_or(StatusCode::OK);
            async move { Ok::<_, TransportError>(empty_response(status)) }
        }))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = no_jitter();
        assert_eq!(backoff.delay(0), Duration::from_millis(1));
        assert_eq!(backoff.delay(1), Duration::from_millis(2));
        assert_eq!(backoff.delay(10), Duration::from_millis(10));
    }

    #[test]
    fn jitter_stays_within_quarter() {
        let backoff = ExponentialBackoff {
            jitter: true,
            ..no_jitter()
        };
        let delay = backoff.delay(2);
        assert!(delay >= Duration::from_millis(4));
        assert!(delay <= Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_gateway_errors_up_to_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = RequestPolicyLayer::new(no_jitter()).layer(scripted(
            vec![StatusCode::BAD_GATEWAY, StatusCode::SERVICE_UNAVAILABLE],
            calls.clone(),
        ));

        let policy = RequestPolicy {
            retries: 2,
            ..RequestPolicy::default()
        };
        let resp = svc.oneshot(request(Method::GET, policy)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = RequestPolicyLayer::new(no_jitter())
            .layer(scripted(vec![StatusCode::SERVICE_UNAVAILABLE], calls.clone()));

        let resp = svc
            .oneshot(request(Method::GET, RequestPolicy::default()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn post_is_not_retried_on_gateway_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = RequestPolicyLayer::new(no_jitter())
            .layer(scripted(vec![StatusCode::BAD_GATEWAY], calls.clone()));

        let policy = RequestPolicy {
            retries: 3,
            ..RequestPolicy::default()
        };
        let resp = svc.oneshot(request(Method::POST, policy)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn post_is_retried_on_429() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = RequestPolicyLayer::new(no_jitter())
            .layer(scripted(vec![StatusCode::TOO_MANY_REQUESTS], calls.clone()));

        let policy = RequestPolicy {
            retries: 1,
            ..RequestPolicy::default()
        };
        let resp = svc.oneshot(request(Method::POST, policy)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_is_reported_with_duration() {
        let slow = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, TransportError>(empty_response(StatusCode::OK))
        });
        let svc = RequestPolicyLayer::new(no_jitter()).layer(slow);

        let policy = RequestPolicy {
            timeout: Duration::from_millis(50),
            ..RequestPolicy::default()
        };
        let err = svc
            .oneshot(request(Method::GET, policy))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn response_carries_deadline_of_its_attempt() {
        let slow = tower::service_fn(|_req: Request<Full<Bytes>>| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok::<_, TransportError>(empty_response(StatusCode::OK))
        });
        let svc = RequestPolicyLayer::new(no_jitter()).layer(slow);

        let policy = RequestPolicy {
            timeout: Duration::from_millis(50),
            ..RequestPolicy::default()
        };
        let started = Instant::now();
        let resp = svc.oneshot(request(Method::GET, policy)).await.unwrap();

        let deadline = resp.extensions().get::<AttemptDeadline>().unwrap().0;
        assert_eq!(deadline, started + Duration::from_millis(50));
        assert!(deadline.saturating_duration_since(Instant::now()) <= Duration::from_millis(10));
    }
}
