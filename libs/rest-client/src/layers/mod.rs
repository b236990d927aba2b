//! Tower layers of the transport stack
//!
//! - [`RequestPolicyLayer`] - per-attempt timeout and retries with exponential backoff
//! - [`RedirectPolicy`] - redirect policy honoring the per-request follow flag

mod policy;
mod redirect;

pub use policy::{AttemptDeadline, RequestPolicy, RequestPolicyLayer, RequestPolicyService};
pub use redirect::RedirectPolicy;
