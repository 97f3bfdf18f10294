//! Shared outbound HTTP plumbing
//!
//! Every remote call goes through one `ureq::Agent` with a global
//! per-request timeout, and through [`with_retry`], which retries transient
//! failures with exponential backoff and maps the final failure onto a
//! [`MailError`] kind.

use std::time::Duration;

use log::{debug, warn};

use crate::error::MailError;

/// Retry behaviour for remote calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled after each failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy that never sleeps (for tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
        }
    }
}

/// Build an agent whose requests fail after `timeout`
pub fn agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

/// Whether a failed call is worth repeating
pub fn is_transient(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::StatusCode(code) => *code == 429 || *code >= 500,
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => true,
        _ => false,
    }
}

/// Map a failed call onto an error kind
///
/// `what` names the remote resource, e.g. "message 18c2f" or "labels".
pub fn classify(err: ureq::Error, what: &str) -> MailError {
    match err {
        ureq::Error::StatusCode(401) | ureq::Error::StatusCode(403) => {
            MailError::AuthRequired { auth_url: None }
        }
        ureq::Error::StatusCode(404) => MailError::not_found(what),
        ureq::Error::StatusCode(code) => {
            MailError::upstream(format!("{}: HTTP status {}", what, code))
        }
        ureq::Error::Timeout(_) => MailError::upstream(format!("{}: request timed out", what)),
        other => MailError::upstream(format!("{}: {}", what, other)),
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
pub fn with_retry<T, F>(policy: &RetryPolicy, what: &str, op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Result<T, ureq::Error>,
{
    with_retry_classified(policy, what, op, classify)
}

/// [`with_retry`] with a caller-supplied mapping for the final failure
pub fn with_retry_classified<T, F, C>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
    classify: C,
) -> anyhow::Result<T>
where
    F: FnMut() -> Result<T, ureq::Error>,
    C: Fn(ureq::Error, &str) -> MailError,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < policy.max_attempts => {
                debug!("{} failed (attempt {}): {}", what, attempt, e);
                if !delay.is_zero() {
                    std::thread::sleep(delay + Duration::from_millis(rand_jitter()));
                }
                delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                if is_transient(&e) {
                    warn!("{} failed after {} attempts: {}", what, attempt, e);
                }
                return Err(classify(e, what).into());
            }
        }
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
