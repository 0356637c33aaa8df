//! The retry engine (component C4, §4.4).
//!
//! Wraps a single-attempt fetch closure with exponential backoff over a
//! narrow, explicit set of retriable conditions. Grounded in shape (an
//! attempt loop around a cloneable request, classifying the outcome before
//! deciding whether to sleep-and-retry) on the cached-client retry loop in
//! `astral-sh-uv`'s `cached_client.rs`; the classification rules themselves
//! come from §4.4, which is narrower than that crate's generic retry policy
//! (only specific status codes and transport error kinds, POST and
//! non-rewindable bodies are never retried).

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};
use crate::options::RetryOptions;

/// The 1-based attempt count is surfaced to the caller as `x-fetch-attempts`.
pub const ATTEMPTS_HEADER: &str = "x-fetch-attempts";

/// Whether `outcome` should trigger another attempt, given the request's
/// `method` and whether its body `is_rewindable`.
pub fn should_retry(method: &str, is_rewindable: bool, outcome: &AttemptOutcome) -> bool {
    if method.eq_ignore_ascii_case("post") {
        return false;
    }
    if !is_rewindable {
        return false;
    }
    match outcome {
        AttemptOutcome::Status(code) => matches!(*code, 408 | 420 | 429) || *code >= 500,
        AttemptOutcome::TransportError(kind) => matches!(
            kind,
            TransportErrorKind::ConnReset
                | TransportErrorKind::ConnRefused
                | TransportErrorKind::AddrInUse
                | TransportErrorKind::TimedOut
                | TransportErrorKind::RequestTimeout
        ),
    }
}

/// A coarse classification of why an attempt failed, used only to decide
/// retriability (§4.4); the caller's eventual error/response carries the
/// full detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt completed with this HTTP status.
    Status(u16),
    /// The attempt failed before a status was available.
    TransportError(TransportErrorKind),
}

/// Transport-level failure kinds relevant to retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// `ECONNRESET`-equivalent.
    ConnReset,
    /// `ECONNREFUSED`-equivalent.
    ConnRefused,
    /// `EADDRINUSE`-equivalent.
    AddrInUse,
    /// `ETIMEDOUT`-equivalent.
    TimedOut,
    /// The per-attempt deadline elapsed.
    RequestTimeout,
    /// DNS resolution failed (`ENOTFOUND`-equivalent) -- never retried.
    NotFound,
    /// Anything else -- never retried.
    Other,
}

impl TransportErrorKind {
    /// Classifies a [`reqwest::Error`] by its observable shape.
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::RequestTimeout;
        }
        if err.is_connect() {
            let msg = err.to_string();
            if msg.contains("refused") {
                return Self::ConnRefused;
            }
            if msg.contains("reset") {
                return Self::ConnReset;
            }
            if msg.contains("in use") {
                return Self::AddrInUse;
            }
            if msg.contains("dns") || msg.contains("resolve") || msg.contains("not found") {
                return Self::NotFound;
            }
            return Self::TimedOut;
        }
        Self::Other
    }
}

/// Computes the backoff delay before attempt number `attempt` (1-based: the
/// delay before the *second* attempt is `attempt = 1`).
pub fn backoff_delay(opts: &RetryOptions, attempt: u32) -> Duration {
    let scaled = opts.min_timeout.as_secs_f64() * opts.factor.powi(attempt as i32);
    let capped = scaled.min(opts.max_timeout.as_secs_f64());
    let delay = if opts.randomize {
        let jitter = rand::thread_rng().gen_range(0.0..capped.max(f64::EPSILON));
        jitter
    } else {
        capped
    };
    Duration::from_secs_f64(delay)
}

/// Drives `attempt` up to `opts.retries + 1` times, sleeping per
/// [`backoff_delay`] between tries, given `classify` to turn a raw outcome
/// `T` into an [`AttemptOutcome`] and a retry decision.
///
/// On final exhaustion: if the last outcome was an HTTP status (even a
/// retriable one), that response is returned as-is so the caller sees the
/// real final status (§4.4); a transport error instead propagates.
pub async fn run<T, F, Fut>(
    opts: &RetryOptions,
    method: &str,
    is_rewindable: bool,
    classify: impl Fn(&T) -> Option<AttemptOutcome>,
    classify_error: impl Fn(&Error) -> Option<AttemptOutcome>,
    mut attempt: F,
) -> Result<(T, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err: Option<Error> = None;
    for n in 0..=opts.retries {
        match attempt(n + 1).await {
            Ok(value) => {
                let outcome = classify(&value);
                let retriable = outcome.as_ref().is_some_and(|o| should_retry(method, is_rewindable, o));
                if !retriable || n == opts.retries {
                    return Ok((value, n + 1));
                }
                tokio::time::sleep(backoff_delay(opts, n)).await;
            }
            Err(e) => {
                let outcome = classify_error(&e);
                let retriable = outcome.as_ref().is_some_and(|o| should_retry(method, is_rewindable, o));
                last_err = Some(e);
                if !retriable || n == opts.retries {
                    break;
                }
                tokio::time::sleep(backoff_delay(opts, n)).await;
            }
        }
    }
    Err(last_err.unwrap_or(Error::RequestTimeout(String::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_is_never_retriable() {
        assert!(!should_retry("POST", true, &AttemptOutcome::Status(503)));
    }

    #[test]
    fn non_rewindable_body_is_never_retriable() {
        assert!(!should_retry("GET", false, &AttemptOutcome::Status(503)));
    }

    #[test]
    fn rate_limit_and_server_error_are_retriable() {
        assert!(should_retry("GET", true, &AttemptOutcome::Status(429)));
        assert!(should_retry("GET", true, &AttemptOutcome::Status(503)));
        assert!(should_retry("GET", true, &AttemptOutcome::TransportError(TransportErrorKind::ConnReset)));
    }

    #[test]
    fn not_found_and_plain_4xx_are_not_retriable() {
        assert!(!should_retry("GET", true, &AttemptOutcome::TransportError(TransportErrorKind::NotFound)));
        assert!(!should_retry("GET", true, &AttemptOutcome::Status(404)));
    }

    #[test]
    fn backoff_respects_max_timeout() {
        let opts = RetryOptions {
            retries: 5,
            factor: 10.0,
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_millis(500),
            randomize: false,
            timeout: None,
        };
        assert_eq!(backoff_delay(&opts, 4), Duration::from_millis(500));
    }
}
