//! Retry policy for transient GitHub failures
//!
//! Rate limiting (429) is always retried. Server errors (5xx) and timeouts
//! are retried only for requests that can be replayed without duplicating
//! their effect; every other status is returned to the caller immediately.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Whether sending a request twice can duplicate its effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Reads, and writes that converge (adding a label twice is a no-op)
    Safe,
    /// Writes that create something on every call, like a comment
    Unsafe,
}

/// Exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound for both computed backoff and server-requested waits
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retry `attempt`, preferring the server's own hint
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.min(self.max_delay),
            None => self.backoff(attempt),
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// 429 always; 5xx only when the request is safe to replay
pub fn should_retry_status(status: u16, replay: Replay) -> bool {
    match replay {
        Replay::Safe => status == 429 || (500..=599).contains(&status),
        Replay::Unsafe => status == 429,
    }
}

/// Transport failures that may succeed on a second try.
///
/// A failed connect never reached the server, so it is retried even for
/// unsafe requests; a timeout may have been processed.
pub fn is_retryable_error(err: &reqwest::Error, replay: Replay) -> bool {
    match replay {
        Replay::Safe => err.is_timeout() || err.is_connect() || err.is_request(),
        Replay::Unsafe => err.is_connect(),
    }
}

/// Wait requested by a rate-limited response.
///
/// `Retry-After` (seconds) wins; otherwise an exhausted
/// `x-ratelimit-remaining` with an `x-ratelimit-reset` epoch gives the wait.
pub fn retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let seconds = header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse::<u64>().ok());
    if let Some(seconds) = seconds {
        return Some(Duration::from_secs(seconds));
    }

    if header_str(headers, "x-ratelimit-remaining") != Some("0") {
        return None;
    }
    let reset = header_str(headers, "x-ratelimit-reset")?.parse::<u64>().ok()?;
    let now = now.duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_classification() {
        assert!(should_retry_status(429, Replay::Safe));
        assert!(should_retry_status(500, Replay::Safe));
        assert!(should_retry_status(502, Replay::Safe));
        assert!(should_retry_status(503, Replay::Safe));
        assert!(!should_retry_status(200, Replay::Safe));
        assert!(!should_retry_status(401, Replay::Safe));
        assert!(!should_retry_status(404, Replay::Safe));
        assert!(!should_retry_status(422, Replay::Safe));
    }

    #[test]
    fn test_unsafe_requests_retry_only_rate_limits() {
        assert!(should_retry_status(429, Replay::Unsafe));
        assert!(!should_retry_status(500, Replay::Unsafe));
        assert!(!should_retry_status(502, Replay::Unsafe));
        assert!(!should_retry_status(404, Replay::Unsafe));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(8),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), Duration::from_secs(8));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn test_server_hint_overrides_backoff_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.delay(1, Some(Duration::from_secs(3600))),
            policy.max_delay
        );
        assert_eq!(policy.delay(2, None), policy.backoff(2));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::none().allows_retry(1));
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("42"));
        assert_eq!(
            retry_after(&headers, SystemTime::now()),
            Some(Duration::from_secs(42))
        );
    }

    #[test]
    fn test_rate_limit_reset_epoch() {
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000017"));
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(17)));

        // Reset already passed
        let later = now + Duration::from_secs(60);
        assert_eq!(retry_after(&headers, later), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_hint_without_exhausted_quota() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("12"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000017"));
        assert_eq!(retry_after(&headers, SystemTime::now()), None);
        assert_eq!(retry_after(&HeaderMap::new(), SystemTime::now()), None);
    }
}
