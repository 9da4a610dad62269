//! Login throttling
//!
//! Two sliding windows guard the login endpoint:
//! - attempts per email without a successful login (5 per 15 minutes)
//! - attempts per client IP (10 per minute)
//!
//! An attempt is counted when it is admitted, before the password is
//! verified, so concurrent guesses cannot slip past the limit.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::Mutex;

pub const EMAIL_FAILURE_LIMIT: usize = 5;
pub const EMAIL_WINDOW_MINUTES: i64 = 15;
pub const IP_ATTEMPT_LIMIT: usize = 10;
pub const IP_WINDOW_MINUTES: i64 = 1;

/// Timestamps of recent events per key, pruned to the window on access
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: Mutex<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash + Clone> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: Mutex::new(HashMap::new()),
        }
    }

    /// Count an event for `key` unless the window is full.
    ///
    /// On refusal returns the seconds until the oldest event falls out.
    async fn try_acquire(&self, key: &K, now: DateTime<Utc>) -> Result<(), i64> {
        let mut events = self.events.lock().await;
        let cutoff = now - self.window;
        let times = events.entry(key.clone()).or_default();
        times.retain(|t| *t > cutoff);

        if times.len() >= self.limit {
            let retry_after = times
                .iter()
                .min()
                .map(|oldest| (*oldest + self.window - now).num_seconds().max(1))
                .unwrap_or(1);
            return Err(retry_after);
        }
        times.push(now);
        Ok(())
    }

    async fn reset(&self, key: &K) {
        self.events.lock().await.remove(key);
    }

    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut events = self.events.lock().await;
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        events.len()
    }
}

/// Why a login attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginThrottle {
    Email { retry_after_secs: i64 },
    Ip { retry_after_secs: i64 },
}

impl LoginThrottle {
    pub fn retry_after_secs(&self) -> i64 {
        match self {
            LoginThrottle::Email { retry_after_secs } | LoginThrottle::Ip { retry_after_secs } => {
                *retry_after_secs
            }
        }
    }
}

pub struct LoginRateLimiter {
    email_attempts: SlidingWindow<String>,
    ip_attempts: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(
            EMAIL_FAILURE_LIMIT,
            Duration::minutes(EMAIL_WINDOW_MINUTES),
            IP_ATTEMPT_LIMIT,
            Duration::minutes(IP_WINDOW_MINUTES),
        )
    }

    pub fn with_limits(
        email_limit: usize,
        email_window: Duration,
        ip_limit: usize,
        ip_window: Duration,
    ) -> Self {
        Self {
            email_attempts: SlidingWindow::new(email_limit, email_window),
            ip_attempts: SlidingWindow::new(ip_limit, ip_window),
        }
    }

    /// Admit a login attempt and count it against the IP and the email.
    ///
    /// Called before credentials are verified. A successful login clears the
    /// email's count through [`record_success`](Self::record_success).
    pub async fn check_attempt(&self, email: &str, ip: Option<IpAddr>) -> Result<(), LoginThrottle> {
        let now = Utc::now();
        let email = email.trim().to_lowercase();

        if let Some(ip) = ip {
            self.ip_attempts
                .try_acquire(&ip, now)
                .await
                .map_err(|retry_after_secs| LoginThrottle::Ip { retry_after_secs })?;
        }

        self.email_attempts
            .try_acquire(&email, now)
            .await
            .map_err(|retry_after_secs| LoginThrottle::Email { retry_after_secs })
    }

    pub async fn record_success(&self, email: &str) {
        self.email_attempts.reset(&email.trim().to_lowercase()).await;
    }

    /// Drop expired entries; returns the number of keys still tracked.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        self.email_attempts.prune(now).await + self.ip_attempts.prune(now).await
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_email_locked_after_five_attempts() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..EMAIL_FAILURE_LIMIT {
            assert!(limiter.check_attempt("Ana@Mail.test", None).await.is_ok());
        }

        let refused = limiter.check_attempt("ana@mail.test", None).await.unwrap_err();
        assert!(matches!(refused, LoginThrottle::Email { .. }));
        assert!(refused.retry_after_secs() > 0);

        // Other accounts are unaffected
        assert!(limiter.check_attempt("budi@mail.test", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_attempts() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..EMAIL_FAILURE_LIMIT {
            limiter.check_attempt("ana@mail.test", None).await.unwrap();
        }
        limiter.record_success("ana@mail.test").await;
        assert!(limiter.check_attempt("ana@mail.test", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_attempts_cannot_exceed_the_limit() {
        let limiter = Arc::new(LoginRateLimiter::new());

        let attempts = (0..20).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check_attempt("ana@mail.test", None).await })
        });
        let results = futures::future::join_all(attempts).await;

        let admitted = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(()))))
            .count();
        assert_eq!(admitted, EMAIL_FAILURE_LIMIT);
    }

    #[tokio::test]
    async fn test_ip_limited_after_ten_attempts() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::from_str("10.0.0.7").unwrap();

        for i in 0..IP_ATTEMPT_LIMIT {
            let email = format!("user{}@mail.test", i);
            assert!(limiter.check_attempt(&email, Some(ip)).await.is_ok());
        }

        let refused = limiter
            .check_attempt("another@mail.test", Some(ip))
            .await
            .unwrap_err();
        assert!(matches!(refused, LoginThrottle::Ip { .. }));

        let other_ip = IpAddr::from_str("10.0.0.8").unwrap();
        assert!(limiter.check_attempt("another@mail.test", Some(other_ip)).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let limiter = LoginRateLimiter::with_limits(
            1,
            Duration::milliseconds(50),
            100,
            Duration::milliseconds(50),
        );
        assert!(limiter.check_attempt("ana@mail.test", None).await.is_ok());
        assert!(limiter.check_attempt("ana@mail.test", None).await.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert!(limiter.check_attempt("ana@mail.test", None).await.is_ok());

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(limiter.cleanup().await, 0);
    }
}
