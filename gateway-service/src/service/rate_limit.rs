//! # Rate Limiter
//!
//! Sliding-window counters over the cache for the three throttled flows:
//! sign-in attempts, OTP sends, and device-code polling.
//!
//! Counters are cache-resident by design — losing them under a cache
//! restart merely resets the window, which is acceptable; the persistent
//! lockout policy covers the durable half of brute-force protection.

use std::time::Duration;

use shared::config::OtpConfig;
use shared::errors::ApiError;
use shared::redis_client::{keys, RedisClient};

/// Sign-in attempts allowed per identifier per window.
const LOGIN_ATTEMPTS_PER_WINDOW: i64 = 10;

/// Sign-in attempt window.
const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Windowed counters for login, OTP, and device polling.
#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
    otp: OtpConfig,
}

impl RateLimiter {
    /// Creates the limiter over the cache client.
    pub fn new(redis: RedisClient, otp: OtpConfig) -> Self {
        Self { redis, otp }
    }

    /// Counts a sign-in attempt for an identifier.
    ///
    /// # Errors
    ///
    /// `ApiError::RateLimited` when the window budget is exhausted.
    pub async fn check_login_attempt(&self, identifier: &str) -> Result<(), ApiError> {
        let key = keys::login_attempts(identifier);
        let count = self.redis.incr_window(&key, LOGIN_WINDOW).await?;

        if count > LOGIN_ATTEMPTS_PER_WINDOW {
            let retry_after_seconds = self
                .redis
                .ttl(&key)
                .await?
                .unwrap_or(LOGIN_WINDOW.as_secs());
            return Err(ApiError::RateLimited {
                retry_after_seconds,
            });
        }

        Ok(())
    }

    /// Counts an OTP send for `(type, identity)`.
    ///
    /// Called **before** generating a code so over-limit requests do not
    /// burn codes or delivery quota.
    pub async fn check_otp_send(&self, otp_type: &str, identity: &str) -> Result<(), ApiError> {
        let key = keys::otp_sends(otp_type, identity);
        let window = Duration::from_secs(self.otp.window_seconds);
        let count = self.redis.incr_window(&key, window).await?;

        if count > i64::from(self.otp.max_sends_per_window) {
            let retry_after_seconds =
                self.redis.ttl(&key).await?.unwrap_or(self.otp.window_seconds);
            return Err(ApiError::RateLimited {
                retry_after_seconds,
            });
        }

        Ok(())
    }

    /// Device-grant poll throttle: one poll per `interval` per device
    /// code.
    ///
    /// Returns `false` when the client polled too fast (`slow_down`). Uses
    /// `SET NX EX`, so concurrent polls race for a single slot.
    pub async fn device_poll_allowed(
        &self,
        device_code_hash: &str,
        interval: Duration,
    ) -> Result<bool, ApiError> {
        let key = keys::device_poll(device_code_hash);
        self.redis.set_nx(&key, interval).await
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
