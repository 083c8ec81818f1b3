//! # Redis Client for Cache-Resident State
//!
//! High-level Redis client for the gateway's TTL'd state: the access-token
//! blacklist, pending registrations, OTP send counters, device-code poll
//! throttles, token-exchange codes, and 2FA challenge tokens.
//!
//! ## Cache vs. Database Authority
//!
//! The database is authoritative for everything except the state listed
//! below, which lives only here because its lifetime is shorter than the
//! cache TTL and losing it is acceptable (the user re-initiates the flow):
//!
//! | Key Pattern | Value | TTL |
//! |---------|---------|-----|
//! | `blacklist:token:{jti}` | marker | remaining access-token lifetime |
//! | `reg:{identifier}` | pending registration blob | OTP lifetime |
//! | `otp:sends:{type}:{identity}` | send counter | rate-limit window |
//! | `device:poll:{device_code_hash}` | poll marker | poll interval |
//! | `exchange:{code}` | `{user_id, source_app_id, target_app_id}` | 60 s |
//! | `2fa:{token}` | challenged user id | 5 min |
//!
//! ## Connection Management
//!
//! We use a `ConnectionManager` which automatically reconnects on failure.
//! This is more resilient than a simple connection for long-running
//! services.
//!
//! ## Atomicity
//!
//! Single-use semantics ride on Redis primitives, not transactions:
//! `GETDEL` for one-shot codes, `SET NX EX` for poll throttles, `INCR` +
//! `EXPIRE` for windowed counters.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::redis_client::RedisClient;
//! use std::time::Duration;
//!
//! let redis = RedisClient::new(&config.redis).await?;
//!
//! // Single-use token exchange code
//! redis.set("exchange:abc", &payload, Some(Duration::from_secs(60))).await?;
//! let taken: Option<ExchangePayload> = redis.get_del("exchange:abc").await?;
//! ```

use crate::config::RedisConfig;
use crate::errors::ApiError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

// =============================================================================
// Redis Client
// =============================================================================

/// Async Redis client with automatic reconnection.
///
/// This client wraps a `ConnectionManager` which handles connection
/// failures automatically. It's safe to clone and share across tasks.
///
/// ## Thread Safety
///
/// The client is `Clone + Send + Sync`. Cloning is cheap (just an Arc
/// clone). Each operation uses an async connection from the manager.
#[derive(Clone)]
pub struct RedisClient {
    /// Connection manager for automatic reconnection
    conn: ConnectionManager,
}

impl RedisClient {
    /// Creates a new Redis client and establishes connection.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::RedisError` if the URL is invalid, the server is
    /// unreachable, or authentication fails.
    pub async fn new(config: &RedisConfig) -> Result<Self, ApiError> {
        info!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str()).map_err(ApiError::RedisError)?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(ApiError::RedisError)?;

        info!("Redis connection established");

        Ok(Self { conn })
    }

    // =========================================================================
    // Basic Operations
    // =========================================================================

    /// Stores a value with optional TTL.
    ///
    /// The value is serialized to JSON before storage.
    pub async fn set<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), ApiError> {
        let serialized = serde_json::to_string(value).map_err(|e| ApiError::InternalError {
            message: e.to_string(),
        })?;

        let mut conn = self.conn.clone();

        match ttl {
            Some(duration) => {
                conn.set_ex::<_, _, ()>(key, &serialized, duration.as_secs())
                    .await
                    .map_err(ApiError::RedisError)?;
            }
            None => {
                conn.set::<_, _, ()>(key, &serialized)
                    .await
                    .map_err(ApiError::RedisError)?;
            }
        }

        Ok(())
    }

    /// Retrieves and deserializes a value.
    ///
    /// ## Returns
    ///
    /// - `Ok(Some(value))` - Key exists and was deserialized
    /// - `Ok(None)` - Key doesn't exist
    pub async fn get<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ApiError> {
        let mut conn = self.conn.clone();

        let value: Option<String> = conn.get(key).await.map_err(ApiError::RedisError)?;

        match value {
            Some(s) => {
                let deserialized =
                    serde_json::from_str(&s).map_err(|e| ApiError::InternalError {
                        message: e.to_string(),
                    })?;
                Ok(Some(deserialized))
            }
            None => Ok(None),
        }
    }

    /// Atomically reads and deletes a value (`GETDEL`).
    ///
    /// The backbone of single-use cache codes: concurrent redemptions of
    /// the same key collapse to at most one `Some`.
    pub async fn get_del<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ApiError> {
        let mut conn = self.conn.clone();

        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;

        match value {
            Some(s) => {
                let deserialized =
                    serde_json::from_str(&s).map_err(|e| ApiError::InternalError {
                        message: e.to_string(),
                    })?;
                Ok(Some(deserialized))
            }
            None => Ok(None),
        }
    }

    /// Sets a key only if it does not exist (`SET NX EX`).
    ///
    /// ## Returns
    ///
    /// - `true` - Key was created (caller acquired the slot)
    /// - `false` - Key already present (e.g. device poll arrived too fast)
    pub async fn set_nx(&self, key: &str, ttl: Duration) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;

        Ok(result.is_some())
    }

    /// Deletes a key.
    ///
    /// ## Returns
    ///
    /// - `true` - Key was deleted
    /// - `false` - Key didn't exist
    pub async fn delete(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await.map_err(ApiError::RedisError)?;
        Ok(deleted > 0)
    }

    /// Checks if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(ApiError::RedisError)
    }

    /// Increments a counter (atomic operation).
    ///
    /// Creates the key with value 1 if it doesn't exist.
    pub async fn incr(&self, key: &str) -> Result<i64, ApiError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(ApiError::RedisError)
    }

    /// Sets TTL on an existing key.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl.as_secs() as i64)
            .await
            .map_err(ApiError::RedisError)
    }

    /// Remaining TTL of a key in seconds.
    ///
    /// ## Returns
    ///
    /// - `Some(secs)` - Key exists with a TTL
    /// - `None` - Key missing or has no expiry
    pub async fn ttl(&self, key: &str) -> Result<Option<u64>, ApiError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;

        // -2 = missing key, -1 = no expiry
        Ok(if ttl >= 0 { Some(ttl as u64) } else { None })
    }

    /// Health check - verifies Redis is responding.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;
        Ok(())
    }

    // =========================================================================
    // Windowed Counters (rate limiting)
    // =========================================================================

    /// Increments a windowed counter, starting the window on first hit.
    ///
    /// Used for OTP send limits and login attempt throttling:
    ///
    /// ```rust,ignore
    /// let count = redis
    ///     .incr_window("otp:sends:login:alice@example.com", window)
    ///     .await?;
    /// if count > max_sends {
    ///     return Err(ApiError::RateLimited { retry_after_seconds });
    /// }
    /// ```
    pub async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, ApiError> {
        let count = self.incr(key).await?;

        // First hit opens the window; it closes on its own via TTL
        if count == 1 {
            self.expire(key, window).await?;
        }

        Ok(count)
    }

    // =========================================================================
    // Token Blacklist
    // =========================================================================

    /// Adds an access token's `jti` to the blacklist.
    ///
    /// ## Parameters
    ///
    /// - `jti`: The JWT ID claim from the token
    /// - `ttl`: Should match the token's remaining lifetime — after natural
    ///   expiry the signature check rejects it anyway.
    pub async fn blacklist_token(&self, jti: &str, ttl: Duration) -> Result<(), ApiError> {
        let key = format!("blacklist:token:{}", jti);
        self.set(&key, &true, Some(ttl)).await
    }

    /// Checks if a token's `jti` is blacklisted.
    ///
    /// Called from every token validation path (`ValidateToken`,
    /// introspection, handler guards).
    pub async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, ApiError> {
        let key = format!("blacklist:token:{}", jti);
        self.exists(&key).await
    }
}

// Hide internal state in Debug output
impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}

// =============================================================================
// Key Builders
// =============================================================================

/// Namespaced cache key builders.
///
/// Every cache-resident flow builds its keys here so the namespace table in
/// the module docs stays true.
pub mod keys {
    /// Pending passwordless registration blob.
    pub fn pending_registration(identifier: &str) -> String {
        format!("reg:{}", identifier)
    }

    /// OTP send counter per (type, identity).
    pub fn otp_sends(otp_type: &str, identity: &str) -> String {
        format!("otp:sends:{}:{}", otp_type, identity)
    }

    /// Device-code poll throttle marker.
    pub fn device_poll(device_code_hash: &str) -> String {
        format!("device:poll:{}", device_code_hash)
    }

    /// Cross-application token exchange code.
    pub fn exchange(code: &str) -> String {
        format!("exchange:{}", code)
    }

    /// Pending 2FA challenge token.
    pub fn two_factor(token: &str) -> String {
        format!("2fa:{}", token)
    }

    /// Login attempt counter per identifier.
    pub fn login_attempts(identifier: &str) -> String {
        format!("login:attempts:{}", identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn test_key_namespaces_are_stable() {
        assert_eq!(
            keys::pending_registration("alice@example.com"),
            "reg:alice@example.com"
        );
        assert_eq!(
            keys::otp_sends("registration", "alice@example.com"),
            "otp:sends:registration:alice@example.com"
        );
        assert_eq!(keys::device_poll("abcd"), "device:poll:abcd");
        assert_eq!(keys::exchange("c0de"), "exchange:c0de");
        assert_eq!(keys::two_factor("t0k"), "2fa:t0k");
        assert_eq!(
            keys::login_attempts("alice@example.com"),
            "login:attempts:alice@example.com"
        );
    }
}
