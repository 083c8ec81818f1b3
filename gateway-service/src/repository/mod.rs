//! # Repository Layer
//!
//! Typed accessors over the relational store, one repository per entity
//! area. All queries follow the same conventions:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Query Patterns                                  │
//! ├───────────────────┬─────────────────────────────────────────────────────┤
//! │ Single-use        │ UPDATE ... WHERE used = FALSE / status = 'pending'  │
//! │ Valid rows        │ WHERE revoked_at IS NULL AND expires_at > NOW()     │
//! │ Returning         │ INSERT ... RETURNING * (to get generated fields)    │
//! │ Parameterized     │ Always $1, $2 (never string interpolation)          │
//! └───────────────────┴─────────────────────────────────────────────────────┘
//! ```
//!
//! Conditional single-use updates are the serialization points required by
//! the concurrency model: the database decides races, and at most one
//! caller observes success.

pub mod api_key_repository;
pub mod application_repository;
pub mod blacklist_repository;
pub mod oauth_client_repository;
pub mod oauth_token_repository;
pub mod otp_repository;
pub mod rbac_repository;
pub mod session_repository;
pub mod user_repository;

pub use api_key_repository::ApiKeyRepository;
pub use application_repository::ApplicationRepository;
pub use blacklist_repository::BlacklistRepository;
pub use oauth_client_repository::OAuthClientRepository;
pub use oauth_token_repository::{CodeRedemption, OAuthTokenRepository, RefreshRotation};
pub use otp_repository::OtpRepository;
pub use rbac_repository::RbacRepository;
pub use session_repository::{SessionRepository, SessionRotation};
pub use user_repository::UserRepository;

use shared::errors::ApiError;

/// Translates a sqlx error, mapping unique-constraint violations to
/// `Conflict` on the named resource.
pub(crate) fn map_insert_error(e: sqlx::Error, resource: &str) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return ApiError::Conflict {
                resource: resource.to_string(),
            };
        }
    }
    ApiError::DatabaseError(e)
}

/// Maps a unique-violation constraint name to the user-facing resource
/// label, falling back to the given default.
pub(crate) fn conflict_resource(e: &sqlx::Error, mappings: &[(&str, &str)], default: &str) -> String {
    if let sqlx::Error::Database(db_err) = e {
        if let Some(constraint) = db_err.constraint() {
            for (name, label) in mappings {
                if *name == constraint {
                    return (*label).to_string();
                }
            }
        }
    }
    default.to_string()
}
