//! # RPC Interceptor Chain
//!
//! Authentication and authorization for every inbound RPC:
//!
//! 1. **Extract context** — [`crate::rpc::context::extract`]
//! 2. **Authenticate** — credential from `x-api-key` or
//!    `Authorization: Bearer`; classified **by prefix before any lookup**
//!    (`agw_` = user API key, `app_` = application secret, anything else
//!    is rejected without touching the database)
//! 3. **Authorize** — the static allow-list in
//!    [`crate::rpc::scope_map`], deny by default
//!
//! Panic recovery and request logging ride on the actix middleware stack
//! configured in `main.rs`; this module owns steps 2 and 3.

use actix_web::HttpRequest;
use shared::crypto::{API_KEY_PREFIX, APP_SECRET_PREFIX};
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::{ApiKey, Application};
use crate::repository::UserRepository;
use crate::rpc::context::{self, RequestContext};
use crate::rpc::scope_map;
use crate::service::{ApiKeyService, ApplicationService};

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// Who authenticated on this call.
#[derive(Debug, Clone)]
pub enum CallerIdentity {
    /// User-bound API key (`agw_`): scope-checked per method.
    ApiKey {
        /// The key's owner
        user_id: Uuid,
        /// Owner's email, carried in the call context
        email: String,
        /// The validated key row
        api_key: Box<ApiKey>,
    },
    /// Application secret (`app_`): machine-bound, scope-restricted.
    Application {
        /// The authenticated tenant
        application: Box<Application>,
    },
}

impl CallerIdentity {
    /// The application the caller acts for, when any.
    pub fn application_id(&self) -> Option<Uuid> {
        match self {
            Self::ApiKey { api_key, .. } => api_key.application_id,
            Self::Application { application } => Some(application.application_id),
        }
    }
}

/// Fully authenticated call context handed to method handlers.
#[derive(Debug, Clone)]
pub struct AuthenticatedCall {
    /// Extracted request metadata
    pub context: RequestContext,
    /// The authenticated caller
    pub identity: CallerIdentity,
}

// =============================================================================
// INTERCEPTOR
// =============================================================================

/// The authentication/authorization half of the interceptor chain.
#[derive(Clone)]
pub struct RpcInterceptor {
    api_keys: ApiKeyService,
    applications: ApplicationService,
    users: UserRepository,
}

impl RpcInterceptor {
    /// Creates the interceptor over its collaborators.
    pub fn new(
        api_keys: ApiKeyService,
        applications: ApplicationService,
        users: UserRepository,
    ) -> Self {
        Self {
            api_keys,
            applications,
            users,
        }
    }

    /// Runs extraction + authentication + method authorization.
    pub async fn intercept(
        &self,
        req: &HttpRequest,
        method: &str,
    ) -> Result<AuthenticatedCall, ApiError> {
        let context = context::extract(req);
        let identity = self.authenticate(req).await?;
        self.authorize(&identity, method)?;

        Ok(AuthenticatedCall { context, identity })
    }

    // =========================================================================
    // AUTHENTICATE
    // =========================================================================

    /// Reads and classifies the credential.
    ///
    /// Classification happens **before** any database lookup so an
    /// attacker cannot use lookup latency to probe credential kinds.
    async fn authenticate(&self, req: &HttpRequest) -> Result<CallerIdentity, ApiError> {
        let credential = extract_credential(req).ok_or(ApiError::MissingAuth)?;

        if credential.starts_with(APP_SECRET_PREFIX) {
            let application = self.applications.resolve_by_secret(&credential).await?;
            return Ok(CallerIdentity::Application {
                application: Box::new(application),
            });
        }

        if credential.starts_with(API_KEY_PREFIX) {
            let api_key = self.api_keys.validate(&credential).await?;
            let email = self
                .users
                .find_by_id(api_key.user_id)
                .await?
                .filter(|u| u.is_active)
                .map(|u| u.email)
                .ok_or(ApiError::InvalidCredentials)?;

            return Ok(CallerIdentity::ApiKey {
                user_id: api_key.user_id,
                email,
                api_key: Box::new(api_key),
            });
        }

        // Unknown prefix: rejected without a lookup
        Err(ApiError::InvalidCredentials)
    }

    // =========================================================================
    // AUTHORIZE
    // =========================================================================

    /// Deny-by-default method authorization.
    fn authorize(&self, identity: &CallerIdentity, method: &str) -> Result<(), ApiError> {
        // An unmapped method is refused for everyone, wildcard keys
        // included
        let Some(scope) = scope_map::required_scope(method) else {
            return Err(ApiError::AccessDenied);
        };

        match identity {
            CallerIdentity::ApiKey { api_key, .. } => {
                if !api_key.has_scope(scope) {
                    return Err(ApiError::InsufficientScope {
                        required: scope.to_string(),
                    });
                }
            }
            CallerIdentity::Application { application } => {
                if !application.allows_rpc_scope(scope) {
                    return Err(ApiError::InsufficientScope {
                        required: scope.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Credential from `x-api-key` or `Authorization: Bearer ...`.
fn extract_credential(req: &HttpRequest) -> Option<String> {
    if let Some(value) = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(value.to_string());
    }

    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl std::fmt::Debug for RpcInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcInterceptor").finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_credential_from_x_api_key() {
        let req = TestRequest::default()
            .insert_header(("x-api-key", "agw_abc"))
            .to_http_request();
        assert_eq!(extract_credential(&req).as_deref(), Some("agw_abc"));
    }

    #[test]
    fn test_credential_from_bearer() {
        let req = TestRequest::default()
            .insert_header(("authorization", "Bearer app_xyz"))
            .to_http_request();
        assert_eq!(extract_credential(&req).as_deref(), Some("app_xyz"));
    }

    #[test]
    fn test_x_api_key_wins_over_bearer() {
        let req = TestRequest::default()
            .insert_header(("x-api-key", "agw_abc"))
            .insert_header(("authorization", "Bearer app_xyz"))
            .to_http_request();
        assert_eq!(extract_credential(&req).as_deref(), Some("agw_abc"));
    }

    #[test]
    fn test_no_credential() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(extract_credential(&req), None);

        let req = TestRequest::default()
            .insert_header(("authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(extract_credential(&req), None);
    }
}
