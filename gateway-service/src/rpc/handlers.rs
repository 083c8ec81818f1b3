//! # RPC Method Handlers
//!
//! One dispatcher for `POST /rpc/v1/{Method}`: the interceptor chain runs
//! first (context → authenticate → authorize), then the method body is
//! decoded and routed. Handlers translate to service calls and back —
//! no business logic lives here.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::{AccountType, OtpIdentity, OtpType};
use crate::rpc::interceptor::AuthenticatedCall;
use crate::service::auth_service::LoginOutcome;
use crate::AppState;

// =============================================================================
// DISPATCH
// =============================================================================

/// Entry point for every RPC method.
pub async fn dispatch(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let method = path.into_inner();

    // Interceptor chain: deny-by-default happens in here, before any
    // method code can run
    let call = state.rpc_interceptor.intercept(&req, &method).await?;

    match method.as_str() {
        "ValidateToken" => validate_token(&state, &call, parse(&body)?).await,
        "IntrospectToken" | "IntrospectOAuthToken" => introspect_token(&state, parse(&body)?).await,
        "GetUser" => get_user(&state, parse(&body)?).await,
        "CheckPermission" => check_permission(&state, parse(&body)?).await,
        "GetApplicationAuthConfig" => get_application_auth_config(&state, parse(&body)?).await,
        "GetUserApplicationProfile" => get_user_application_profile(&state, parse(&body)?).await,
        "CreateUser" => create_user(&state, parse(&body)?).await,
        "Login" => login(&state, &call, parse(&body)?).await,
        "SendOTP" => send_otp(&state, &call, parse(&body)?).await,
        "VerifyOTP" => verify_otp(&state, parse(&body)?).await,
        "LoginWithOTP" => login_with_otp(&state, &call, parse(&body)?).await,
        "VerifyLoginOTP" => verify_login_otp(&state, &call, parse(&body)?).await,
        "RegisterWithOTP" | "InitPasswordlessRegistration" => {
            init_passwordless(&state, &call, parse(&body)?).await
        }
        "VerifyRegistrationOTP" | "CompletePasswordlessRegistration" => {
            complete_passwordless(&state, &call, parse(&body)?).await
        }
        "SyncUsers" => sync_users(&state, parse(&body)?).await,
        "SendEmail" => send_email(&state, parse(&body)?).await,
        "ValidateOAuthClient" => validate_oauth_client(&state, parse(&body)?).await,
        "GetOAuthClient" => get_oauth_client(&state, parse(&body)?).await,
        "CreateTokenExchange" => create_token_exchange(&state, &call, parse(&body)?).await,
        "RedeemTokenExchange" => redeem_token_exchange(&state, &call, parse(&body)?).await,
        // The interceptor already denied anything unmapped; this arm only
        // exists because match must be total
        _ => Err(ApiError::AccessDenied),
    }
}

/// Decodes a JSON request body, treating an empty body as `null`.
fn parse<T: serde::de::DeserializeOwned>(body: &web::Bytes) -> Result<T, ApiError> {
    let slice: &[u8] = if body.is_empty() { b"null" } else { body };
    serde_json::from_slice(slice).map_err(|e| ApiError::BadRequest {
        message: format!("Malformed request body: {}", e),
    })
}

/// Application scope of the caller, required for exchange operations.
fn caller_application(call: &AuthenticatedCall) -> Result<Uuid, ApiError> {
    call.identity.application_id().ok_or(ApiError::AccessDenied)
}

// =============================================================================
// TOKEN METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateTokenRequest {
    token: String,
    application_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateTokenResponse {
    valid: bool,
    user_id: Uuid,
    email: String,
    username: String,
    roles: Vec<String>,
    is_active: bool,
    application_id: Option<Uuid>,
    expires_at: i64,
}

/// Validates an access token: signature, expiry, blacklist, and tenant
/// binding against the explicit or context application.
async fn validate_token(
    state: &AppState,
    call: &AuthenticatedCall,
    body: ValidateTokenRequest,
) -> Result<HttpResponse, ApiError> {
    let context_app = body
        .application_id
        .or(call.context.client.application_id)
        .or_else(|| call.identity.application_id());

    let claims = state.token_service.validate_access(&body.token, context_app).await?;

    Ok(HttpResponse::Ok().json(ValidateTokenResponse {
        valid: true,
        user_id: claims.sub,
        email: claims.email,
        username: claims.username,
        roles: claims.roles,
        is_active: claims.is_active,
        application_id: claims.application_id,
        expires_at: claims.exp,
    }))
}

#[derive(Debug, Deserialize)]
struct IntrospectRequest {
    token: String,
}

/// RFC 7662 introspection over the RPC surface.
async fn introspect_token(
    state: &AppState,
    body: IntrospectRequest,
) -> Result<HttpResponse, ApiError> {
    let response = state.oauth_service.introspect(&body.token).await?;
    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// DIRECTORY METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUserRequest {
    user_id: Uuid,
}

async fn get_user(state: &AppState, body: GetUserRequest) -> Result<HttpResponse, ApiError> {
    let user = state
        .user_repository
        .find_by_id(body.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("user:{}", body.user_id),
        })?;

    Ok(HttpResponse::Ok().json(crate::domain::UserProfile::from(user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    email: String,
    username: String,
    password: Option<String>,
    phone: Option<String>,
    #[serde(default)]
    account_type: Option<AccountType>,
}

async fn create_user(state: &AppState, body: CreateUserRequest) -> Result<HttpResponse, ApiError> {
    let profile = state
        .auth_service
        .create_user(
            &body.email,
            &body.username,
            body.password.as_deref(),
            body.phone,
            body.account_type.unwrap_or(AccountType::Human),
        )
        .await?;

    Ok(HttpResponse::Created().json(profile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncUsersRequest {
    users: Vec<SyncUserEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncUserEntry {
    email: String,
    username: String,
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncUsersResponse {
    created: u64,
    skipped: u64,
}

/// Bulk directory import: creates missing accounts, skips existing ones.
async fn sync_users(state: &AppState, body: SyncUsersRequest) -> Result<HttpResponse, ApiError> {
    let mut created = 0u64;
    let mut skipped = 0u64;

    for entry in body.users {
        match state
            .auth_service
            .create_user(&entry.email, &entry.username, None, entry.phone, AccountType::Human)
            .await
        {
            Ok(_) => created += 1,
            Err(ApiError::Conflict { .. }) => skipped += 1,
            Err(e) => return Err(e),
        }
    }

    Ok(HttpResponse::Ok().json(SyncUsersResponse { created, skipped }))
}

// =============================================================================
// RBAC & TENANCY METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckPermissionRequest {
    user_id: Uuid,
    resource: String,
    action: String,
    application_id: Option<Uuid>,
}

async fn check_permission(
    state: &AppState,
    body: CheckPermissionRequest,
) -> Result<HttpResponse, ApiError> {
    let allowed = state
        .rbac_service
        .check_permission(body.user_id, &body.resource, &body.action, body.application_id)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "allowed": allowed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationIdRequest {
    application_id: Uuid,
}

async fn get_application_auth_config(
    state: &AppState,
    body: ApplicationIdRequest,
) -> Result<HttpResponse, ApiError> {
    let config = state.application_service.auth_config(body.application_id).await?;
    Ok(HttpResponse::Ok().json(config))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserApplicationProfileRequest {
    user_id: Uuid,
    application_id: Uuid,
}

async fn get_user_application_profile(
    state: &AppState,
    body: UserApplicationProfileRequest,
) -> Result<HttpResponse, ApiError> {
    let profile = state
        .application_service
        .get_or_create_profile(body.user_id, body.application_id)
        .await?;

    Ok(HttpResponse::Ok().json(profile))
}

// =============================================================================
// AUTHENTICATION METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    identifier: String,
    password: String,
    application_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    requires_2fa: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    two_factor_token: Option<String>,
    #[serde(flatten)]
    auth: Option<crate::service::auth_service::AuthResponse>,
}

async fn login(
    state: &AppState,
    call: &AuthenticatedCall,
    body: LoginRequest,
) -> Result<HttpResponse, ApiError> {
    let application_id = body.application_id.or(call.context.client.application_id);

    let outcome = state
        .auth_service
        .login(&body.identifier, &body.password, &call.context.device, application_id)
        .await?;

    let response = match outcome {
        LoginOutcome::Success(auth) => LoginResponse {
            requires_2fa: false,
            two_factor_token: None,
            auth: Some(*auth),
        },
        LoginOutcome::TwoFactorRequired { two_factor_token } => LoginResponse {
            requires_2fa: true,
            two_factor_token: Some(two_factor_token),
            auth: None,
        },
    };

    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// OTP METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtpIdentityRequest {
    email: Option<String>,
    phone: Option<String>,
}

impl OtpIdentityRequest {
    fn identity(&self) -> Result<OtpIdentity, ApiError> {
        match (&self.email, &self.phone) {
            (Some(e), None) => Ok(OtpIdentity::Email(shared::validation::normalize_email(e))),
            (None, Some(p)) => Ok(OtpIdentity::Phone(shared::validation::normalize_phone(p)?)),
            _ => Err(ApiError::BadRequest {
                message: "Exactly one of email or phone is required".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendOtpRequest {
    #[serde(flatten)]
    identity: OtpIdentityRequest,
    otp_type: String,
}

async fn send_otp(
    state: &AppState,
    call: &AuthenticatedCall,
    body: SendOtpRequest,
) -> Result<HttpResponse, ApiError> {
    let otp_type = OtpType::parse(&body.otp_type).ok_or_else(|| ApiError::BadRequest {
        message: format!("Unknown otp type {}", body.otp_type),
    })?;

    state
        .otp_service
        .send(&body.identity.identity()?, otp_type, call.context.client.application_id)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "sent": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyOtpRequest {
    #[serde(flatten)]
    identity: OtpIdentityRequest,
    otp_type: String,
    code: String,
}

async fn verify_otp(state: &AppState, body: VerifyOtpRequest) -> Result<HttpResponse, ApiError> {
    let otp_type = OtpType::parse(&body.otp_type).ok_or_else(|| ApiError::BadRequest {
        message: format!("Unknown otp type {}", body.otp_type),
    })?;

    state
        .otp_service
        .verify(&body.identity.identity()?, otp_type, &body.code)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "verified": true })))
}

/// Starts a passwordless sign-in: sends a login OTP when the identity
/// belongs to an active account. The response never reveals whether it
/// does.
async fn login_with_otp(
    state: &AppState,
    call: &AuthenticatedCall,
    body: OtpIdentityRequest,
) -> Result<HttpResponse, ApiError> {
    let identity = body.identity()?;

    let user = match &identity {
        OtpIdentity::Email(e) => state.user_repository.find_by_email(e).await?,
        OtpIdentity::Phone(p) => state.user_repository.find_by_phone(p).await?,
    };

    if user.is_some_and(|u| u.is_active) {
        state
            .otp_service
            .send(&identity, OtpType::Login, call.context.client.application_id)
            .await?;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "sent": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyLoginOtpRequest {
    identifier: String,
    code: String,
}

/// Completes a passwordless sign-in.
async fn verify_login_otp(
    state: &AppState,
    call: &AuthenticatedCall,
    body: VerifyLoginOtpRequest,
) -> Result<HttpResponse, ApiError> {
    let identity = match shared::validation::classify_identifier(&body.identifier)? {
        shared::validation::LoginIdentifier::Email(e) => OtpIdentity::Email(e),
        shared::validation::LoginIdentifier::Phone(p) => OtpIdentity::Phone(p),
        shared::validation::LoginIdentifier::Username(_) => {
            return Err(ApiError::InvalidCredentials)
        }
    };

    state
        .otp_service
        .verify(&identity, OtpType::Login, &body.code)
        .await?;

    let user = match &identity {
        OtpIdentity::Email(e) => state.user_repository.find_by_email(e).await?,
        OtpIdentity::Phone(p) => state.user_repository.find_by_phone(p).await?,
    }
    .filter(|u| u.is_active)
    .ok_or(ApiError::InvalidCredentials)?;

    let response = state
        .auth_service
        .issue_for(&user, call.context.client.application_id, &call.context.device)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitPasswordlessRequest {
    email: Option<String>,
    phone: Option<String>,
    username: String,
}

async fn init_passwordless(
    state: &AppState,
    call: &AuthenticatedCall,
    body: InitPasswordlessRequest,
) -> Result<HttpResponse, ApiError> {
    state
        .auth_service
        .passwordless_init(
            body.email,
            body.phone,
            &body.username,
            call.context.client.application_id,
        )
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "sent": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletePasswordlessRequest {
    identifier: String,
    code: String,
}

async fn complete_passwordless(
    state: &AppState,
    call: &AuthenticatedCall,
    body: CompletePasswordlessRequest,
) -> Result<HttpResponse, ApiError> {
    let response = state
        .auth_service
        .passwordless_complete(&body.identifier, &body.code, &call.context.device)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// MESSAGING METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest {
    application_id: Option<Uuid>,
    to: String,
    subject: String,
    body: String,
}

async fn send_email(state: &AppState, body: SendEmailRequest) -> Result<HttpResponse, ApiError> {
    state
        .messaging_service
        .send_raw_email(body.application_id, &body.to, &body.subject, &body.body)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "sent": true })))
}

// =============================================================================
// OAUTH CLIENT METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateOAuthClientRequest {
    client_id: String,
    client_secret: Option<String>,
}

async fn validate_oauth_client(
    state: &AppState,
    body: ValidateOAuthClientRequest,
) -> Result<HttpResponse, ApiError> {
    let client = state
        .oauth_client_repository
        .find_by_client_id(&body.client_id)
        .await?
        .filter(|c| c.is_active)
        .ok_or(ApiError::InvalidCredentials)?;

    if let Some(secret) = &body.client_secret {
        let valid = client
            .client_secret_hash
            .as_deref()
            .is_some_and(|stored| state.token_service.hasher().verify(secret, stored));
        if !valid {
            return Err(ApiError::InvalidCredentials);
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "valid": true,
        "clientType": client.client_type,
        "applicationId": client.application_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetOAuthClientRequest {
    client_id: String,
}

async fn get_oauth_client(
    state: &AppState,
    body: GetOAuthClientRequest,
) -> Result<HttpResponse, ApiError> {
    let client = state
        .oauth_client_repository
        .find_by_client_id(&body.client_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("oauth_client:{}", body.client_id),
        })?;

    // Public metadata only: the secret hash never leaves the gateway
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "clientId": client.client_id,
        "applicationId": client.application_id,
        "clientType": client.client_type,
        "redirectUris": client.redirect_uris.0,
        "allowedGrantTypes": client.allowed_grant_types.0,
        "allowedScopes": client.allowed_scopes.0,
        "requirePkce": client.require_pkce,
        "requireConsent": client.require_consent,
        "firstParty": client.first_party,
        "isActive": client.is_active,
    })))
}

// =============================================================================
// TOKEN EXCHANGE METHODS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExchangeRequest {
    access_token: String,
    target_application_id: Uuid,
}

async fn create_token_exchange(
    state: &AppState,
    call: &AuthenticatedCall,
    body: CreateExchangeRequest,
) -> Result<HttpResponse, ApiError> {
    // The source application comes from the authenticated context, never
    // from the body
    let source_app_id = caller_application(call)?;

    let exchange = state
        .token_exchange_service
        .create_exchange(&body.access_token, body.target_application_id, source_app_id)
        .await?;

    Ok(HttpResponse::Ok().json(exchange))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemExchangeRequest {
    code: String,
}

async fn redeem_token_exchange(
    state: &AppState,
    call: &AuthenticatedCall,
    body: RedeemExchangeRequest,
) -> Result<HttpResponse, ApiError> {
    let redeeming_app_id = caller_application(call)?;

    let response = state
        .token_exchange_service
        .redeem_exchange(&body.code, redeeming_app_id, &call.context.device)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_empty_body_for_nullable() {
        let body = web::Bytes::new();
        let parsed: Option<IntrospectRequest> = parse(&body).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let body = web::Bytes::from_static(b"{not json");
        let result: Result<IntrospectRequest, _> = parse(&body);
        assert!(matches!(result, Err(ApiError::BadRequest { .. })));
    }

    #[test]
    fn test_otp_identity_request_exclusivity() {
        let both = OtpIdentityRequest {
            email: Some("a@example.com".to_string()),
            phone: Some("+15551234567".to_string()),
        };
        assert!(both.identity().is_err());

        let neither = OtpIdentityRequest {
            email: None,
            phone: None,
        };
        assert!(neither.identity().is_err());

        let email = OtpIdentityRequest {
            email: Some("A@Example.com".to_string()),
            phone: None,
        };
        assert_eq!(
            email.identity().unwrap(),
            OtpIdentity::Email("a@example.com".to_string())
        );
    }
}
