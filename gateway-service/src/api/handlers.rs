//! # First-Party Request Handlers
//!
//! HTTP handlers bridging the public surface with the service layer.
//! Each handler follows the same pattern:
//!
//! 1. **Extract** request data using actix extractors
//! 2. **Validate** input via the `validator` derive
//! 3. **Call** the service layer
//! 4. **Translate** the result to an HTTP response
//!
//! Protected endpoints authenticate a Bearer access token through the
//! token service (signature + blacklist + tenant binding) before touching
//! anything else.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shared::auth::jwt::{Claims, JwtService};
use shared::errors::ApiError;
use shared::validation;

use crate::api::dto::{
    ChangePasswordRequest, HealthResponse, LoginRequest, LoginResponseDto, LogoutAllRequest,
    LogoutRequest, MessageResponse, PasswordlessCompleteRequest, PasswordlessInitRequest,
    RefreshTokenRequest, RegisterRequest, SessionDto, TwoFactorRequest,
};
use crate::domain::DeviceInfo;
use crate::rpc::context;
use crate::service::auth_service::LoginOutcome;
use crate::AppState;

// =============================================================================
// HELPERS
// =============================================================================

/// Authenticates the request's Bearer access token.
async fn authenticate(req: &HttpRequest, state: &AppState) -> Result<Claims, ApiError> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingAuth)?;

    let token = JwtService::extract_from_header(header)?;
    state.token_service.validate_access(token, None).await
}

/// Device context for session bookkeeping.
fn device_of(req: &HttpRequest) -> DeviceInfo {
    context::extract(req).device
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

/// `GET /health` — liveness for load balancers and monitors.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let db_ok = shared::database::health_check(&state.db_pool).await.is_ok();
    let redis_ok = state.redis.ping().await.is_ok();

    let response = HealthResponse {
        status: if db_ok && redis_ok {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        service: state.service_name.clone(),
        timestamp: Utc::now().to_rfc3339(),
    };

    HttpResponse::Ok().json(response)
}

// =============================================================================
// REGISTRATION & LOGIN
// =============================================================================

/// `POST /api/v1/auth/register`
///
/// Responses: 201 Created | 400 validation | 409 email/username taken.
pub async fn register(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .register(
            &body.email,
            &body.username,
            &body.password,
            body.phone,
            &device_of(&req),
            None,
        )
        .await?;

    Ok(HttpResponse::Created().json(response))
}

/// `POST /api/v1/auth/login`
///
/// Responses: 200 (tokens, or `requires2fa=true`) | 401 bad credentials |
/// 423 locked | 429 throttled.
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let outcome = state
        .auth_service
        .login(&body.identifier, &body.password, &device_of(&req), body.application_id)
        .await?;

    let dto = match outcome {
        LoginOutcome::Success(auth) => LoginResponseDto {
            requires_2fa: false,
            two_factor_token: None,
            auth: Some(*auth),
        },
        LoginOutcome::TwoFactorRequired { two_factor_token } => LoginResponseDto {
            requires_2fa: true,
            two_factor_token: Some(two_factor_token),
            auth: None,
        },
    };

    Ok(HttpResponse::Ok().json(dto))
}

/// `POST /api/v1/auth/login/2fa` — completes a 2FA-gated sign-in.
pub async fn login_two_factor(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<TwoFactorRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .login_two_factor(&body.two_factor_token, &body.totp_code, &device_of(&req))
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// PASSWORDLESS REGISTRATION
// =============================================================================

/// `POST /api/v1/auth/passwordless/init`
pub async fn passwordless_init(
    state: web::Data<AppState>,
    body: web::Json<PasswordlessInitRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .auth_service
        .passwordless_init(body.email, body.phone, &body.username, body.application_id)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

/// `POST /api/v1/auth/passwordless/complete`
pub async fn passwordless_complete(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PasswordlessCompleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .passwordless_complete(&body.identifier, &body.code, &device_of(&req))
        .await?;

    Ok(HttpResponse::Created().json(response))
}

// =============================================================================
// TOKEN LIFECYCLE
// =============================================================================

/// `POST /api/v1/auth/refresh` — rotation; reusing an old token revokes
/// the session family.
pub async fn refresh_token(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .refresh(&body.refresh_token, &device_of(&req))
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// `POST /api/v1/auth/logout` — revokes the presented session and
/// blacklists its paired access token.
pub async fn logout(
    state: web::Data<AppState>,
    body: web::Json<LogoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.auth_service.logout(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Signed out".to_string(),
    }))
}

/// `POST /api/v1/auth/logout-all` — revokes every session, optionally
/// sparing the current one.
pub async fn logout_all(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: Option<web::Json<LogoutAllRequest>>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;
    let except = body.map(|b| b.into_inner()).unwrap_or_default().except_session_id;

    let revoked = state.auth_service.logout_all(claims.sub, except).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Signed out everywhere",
        "sessionsRevoked": revoked,
    })))
}

// =============================================================================
// PASSWORD CHANGE
// =============================================================================

/// `POST /api/v1/auth/password/change` — authenticated; refuses recent
/// passwords and revokes all sessions on success.
pub async fn change_password(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .auth_service
        .change_password(claims.sub, &body.current_password, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Password changed; sign in again".to_string(),
    }))
}

// =============================================================================
// API KEYS (self-service)
// =============================================================================

/// `POST /api/v1/auth/api-keys` — issues a key; the plaintext appears in
/// this response and nowhere else, ever.
pub async fn create_api_key(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<crate::api::dto::CreateApiKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let issued = state
        .api_key_service
        .issue(
            claims.sub,
            body.application_id,
            &body.name,
            body.scopes,
            body.expires_at,
        )
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "apiKey": issued.plaintext,
        "key": crate::api::dto::ApiKeyDto::from(issued.api_key),
    })))
}

/// `GET /api/v1/auth/api-keys` — lists the caller's keys.
pub async fn list_api_keys(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;

    let keys: Vec<crate::api::dto::ApiKeyDto> = state
        .api_key_service
        .list(claims.sub)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(HttpResponse::Ok().json(keys))
}

/// `DELETE /api/v1/auth/api-keys/{id}` — revokes (deactivates) a key.
pub async fn revoke_api_key(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;

    state
        .api_key_service
        .revoke(path.into_inner(), claims.sub)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "API key revoked".to_string(),
    }))
}

// =============================================================================
// TOTP ENROLLMENT
// =============================================================================

/// `POST /api/v1/auth/2fa/setup` — starts TOTP enrollment.
///
/// Returns the base32 secret and the `otpauth://` URI exactly once; the
/// stored copy is encrypted at rest.
pub async fn totp_setup(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;

    let (secret, provisioning_uri) = state.auth_service.totp_setup(claims.sub).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "secret": secret,
        "provisioningUri": provisioning_uri,
    })))
}

/// `POST /api/v1/auth/2fa/enable` — proves possession and flips
/// `totp_enabled`.
pub async fn totp_enable(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<crate::api::dto::TotpEnableRequest>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.auth_service.totp_enable(claims.sub, &body.code).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Two-factor authentication enabled".to_string(),
    }))
}

// =============================================================================
// PROFILE & SESSIONS
// =============================================================================

/// `GET /api/v1/auth/me` — the authenticated profile.
pub async fn get_profile(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("user:{}", claims.sub),
        })?;

    Ok(HttpResponse::Ok().json(crate::domain::UserProfile::from(user)))
}

/// `GET /api/v1/auth/sessions` — active sessions + aggregate stats.
pub async fn list_sessions(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;

    let sessions = state.session_service.list(claims.sub).await?;
    let stats = state.session_service.stats(claims.sub).await?;

    let sessions: Vec<SessionDto> = sessions.into_iter().map(SessionDto::from).collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "sessions": sessions,
        "stats": stats,
    })))
}

/// `DELETE /api/v1/auth/sessions/{id}` — revokes one session.
pub async fn revoke_session(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ApiError> {
    let claims = authenticate(&req, &state).await?;

    state
        .session_service
        .revoke(path.into_inner(), claims.sub)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Session revoked".to_string(),
    }))
}
