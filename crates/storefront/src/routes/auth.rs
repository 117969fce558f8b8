//! Authentication route handlers.
//!
//! Handles captcha issuance, registration, login, password reset and profile
//! access. The captcha correlation id travels in an `HttpOnly` cookie scoped
//! to the auth path, so client-side scripts never see it; only the rendered
//! image goes in the response body.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::AppendHeaders,
};
use serde::{Deserialize, Serialize};

use camellia_core::{Email, UserId};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::user::{ProfileUpdate, UserProfile};
use crate::services::auth::AuthService;
use crate::services::session;
use crate::state::AppState;

/// Cookie carrying the captcha correlation id.
pub const CAPTCHA_COOKIE_NAME: &str = "captcha_id";

// =============================================================================
// Request / Response Types
// =============================================================================

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

/// Registration response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: UserId,
    pub email: Email,
}

/// Login request body. The captcha correlation id is not part of the body;
/// it round-trips via the auth-path cookie.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub captcha: String,
}

/// Login response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub email: Email,
}

/// Forgot-password request body.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset-password request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Generic success message body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Captcha response body; the correlation id is only in the cookie.
#[derive(Debug, Serialize)]
pub struct CaptchaResponse {
    pub image: String,
}

/// Query parameters for reset-token validation.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// Reset-token validity response body.
#[derive(Debug, Serialize)]
pub struct TokenValidityResponse {
    pub valid: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Issue a captcha challenge.
///
/// GET /api/auth/captcha
///
/// Returns the rendered image and sets the correlation id as an `HttpOnly`
/// cookie scoped to `/api/auth`, expiring with the challenge itself.
pub async fn captcha(
    State(state): State<AppState>,
) -> (AppendHeaders<[(header::HeaderName, String); 1]>, Json<CaptchaResponse>) {
    let challenge = state.captcha().issue().await;

    let secure = if state.config().base_url.starts_with("https://") {
        "; Secure"
    } else {
        ""
    };
    let cookie = format!(
        "{CAPTCHA_COOKIE_NAME}={}; Max-Age={}; Path=/api/auth; HttpOnly; SameSite=Lax{secure}",
        challenge.id,
        state.config().captcha.ttl.as_secs(),
    );

    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(CaptchaResponse {
            image: challenge.image,
        }),
    )
}

/// Register a new account.
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let user = auth_service(&state).register(&request.email).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
        }),
    ))
}

/// Login with email, password and captcha answer.
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let captcha_id = cookie_value(&headers, CAPTCHA_COOKIE_NAME);

    let user = auth_service(&state)
        .login(
            &request.email,
            &request.password,
            captcha_id.as_deref(),
            &request.captcha,
        )
        .await?;

    let token = session::issue(&state.config().auth_token_secret, &user.email)
        .map_err(|e| AppError::Internal(format!("credential issuance failed: {e}")))?;

    Ok(Json(LoginResponse {
        token,
        email: user.email,
    }))
}

/// Request a password reset link.
///
/// POST /api/auth/forgot-password
///
/// Always answers with the same message, whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    auth_service(&state)
        .request_password_reset(&request.email)
        .await?;

    Ok(Json(MessageResponse {
        message: "If the address exists, a reset link has been sent.".to_string(),
    }))
}

/// Complete a token flow: first password after verification, or a reset.
///
/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    auth_service(&state)
        .complete_token_flow(&request.token, &request.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password updated.".to_string(),
    }))
}

/// Check whether a reset token is still usable.
///
/// GET /api/auth/reset-password/validate?token=...
pub async fn validate_reset_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenValidityResponse>> {
    let valid = auth_service(&state)
        .validate_reset_token(&query.token)
        .await?;

    Ok(Json(TokenValidityResponse { valid }))
}

/// Fetch the caller's profile.
///
/// GET /api/auth/profile
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserProfile>> {
    let profile = auth_service(&state).get_profile(&user.email).await?;
    Ok(Json(profile))
}

/// Overwrite the caller's profile.
///
/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    let profile = auth_service(&state)
        .update_profile(&user.email, &update)
        .await?;
    Ok(Json(profile))
}

fn auth_service(state: &AppState) -> AuthService<'_> {
    AuthService::new(state.pool(), state.captcha(), state.mailer(), state.config())
}

/// Extract a cookie value from request headers.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
}
