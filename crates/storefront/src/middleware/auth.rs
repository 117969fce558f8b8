//! Authentication extractor.
//!
//! Route handlers that need the caller's identity take [`RequireAuth`], which
//! verifies the `Authorization: Bearer` credential and resolves the account.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use camellia_core::Email;

use crate::db::users::UserRepository;
use crate::models::user::CurrentUser;
use crate::services::session;
use crate::state::AppState;

/// Extractor that requires a valid bearer credential.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Rejection returned when the bearer credential is missing or invalid.
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "authentication required" })),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthRejection)?;

        let token = header.strip_prefix("Bearer ").ok_or(AuthRejection)?;

        let claims = session::verify(&state.config().auth_token_secret, token)
            .map_err(|_| AuthRejection)?;

        let email = Email::parse(&claims.sub).map_err(|_| AuthRejection)?;

        let user = UserRepository::new(state.pool())
            .get_by_email(&email)
            .await
            .ok()
            .flatten()
            .ok_or(AuthRejection)?;

        Ok(Self(CurrentUser {
            id: user.id,
            email: user.email,
        }))
    }
}
