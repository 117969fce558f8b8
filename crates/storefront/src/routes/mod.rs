//! Route definitions for the storefront API.

pub mod auth;
pub mod cart;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Build the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/captcha", get(auth::captcha))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route(
            "/api/auth/reset-password/validate",
            get(auth::validate_reset_token),
        )
        .route(
            "/api/auth/profile",
            get(auth::profile).put(auth::update_profile),
        )
        .route("/api/cart", get(cart::show))
        .route(
            "/api/cart/items",
            post(cart::add_item).put(cart::update_item),
        )
        .route(
            "/api/cart/items/{product_id}/{weight_tier}",
            delete(cart::remove_item),
        )
}
