//! Cart route handlers.
//!
//! All endpoints require a bearer credential; every mutation returns the
//! freshly priced cart so clients never render stale totals.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use camellia_core::{ProductId, WeightTier};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::cart::CartSnapshot;
use crate::services::cart::CartService;
use crate::state::AppState;

/// Body for adding or updating a cart line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: String,
    pub weight_tier: WeightTier,
    pub quantity: u32,
}

/// Display the caller's cart, priced against the current catalog.
///
/// GET /api/cart
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartSnapshot>> {
    let snapshot = cart_service(&state).snapshot(user.id).await?;
    Ok(Json(snapshot))
}

/// Add quantity to a line (additive on an existing line).
///
/// POST /api/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CartItemRequest>,
) -> Result<(StatusCode, Json<CartSnapshot>)> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".to_string()));
    }

    let cart = cart_service(&state);
    let product_id = ProductId::from(request.product_id);
    cart.add_line(
        user.id,
        &product_id,
        request.weight_tier,
        i64::from(request.quantity),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(cart.snapshot(user.id).await?)))
}

/// Overwrite a line's quantity; zero deletes the line.
///
/// PUT /api/cart/items
pub async fn update_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CartItemRequest>,
) -> Result<Json<CartSnapshot>> {
    let cart = cart_service(&state);
    let product_id = ProductId::from(request.product_id);
    cart.update_line(
        user.id,
        &product_id,
        request.weight_tier,
        i64::from(request.quantity),
    )
    .await?;

    Ok(Json(cart.snapshot(user.id).await?))
}

/// Remove a line; removing an absent line is a no-op.
///
/// DELETE /api/cart/items/{product_id}/{weight_tier}
pub async fn remove_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((product_id, weight_tier)): Path<(String, String)>,
) -> Result<Json<CartSnapshot>> {
    let weight_tier = weight_tier
        .parse::<WeightTier>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let cart = cart_service(&state);
    let product_id = ProductId::from(product_id);
    cart.remove_line(user.id, &product_id, weight_tier).await?;

    Ok(Json(cart.snapshot(user.id).await?))
}

fn cart_service(state: &AppState) -> CartService<'_> {
    CartService::new(state.pool(), state.cart_locks())
}
