//! Cart models and snapshot views.

use serde::Serialize;

use camellia_core::{CartId, ProductId, UserId, WeightTier};

/// A user's cart. Created lazily on first access, one per account.
#[derive(Debug, Clone)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
}

/// A stored cart line, keyed by (product, weight tier).
///
/// Only the quantity is persisted; prices are derived at snapshot time.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: ProductId,
    pub weight_tier: WeightTier,
    pub quantity: i64,
}

/// A priced view of a cart, computed against the current catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub lines: Vec<CartSnapshotLine>,
    /// Sum of all line subtotals in integer currency units.
    pub total: i64,
}

/// One priced cart line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshotLine {
    pub product_id: ProductId,
    pub name: String,
    pub weight_tier: WeightTier,
    pub quantity: i64,
    /// Base price scaled by the tier multiplier, rounded to the nearest unit.
    pub unit_price: i64,
    pub subtotal: i64,
}
