//! Catalog product view.

use serde::Serialize;

use camellia_core::ProductId;

/// A catalog product as the cart engine sees it.
///
/// The catalog is read-only from this service's perspective; price and stock
/// are always read fresh, never cached on cart lines.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Price of a full unit in integer currency units.
    pub base_price: i64,
    /// Units currently in stock.
    pub stock: i64,
}
