//! Catalog seeding command.
//!
//! The storefront treats the product catalog as read-only; this command is
//! how rows get in. The input is a JSON array in the API's casing:
//!
//! ```json
//! [
//!   { "id": "sanxia-biluochun", "name": "Sanxia Biluochun", "basePrice": 1000, "stock": 5 }
//! ]
//! ```
//!
//! Existing products with the same id are overwritten (price and stock
//! updates re-run the same file).

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use camellia_core::ProductId;
use camellia_storefront::db::{self, ProductRepository};
use camellia_storefront::models::Product;

/// One catalog entry as it appears in the seed file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedProduct {
    id: String,
    name: String,
    base_price: i64,
    stock: i64,
}

/// Load products from a JSON file into the catalog table.
///
/// The file is parsed and validated in full before the database is touched.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed, an entry fails
/// validation, or a database operation fails.
pub async fn run(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    let content = tokio::fs::read_to_string(path).await?;
    let entries: Vec<SeedProduct> = serde_json::from_str(&content)?;

    for entry in &entries {
        if entry.id.trim().is_empty() {
            return Err("product id cannot be blank".into());
        }
        if entry.base_price < 0 {
            return Err(format!("product '{}' has a negative base price", entry.id).into());
        }
        if entry.stock < 0 {
            return Err(format!("product '{}' has negative stock", entry.id).into());
        }
    }

    info!(products = entries.len(), "Parsed catalog file");

    let database_url = super::database_url();
    let pool = db::create_pool(&database_url).await?;
    db::migrate(&pool).await?;

    let products = ProductRepository::new(&pool);
    for entry in entries {
        products
            .upsert(&Product {
                id: ProductId::from(entry.id),
                name: entry.name,
                base_price: entry.base_price,
                stock: entry.stock,
            })
            .await?;
    }

    info!("Seeding complete");
    Ok(())
}
