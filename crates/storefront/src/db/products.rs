//! Product catalog repository.
//!
//! The storefront treats the catalog as read-only; rows are loaded by the
//! seed CLI command (`camellia-cli seed`).

use chrono::Utc;
use sqlx::SqlitePool;

use camellia_core::ProductId;

use super::RepositoryError;
use crate::models::product::Product;

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    base_price: i64,
    stock: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::from(row.id),
            name: row.name,
            base_price: row.base_price,
            stock: row.stock,
        }
    }
}

/// Repository for catalog lookups.
pub struct ProductRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a product by its slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, base_price, stock FROM products WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Insert or replace a product (used by the seed command and tests).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, product: &Product) -> Result<(), RepositoryError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO products (id, name, base_price, stock, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
             ON CONFLICT (id) DO UPDATE \
             SET name = excluded.name, base_price = excluded.base_price, \
                 stock = excluded.stock, updated_at = excluded.updated_at",
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.base_price)
        .bind(product.stock)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn test_upsert_and_find() {
        let pool = memory_pool().await;
        let products = ProductRepository::new(&pool);

        let product = Product {
            id: ProductId::from("sanxia-biluochun"),
            name: "Sanxia Biluochun".to_string(),
            base_price: 1000,
            stock: 5,
        };
        products.upsert(&product).await.unwrap();

        let found = products.find(&product.id).await.unwrap().unwrap();
        assert_eq!(found.base_price, 1000);
        assert_eq!(found.stock, 5);

        // Upsert overwrites price and stock.
        let restocked = Product { stock: 12, ..product };
        products.upsert(&restocked).await.unwrap();
        let found = products.find(&restocked.id).await.unwrap().unwrap();
        assert_eq!(found.stock, 12);

        assert!(
            products
                .find(&ProductId::from("missing"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
