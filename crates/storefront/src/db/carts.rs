//! Cart repository.
//!
//! Lines are keyed by (cart, product, weight tier); distinct tiers of the
//! same product are independent lines. Quantities are the only persisted
//! cart state — pricing is derived at snapshot time.

use chrono::Utc;
use sqlx::SqlitePool;

use camellia_core::{CartId, ProductId, UserId, WeightTier};

use super::RepositoryError;
use crate::models::cart::{Cart, CartLine};

#[derive(sqlx::FromRow)]
struct CartLineRow {
    product_id: String,
    weight_tier: String,
    quantity: i64,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let weight_tier = row.weight_tier.parse::<WeightTier>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid weight tier in database: {e}"))
        })?;

        Ok(Self {
            product_id: ProductId::from(row.product_id),
            weight_tier,
            quantity: row.quantity,
        })
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the user's cart, creating an empty one on first access.
    ///
    /// The insert ignores conflicts on `user_id`, so concurrent first
    /// accesses converge on a single cart row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO carts (user_id, created_at, updated_at) VALUES (?1, ?2, ?2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id.as_i64())
        .bind(now)
        .execute(self.pool)
        .await?;

        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM carts WHERE user_id = ?1")
            .bind(user_id.as_i64())
            .fetch_one(self.pool)
            .await?;

        Ok(Cart {
            id: CartId::new(id),
            user_id,
        })
    }

    /// Get a single line by its (product, tier) key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored tier is invalid.
    pub async fn get_line(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        weight_tier: WeightTier,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query_as::<_, CartLineRow>(
            "SELECT product_id, weight_tier, quantity FROM cart_lines \
             WHERE cart_id = ?1 AND product_id = ?2 AND weight_tier = ?3",
        )
        .bind(cart_id.as_i64())
        .bind(product_id.as_str())
        .bind(weight_tier.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(CartLine::try_from).transpose()
    }

    /// Create the line or overwrite its quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_line(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        weight_tier: WeightTier,
        quantity: i64,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO cart_lines \
             (cart_id, product_id, weight_tier, quantity, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
             ON CONFLICT (cart_id, product_id, weight_tier) DO UPDATE \
             SET quantity = excluded.quantity, updated_at = excluded.updated_at",
        )
        .bind(cart_id.as_i64())
        .bind(product_id.as_str())
        .bind(weight_tier.as_str())
        .bind(quantity)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Delete a line. Returns `true` if a line was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_line(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        weight_tier: WeightTier,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM cart_lines \
             WHERE cart_id = ?1 AND product_id = ?2 AND weight_tier = ?3",
        )
        .bind(cart_id.as_i64())
        .bind(product_id.as_str())
        .bind(weight_tier.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List all lines in a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored tier is invalid.
    pub async fn list_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT product_id, weight_tier, quantity FROM cart_lines \
             WHERE cart_id = ?1 ORDER BY id ASC",
        )
        .bind(cart_id.as_i64())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::db::users::UserRepository;

    use camellia_core::Email;

    async fn seeded_user(pool: &SqlitePool) -> UserId {
        let users = UserRepository::new(pool);
        let user = users
            .create(&Email::parse("cart@x.com").unwrap())
            .await
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let pool = memory_pool().await;
        let user_id = seeded_user(&pool).await;
        let carts = CartRepository::new(&pool);

        let first = carts.get_or_create(user_id).await.unwrap();
        let second = carts.get_or_create(user_id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_lines_keyed_by_product_and_tier() {
        let pool = memory_pool().await;
        let user_id = seeded_user(&pool).await;
        let carts = CartRepository::new(&pool);
        let cart = carts.get_or_create(user_id).await.unwrap();
        let p1 = ProductId::from("p1");

        carts
            .upsert_line(cart.id, &p1, WeightTier::Full, 2)
            .await
            .unwrap();
        carts
            .upsert_line(cart.id, &p1, WeightTier::Half, 3)
            .await
            .unwrap();

        let lines = carts.list_lines(cart.id).await.unwrap();
        assert_eq!(lines.len(), 2);

        let full = carts
            .get_line(cart.id, &p1, WeightTier::Full)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.quantity, 2);

        // Upsert overwrites the quantity for the same key.
        carts
            .upsert_line(cart.id, &p1, WeightTier::Full, 7)
            .await
            .unwrap();
        let full = carts
            .get_line(cart.id, &p1, WeightTier::Full)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.quantity, 7);
    }

    #[tokio::test]
    async fn test_delete_line() {
        let pool = memory_pool().await;
        let user_id = seeded_user(&pool).await;
        let carts = CartRepository::new(&pool);
        let cart = carts.get_or_create(user_id).await.unwrap();
        let p1 = ProductId::from("p1");

        carts
            .upsert_line(cart.id, &p1, WeightTier::Full, 1)
            .await
            .unwrap();
        assert!(carts.delete_line(cart.id, &p1, WeightTier::Full).await.unwrap());
        assert!(!carts.delete_line(cart.id, &p1, WeightTier::Full).await.unwrap());
    }
}
