//! Cart mutation engine.
//!
//! Enforces the stock invariant: a line's quantity never exceeds the
//! catalog's current stock at validation time. Stock checks and line writes
//! for one account run under that account's cart lock, so two concurrent
//! additions cannot both pass a stale stock read. Carts of different accounts
//! never contend.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use camellia_core::{ProductId, UserId, WeightTier};

use crate::db::RepositoryError;
use crate::db::carts::CartRepository;
use crate::db::products::ProductRepository;
use crate::models::cart::{Cart, CartSnapshot, CartSnapshotLine};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The catalog has no such product.
    #[error("product not found")]
    ProductNotFound,

    /// The requested quantity exceeds current stock.
    #[error("not enough stock: requested {requested}, available {stock}")]
    InsufficientStock {
        /// Total quantity the line would reach.
        requested: i64,
        /// Units currently in stock.
        stock: i64,
    },

    /// No line matches the (product, tier) key.
    #[error("cart line not found")]
    LineNotFound,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Per-account cart locks.
///
/// Lock granularity is the account: one guard serializes all mutations of
/// that user's cart while leaving other users' carts untouched.
#[derive(Default)]
pub struct CartLockRegistry {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl CartLockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one user's cart.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }
}

/// Cart engine.
pub struct CartService<'a> {
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
    locks: &'a CartLockRegistry,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, locks: &'a CartLockRegistry) -> Self {
        Self {
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
            locks,
        }
    }

    /// Return the user's cart, creating it on first access.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a database operation fails.
    pub async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart, CartError> {
        Ok(self.carts.get_or_create(user_id).await?)
    }

    /// Add quantity to a line, creating it if absent.
    ///
    /// Additive: adding to an existing (product, tier) line increments it.
    /// The combined quantity is checked against current stock.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` or `CartError::InsufficientStock`.
    pub async fn add_line(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        weight_tier: WeightTier,
        quantity: i64,
    ) -> Result<(), CartError> {
        let _guard = self.locks.acquire(user_id).await;

        let cart = self.carts.get_or_create(user_id).await?;
        let product = self
            .products
            .find(product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;

        let existing = self
            .carts
            .get_line(cart.id, product_id, weight_tier)
            .await?
            .map_or(0, |line| line.quantity);

        let requested = existing + quantity;
        if requested > product.stock {
            return Err(CartError::InsufficientStock {
                requested,
                stock: product.stock,
            });
        }

        self.carts
            .upsert_line(cart.id, product_id, weight_tier, requested)
            .await?;

        Ok(())
    }

    /// Overwrite a line's quantity; zero deletes the line.
    ///
    /// Unlike [`CartService::add_line`] this is not additive.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if no line matches, and
    /// `CartError::ProductNotFound` / `CartError::InsufficientStock` when
    /// re-validating a non-zero quantity.
    pub async fn update_line(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        weight_tier: WeightTier,
        quantity: i64,
    ) -> Result<(), CartError> {
        let _guard = self.locks.acquire(user_id).await;

        let cart = self.carts.get_or_create(user_id).await?;

        if self
            .carts
            .get_line(cart.id, product_id, weight_tier)
            .await?
            .is_none()
        {
            return Err(CartError::LineNotFound);
        }

        if quantity == 0 {
            self.carts
                .delete_line(cart.id, product_id, weight_tier)
                .await?;
            return Ok(());
        }

        let product = self
            .products
            .find(product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;

        if quantity > product.stock {
            return Err(CartError::InsufficientStock {
                requested: quantity,
                stock: product.stock,
            });
        }

        self.carts
            .upsert_line(cart.id, product_id, weight_tier, quantity)
            .await?;

        Ok(())
    }

    /// Remove a line. Idempotent: a missing line is a no-op, which keeps
    /// retry-driven clients safe.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a database operation fails.
    pub async fn remove_line(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        weight_tier: WeightTier,
    ) -> Result<(), CartError> {
        let _guard = self.locks.acquire(user_id).await;

        let cart = self.carts.get_or_create(user_id).await?;
        let removed = self
            .carts
            .delete_line(cart.id, product_id, weight_tier)
            .await?;

        if !removed {
            tracing::debug!(user = %user_id, product = %product_id, "remove of absent cart line");
        }

        Ok(())
    }

    /// Price the cart against the current catalog.
    ///
    /// Unit prices and stock are read fresh at snapshot time, never cached on
    /// lines. Lines whose product has left the catalog are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a database operation fails.
    pub async fn snapshot(&self, user_id: UserId) -> Result<CartSnapshot, CartError> {
        let cart = self.carts.get_or_create(user_id).await?;
        let lines = self.carts.list_lines(cart.id).await?;

        let mut snapshot_lines = Vec::with_capacity(lines.len());
        let mut total = 0;
        for line in lines {
            let Some(product) = self.products.find(&line.product_id).await? else {
                tracing::warn!(product = %line.product_id, "cart line references missing product, skipping");
                continue;
            };

            let unit_price = line.weight_tier.unit_price(product.base_price);
            let subtotal = unit_price * line.quantity;
            total += subtotal;

            snapshot_lines.push(CartSnapshotLine {
                product_id: line.product_id,
                name: product.name,
                weight_tier: line.weight_tier,
                quantity: line.quantity,
                unit_price,
                subtotal,
            });
        }

        Ok(CartSnapshot {
            lines: snapshot_lines,
            total,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::db::users::UserRepository;
    use crate::models::product::Product;

    use camellia_core::Email;

    struct Harness {
        pool: SqlitePool,
        locks: CartLockRegistry,
        user_id: UserId,
    }

    impl Harness {
        async fn new() -> Self {
            let pool = memory_pool().await;
            let user = UserRepository::new(&pool)
                .create(&Email::parse("cart@x.com").unwrap())
                .await
                .unwrap();
            Self {
                pool,
                locks: CartLockRegistry::new(),
                user_id: user.id,
            }
        }

        fn cart(&self) -> CartService<'_> {
            CartService::new(&self.pool, &self.locks)
        }

        async fn seed_product(&self, id: &str, base_price: i64, stock: i64) -> ProductId {
            let product = Product {
                id: ProductId::from(id),
                name: id.to_owned(),
                base_price,
                stock,
            };
            ProductRepository::new(&self.pool)
                .upsert(&product)
                .await
                .unwrap();
            product.id
        }
    }

    #[tokio::test]
    async fn test_add_line_unknown_product() {
        let h = Harness::new().await;
        assert!(matches!(
            h.cart()
                .add_line(h.user_id, &ProductId::from("ghost"), WeightTier::Full, 1)
                .await,
            Err(CartError::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn test_add_line_is_additive_against_stock() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;
        let cart = h.cart();

        // stock=5: 3 fits, another 3 would make 6.
        cart.add_line(h.user_id, &p1, WeightTier::Full, 3).await.unwrap();
        let err = cart
            .add_line(h.user_id, &p1, WeightTier::Full, 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartError::InsufficientStock { requested: 6, stock: 5 }
        ));

        // The rejected call left the line untouched; smaller top-ups still accumulate.
        cart.add_line(h.user_id, &p1, WeightTier::Full, 1).await.unwrap();
        let snapshot = cart.snapshot(h.user_id).await.unwrap();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_tiers_are_independent_lines() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;
        let cart = h.cart();

        cart.add_line(h.user_id, &p1, WeightTier::Full, 2).await.unwrap();
        cart.add_line(h.user_id, &p1, WeightTier::Half, 3).await.unwrap();

        let snapshot = cart.snapshot(h.user_id).await.unwrap();
        assert_eq!(snapshot.lines.len(), 2);
    }

    #[tokio::test]
    async fn test_update_line_overwrites_not_adds() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;
        let cart = h.cart();

        cart.add_line(h.user_id, &p1, WeightTier::Full, 2).await.unwrap();
        cart.update_line(h.user_id, &p1, WeightTier::Full, 4).await.unwrap();

        let snapshot = cart.snapshot(h.user_id).await.unwrap();
        assert_eq!(snapshot.lines[0].quantity, 4);

        assert!(matches!(
            cart.update_line(h.user_id, &p1, WeightTier::Full, 9).await,
            Err(CartError::InsufficientStock { requested: 9, stock: 5 })
        ));
    }

    #[tokio::test]
    async fn test_update_absent_line_not_found() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;

        assert!(matches!(
            h.cart().update_line(h.user_id, &p1, WeightTier::Full, 1).await,
            Err(CartError::LineNotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_to_zero_deletes_line() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;
        let p2 = h.seed_product("p2", 400, 5).await;
        let cart = h.cart();

        cart.add_line(h.user_id, &p1, WeightTier::Full, 2).await.unwrap();
        cart.add_line(h.user_id, &p2, WeightTier::Full, 1).await.unwrap();
        cart.update_line(h.user_id, &p1, WeightTier::Full, 0).await.unwrap();

        let snapshot = cart.snapshot(h.user_id).await.unwrap();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].product_id, p2);
        assert_eq!(snapshot.total, 400);
    }

    #[tokio::test]
    async fn test_remove_line_is_idempotent() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;
        let cart = h.cart();

        cart.add_line(h.user_id, &p1, WeightTier::Full, 2).await.unwrap();
        cart.remove_line(h.user_id, &p1, WeightTier::Full).await.unwrap();
        // Second remove of the same (and of a never-added) line is a no-op.
        cart.remove_line(h.user_id, &p1, WeightTier::Full).await.unwrap();
        cart.remove_line(h.user_id, &p1, WeightTier::Half).await.unwrap();

        let snapshot = cart.snapshot(h.user_id).await.unwrap();
        assert!(snapshot.lines.is_empty());
        assert_eq!(snapshot.total, 0);
    }

    #[tokio::test]
    async fn test_snapshot_prices_by_tier() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 10).await;
        let cart = h.cart();

        cart.add_line(h.user_id, &p1, WeightTier::Half, 2).await.unwrap();
        cart.add_line(h.user_id, &p1, WeightTier::Quarter, 1).await.unwrap();

        let snapshot = cart.snapshot(h.user_id).await.unwrap();
        let half = snapshot
            .lines
            .iter()
            .find(|l| l.weight_tier == WeightTier::Half)
            .unwrap();
        assert_eq!(half.unit_price, 500);
        assert_eq!(half.subtotal, 1000);

        let quarter = snapshot
            .lines
            .iter()
            .find(|l| l.weight_tier == WeightTier::Quarter)
            .unwrap();
        assert_eq!(quarter.unit_price, 250);
        assert_eq!(quarter.subtotal, 250);

        assert_eq!(snapshot.total, 1250);
    }

    #[tokio::test]
    async fn test_snapshot_reads_fresh_prices() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 10).await;
        let cart = h.cart();

        cart.add_line(h.user_id, &p1, WeightTier::Full, 1).await.unwrap();
        assert_eq!(cart.snapshot(h.user_id).await.unwrap().total, 1000);

        // Price change shows up on the next snapshot; nothing was cached.
        h.seed_product("p1", 1200, 10).await;
        assert_eq!(cart.snapshot(h.user_id).await.unwrap().total, 1200);
    }

    #[tokio::test]
    async fn test_concurrent_adds_serialize_on_stock() {
        let h = Harness::new().await;
        let p1 = h.seed_product("p1", 1000, 5).await;

        // Two tasks race to add 3 each against stock 5; exactly one must win.
        let pool = h.pool.clone();
        let locks = Arc::new(CartLockRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..2 {
            let pool = pool.clone();
            let locks = Arc::clone(&locks);
            let p1 = p1.clone();
            let user_id = h.user_id;
            handles.push(tokio::spawn(async move {
                CartService::new(&pool, &locks)
                    .add_line(user_id, &p1, WeightTier::Full, 3)
                    .await
            }));
        }

        let mut ok = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(CartError::InsufficientStock { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((ok, rejected), (1, 1));

        let snapshot = CartService::new(&pool, &locks)
            .snapshot(h.user_id)
            .await
            .unwrap();
        assert_eq!(snapshot.lines[0].quantity, 3);
    }
}
