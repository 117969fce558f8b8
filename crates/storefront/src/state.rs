//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::StorefrontConfig;
use crate::services::captcha::CaptchaService;
use crate::services::cart::CartLockRegistry;
use crate::services::email::{LogMailer, Mailer, MailerError, SmtpMailer};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; provides access to the database pool,
/// configuration, the captcha engine and the outbound mailer.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: SqlitePool,
    captcha: CaptchaService,
    mailer: Arc<dyn Mailer>,
    cart_locks: CartLockRegistry,
}

impl AppState {
    /// Create application state, building the mailer from configuration.
    ///
    /// Without SMTP configuration outbound mail is logged instead of sent.
    ///
    /// # Errors
    ///
    /// Returns `MailerError` if the SMTP configuration is invalid.
    pub fn new(config: StorefrontConfig, pool: SqlitePool) -> Result<Self, MailerError> {
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => Arc::new(LogMailer),
        };

        Ok(Self::with_mailer(config, pool, mailer))
    }

    /// Create application state with an explicit mailer.
    #[must_use]
    pub fn with_mailer(
        config: StorefrontConfig,
        pool: SqlitePool,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let captcha = CaptchaService::new(&config.captcha);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                captcha,
                mailer,
                cart_locks: CartLockRegistry::new(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Get a reference to the captcha engine.
    #[must_use]
    pub fn captcha(&self) -> &CaptchaService {
        &self.inner.captcha
    }

    /// Get a clone of the outbound mailer handle.
    #[must_use]
    pub fn mailer(&self) -> Arc<dyn Mailer> {
        Arc::clone(&self.inner.mailer)
    }

    /// Get a reference to the per-account cart lock registry.
    #[must_use]
    pub fn cart_locks(&self) -> &CartLockRegistry {
        &self.inner.cart_locks
    }
}
