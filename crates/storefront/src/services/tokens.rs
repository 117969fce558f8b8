//! Account token lifecycle.
//!
//! Two token kinds share one design: an opaque random string with an absolute
//! expiry, stored in a dedicated field on the account. The same completion
//! endpoint serves both kinds, so `resolve` looks a bare token up against
//! both fields — verification first, then reset — and tags the result.
//!
//! Issuing against an unknown address is reported as success without doing
//! anything, so the endpoints built on top never reveal whether an account
//! exists.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use camellia_core::Email;

use crate::config::TokenConfig;
use crate::db::users::UserRepository;
use crate::models::user::User;
use crate::services::auth::AuthError;

/// Which field a resolved token matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Email-verification token (issued at registration).
    Verification,
    /// Password-reset token (issued on request, verified accounts only).
    Reset,
}

/// Issues, resolves and consumes account tokens.
pub struct TokenService<'a> {
    users: UserRepository<'a>,
    config: TokenConfig,
}

impl<'a> TokenService<'a> {
    /// Create a token service with the given lifetimes.
    #[must_use]
    pub fn new(pool: &'a SqlitePool, config: &TokenConfig) -> Self {
        Self {
            users: UserRepository::new(pool),
            config: config.clone(),
        }
    }

    /// Issue a fresh verification token for the account, replacing any
    /// previous one. Returns the token, or `None` when no account matches
    /// (silent no-op).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if a database operation fails.
    pub async fn issue_verification(&self, email: &Email) -> Result<Option<String>, AuthError> {
        let Some(user) = self.users.get_by_email(email).await? else {
            tracing::debug!("verification token requested for unknown address");
            return Ok(None);
        };

        let token = Uuid::new_v4().to_string();
        let expires = Utc::now() + self.config.verification_ttl;
        self.users
            .set_verification_token(user.id, &token, expires)
            .await?;

        Ok(Some(token))
    }

    /// Issue a fresh reset token for the account. Returns `None` when no
    /// account matches or the account's email is unverified (a reset link is
    /// meaningless before verification) — both silent no-ops.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if a database operation fails.
    pub async fn issue_reset(&self, email: &Email) -> Result<Option<String>, AuthError> {
        let Some(user) = self.users.get_by_email(email).await? else {
            tracing::debug!("reset token requested for unknown address");
            return Ok(None);
        };

        if !user.email_verified {
            tracing::debug!(user = %user.id, "reset token requested for unverified account");
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        let expires = Utc::now() + self.config.reset_ttl;
        self.users.set_reset_token(user.id, &token, expires).await?;

        Ok(Some(token))
    }

    /// Look a bare token up against both fields.
    ///
    /// The verification field wins when a value improbably matches both
    /// kinds, making the precedence rule explicit rather than an accident of
    /// lookup order.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if neither field matches.
    pub async fn resolve(&self, token: &str) -> Result<(User, TokenKind), AuthError> {
        if let Some(user) = self.users.find_by_verification_token(token).await? {
            return Ok((user, TokenKind::Verification));
        }

        if let Some(user) = self.users.find_by_reset_token(token).await? {
            return Ok((user, TokenKind::Reset));
        }

        Err(AuthError::InvalidToken)
    }

    /// Consume a resolved token.
    ///
    /// Verification: marks the email verified and clears the field. Reset:
    /// clears the field — on the expired path too, so an expired link cannot
    /// be replayed.
    ///
    /// The clearing update is keyed on the token value itself; when two
    /// requests race, exactly one sees the row change and the rest get
    /// `InvalidToken`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` if past expiry, `AuthError::InvalidToken`
    /// if the token was already consumed.
    pub async fn consume(&self, user: &User, kind: TokenKind) -> Result<(), AuthError> {
        match kind {
            TokenKind::Verification => {
                let token = user
                    .verification_token
                    .as_deref()
                    .ok_or(AuthError::InvalidToken)?;

                if is_expired(user.verification_token_expires) {
                    return Err(AuthError::TokenExpired);
                }

                if !self.users.consume_verification_token(token).await? {
                    return Err(AuthError::InvalidToken);
                }
            }
            TokenKind::Reset => {
                let token = user.reset_token.as_deref().ok_or(AuthError::InvalidToken)?;

                if is_expired(user.reset_token_expires) {
                    self.users.clear_reset_token(token).await?;
                    return Err(AuthError::TokenExpired);
                }

                if !self.users.clear_reset_token(token).await? {
                    return Err(AuthError::InvalidToken);
                }
            }
        }

        Ok(())
    }

    /// Whether a reset token is live and unexpired. Read-only; never consumes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the lookup fails.
    pub async fn validate_reset(&self, token: &str) -> Result<bool, AuthError> {
        if token.trim().is_empty() {
            return Ok(false);
        }

        Ok(self
            .users
            .find_by_reset_token(token)
            .await?
            .is_some_and(|user| !is_expired(user.reset_token_expires)))
    }
}

/// A missing expiry counts as expired; the field pair is written together.
fn is_expired(expires: Option<DateTime<Utc>>) -> bool {
    expires.is_none_or(|at| at < Utc::now())
}
