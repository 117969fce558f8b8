//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
///
/// `BadCredentials` deliberately collapses captcha failure, unknown account,
/// unverified email and wrong password: callers get one undifferentiated
/// rejection, so the login endpoint cannot be used as an account oracle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] camellia_core::EmailError),

    /// An account with this email already exists.
    #[error("account already exists")]
    AccountExists,

    /// Login rejected; the reason is logged but not surfaced.
    #[error("invalid email, password, or captcha")]
    BadCredentials,

    /// Token matched neither account-token field.
    #[error("invalid token")]
    InvalidToken,

    /// Token matched but is past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// Password failed the complexity policy.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Account not found (profile endpoints, behind authentication).
    #[error("account not found")]
    AccountNotFound,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
