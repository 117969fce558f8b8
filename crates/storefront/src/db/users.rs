//! User repository for database operations.
//!
//! Owns the account records: identity, verification state, the two token
//! fields and profile attributes. `updated_at` is touched on every mutation.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;

use camellia_core::{Email, UserId};

use super::RepositoryError;
use crate::models::user::{ProfileUpdate, User};

/// Column list shared by every user SELECT.
const USER_COLUMNS: &str = "id, email, email_verified, \
     verification_token, verification_token_expires, \
     reset_token, reset_token_expires, \
     display_name, mobile, birth_date, profile_completed, \
     created_at, updated_at";

/// Raw row as stored; converted into [`User`] with email validation.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    email_verified: bool,
    verification_token: Option<String>,
    verification_token_expires: Option<DateTime<Utc>>,
    reset_token: Option<String>,
    reset_token_expires: Option<DateTime<Utc>>,
    display_name: Option<String>,
    mobile: Option<String>,
    birth_date: Option<NaiveDate>,
    profile_completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            email_verified: row.email_verified,
            verification_token: row.verification_token,
            verification_token_expires: row.verification_token_expires,
            reset_token: row.reset_token,
            reset_token_expires: row.reset_token_expires,
            display_name: row.display_name,
            mobile: row.mobile,
            birth_date: row.birth_date,
            profile_completed: row.profile_completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address. The match is byte-for-byte on the
    /// stored value; no case folding.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    /// Create a new unverified user with just an email (no password).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, email: &Email) -> Result<User, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (email, created_at, updated_at) VALUES (?1, ?2, ?3)",
        )
        .bind(email.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("email already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        let id = UserId::new(result.last_insert_rowid());
        self.get_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Store a fresh email-verification token on the user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_verification_token(
        &self,
        user_id: UserId,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET verification_token = ?1, verification_token_expires = ?2, updated_at = ?3 \
             WHERE id = ?4",
        )
        .bind(token)
        .bind(expires)
        .bind(Utc::now())
        .bind(user_id.as_i64())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Store a fresh password-reset token on the user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` if the token value is already live
    /// on another account (reset tokens are globally unique).
    pub async fn set_reset_token(
        &self,
        user_id: UserId,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET reset_token = ?1, reset_token_expires = ?2, updated_at = ?3 \
             WHERE id = ?4",
        )
        .bind(token)
        .bind(expires)
        .bind(Utc::now())
        .bind(user_id.as_i64())
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("reset token already in use".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Find the user holding a given email-verification token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE verification_token = ?1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .fetch_optional(self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    /// Find the user holding a given password-reset token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE reset_token = ?1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .fetch_optional(self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    /// Mark the email verified and clear the verification token, keyed on the
    /// token value so concurrent consumers race on the row update.
    ///
    /// Returns `true` if this call cleared the token, `false` if it was
    /// already gone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_verification_token(&self, token: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET email_verified = 1, verification_token = NULL, \
                 verification_token_expires = NULL, updated_at = ?1 \
             WHERE verification_token = ?2",
        )
        .bind(Utc::now())
        .bind(token)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear a password-reset token, keyed on the token value.
    ///
    /// Returns `true` if this call cleared the token, `false` if it was
    /// already gone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_reset_token(&self, token: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET reset_token = NULL, reset_token_expires = NULL, updated_at = ?1 \
             WHERE reset_token = ?2",
        )
        .bind(Utc::now())
        .bind(token)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the user's password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(user_id.as_i64())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Get a user and their password hash by email.
    ///
    /// Returns `None` if the user doesn't exist or has no password set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let Some(user) = self.get_by_email(email).await? else {
            return Ok(None);
        };

        let hash = sqlx::query_scalar::<_, Option<String>>(
            "SELECT password_hash FROM users WHERE id = ?1",
        )
        .bind(user.id.as_i64())
        .fetch_optional(self.pool)
        .await?
        .flatten();

        Ok(hash.map(|h| (user, h)))
    }

    /// Overwrite the user's profile attributes.
    ///
    /// `profile_completed` is recomputed from the submitted display name on
    /// every update, not latched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users \
             SET display_name = ?1, mobile = ?2, birth_date = ?3, \
                 profile_completed = ?4, updated_at = ?5 \
             WHERE id = ?6",
        )
        .bind(update.display_name.as_deref())
        .bind(update.mobile.as_deref())
        .bind(update.birth_date)
        .bind(update.is_completed())
        .bind(Utc::now())
        .bind(user_id.as_i64())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.get_by_id(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}
