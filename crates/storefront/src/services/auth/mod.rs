//! Authentication workflow.
//!
//! Orchestrates registration, captcha-gated login, password reset and
//! profile access. Accounts move through `registered (unverified, no
//! password)` → `verified` → `active (password set)`; login is only possible
//! once an account is active.
//!
//! No password is collected at registration. The verification email carries a
//! token whose consumption both verifies the address and lets the user set
//! their first password, through the same completion flow a later reset uses.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::SqlitePool;

use camellia_core::Email;

use crate::config::StorefrontConfig;
use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::user::{ProfileUpdate, User, UserProfile};
use crate::services::captcha::CaptchaService;
use crate::services::email::Mailer;
use crate::services::tokens::TokenService;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Symbols the password policy accepts (and requires one of).
const PASSWORD_SYMBOLS: &str = "@$!%*?&";

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: TokenService<'a>,
    captcha: &'a CaptchaService,
    mailer: Arc<dyn Mailer>,
    reset_link_base: &'a str,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        pool: &'a SqlitePool,
        captcha: &'a CaptchaService,
        mailer: Arc<dyn Mailer>,
        config: &'a StorefrontConfig,
    ) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens: TokenService::new(pool, &config.tokens),
            captcha,
            mailer,
            reset_link_base: &config.reset_link_base,
        }
    }

    /// Register a new account by email only.
    ///
    /// Creates the account unverified and with no password, then issues a
    /// verification token and emails a link embedding it. Mail delivery is
    /// fire-and-forget; its failure never fails the registration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email is malformed.
    /// Returns `AuthError::AccountExists` if the email is already registered.
    pub async fn register(&self, email: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;

        let user = self.users.create(&email).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::AccountExists,
            other => AuthError::Repository(other),
        })?;

        if let Some(token) = self.tokens.issue_verification(&user.email).await? {
            let link = format!("{}{token}", self.reset_link_base);
            self.mailer.send(
                &user.email,
                "Verify your email address",
                &verification_email_body(&link),
            );
        }

        tracing::info!(user = %user.id, "account registered");
        Ok(user)
    }

    /// Login with email, password and a captcha answer.
    ///
    /// The captcha is validated (and consumed) before anything else. Every
    /// rejection — bad captcha, unknown account, unverified email, missing or
    /// wrong password — surfaces as the same `BadCredentials`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadCredentials` on any rejection.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        captcha_id: Option<&str>,
        captcha_input: &str,
    ) -> Result<User, AuthError> {
        let Some(captcha_id) = captcha_id else {
            tracing::debug!("login rejected: no captcha correlation id");
            return Err(AuthError::BadCredentials);
        };

        if !self.captcha.validate(captcha_id, captcha_input).await {
            tracing::debug!("login rejected: captcha failed");
            return Err(AuthError::BadCredentials);
        }

        let Ok(email) = Email::parse(email) else {
            tracing::debug!("login rejected: malformed email");
            return Err(AuthError::BadCredentials);
        };

        let Some((user, password_hash)) = self.users.get_password_hash(&email).await? else {
            tracing::debug!("login rejected: unknown account or no password set");
            return Err(AuthError::BadCredentials);
        };

        if !user.email_verified {
            tracing::debug!(user = %user.id, "login rejected: email not verified");
            return Err(AuthError::BadCredentials);
        }

        verify_password(password, &password_hash)?;

        tracing::info!(user = %user.id, "login succeeded");
        Ok(user)
    }

    /// Request a password reset link.
    ///
    /// Always reports success. Internally a no-op for malformed addresses,
    /// unknown accounts and unverified accounts.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if a database operation fails.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(());
        };

        if let Some(token) = self.tokens.issue_reset(&email).await? {
            let link = format!("{}{token}", self.reset_link_base);
            self.mailer
                .send(&email, "Reset your password", &reset_email_body(&link));
        }

        Ok(())
    }

    /// Complete a token flow: verify-email-and-set-password, or reset.
    ///
    /// Resolves the token, checks the new password against the policy, then
    /// consumes the token and stores the hashed password. A policy failure
    /// aborts before consumption, so the token stays live for a retry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken`, `AuthError::TokenExpired` or
    /// `AuthError::WeakPassword`, each surfaced distinctly.
    pub async fn complete_token_flow(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let (user, kind) = self.tokens.resolve(token).await?;

        validate_password(new_password)?;

        self.tokens.consume(&user, kind).await?;

        let password_hash = hash_password(new_password)?;
        self.users.set_password_hash(user.id, &password_hash).await?;

        tracing::info!(user = %user.id, ?kind, "token consumed, password set");
        Ok(())
    }

    /// Whether a reset token is currently usable (read-only).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the lookup fails.
    pub async fn validate_reset_token(&self, token: &str) -> Result<bool, AuthError> {
        self.tokens.validate_reset(token).await
    }

    /// Fetch the account's profile attributes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountNotFound` if the account doesn't exist.
    pub async fn get_profile(&self, email: &Email) -> Result<UserProfile, AuthError> {
        self.users
            .get_by_email(email)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::AccountNotFound)
    }

    /// Overwrite the account's profile attributes.
    ///
    /// `profile_completed` is recomputed from the submitted display name on
    /// every update.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountNotFound` if the account doesn't exist.
    pub async fn update_profile(
        &self,
        email: &Email,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, AuthError> {
        let user = self
            .users
            .get_by_email(email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let updated = self.users.update_profile(user.id, update).await?;
        Ok(UserProfile::from(updated))
    }
}

/// Validate a password against the complexity policy.
///
/// Minimum 8 characters, at least one lowercase letter, one uppercase letter,
/// one digit and one symbol from the accepted set; no characters outside
/// letters, digits and that set.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::WeakPassword(
            "password must contain a lowercase letter".to_owned(),
        ));
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::WeakPassword(
            "password must contain an uppercase letter".to_owned(),
        ));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "password must contain a digit".to_owned(),
        ));
    }

    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        return Err(AuthError::WeakPassword(format!(
            "password must contain one of {PASSWORD_SYMBOLS}"
        )));
    }

    if let Some(c) = password
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !PASSWORD_SYMBOLS.contains(*c))
    {
        return Err(AuthError::WeakPassword(format!(
            "password contains unsupported character '{c}'"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::BadCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::BadCredentials)
}

fn verification_email_body(link: &str) -> String {
    format!(
        "Hello,\n\n\
         Thanks for creating an account. Click the link below to verify your\n\
         email address and choose a password:\n\n\
         {link}\n\n\
         The link is valid for 24 hours. If you did not create this account,\n\
         you can ignore this message.\n"
    )
}

fn reset_email_body(link: &str) -> String {
    format!(
        "Hello,\n\n\
         A password reset was requested for your account. Click the link\n\
         below to choose a new password:\n\n\
         {link}\n\n\
         The link is valid for 10 minutes. If you did not request a reset,\n\
         you can ignore this message.\n"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{StorefrontConfig, test_config};
    use crate::db::memory_pool;
    use crate::services::email::testing::RecordingMailer;

    struct Harness {
        pool: SqlitePool,
        config: StorefrontConfig,
        captcha: CaptchaService,
        mailer: Arc<RecordingMailer>,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_config(test_config()).await
        }

        async fn with_config(config: StorefrontConfig) -> Self {
            Self {
                pool: memory_pool().await,
                captcha: CaptchaService::new(&config.captcha),
                mailer: Arc::new(RecordingMailer::default()),
                config,
            }
        }

        fn auth(&self) -> AuthService<'_> {
            AuthService::new(
                &self.pool,
                &self.captcha,
                Arc::clone(&self.mailer) as Arc<dyn Mailer>,
                &self.config,
            )
        }

        /// Pull the token out of the most recent email body.
        fn last_emailed_token(&self) -> String {
            let body = self.mailer.last_body().expect("an email was sent");
            let base = &self.config.reset_link_base;
            let start = body.find(base.as_str()).expect("body contains link") + base.len();
            body[start..]
                .chars()
                .take_while(|c| !c.is_whitespace())
                .collect()
        }

        /// Register and activate an account with the given password.
        async fn activate_account(&self, email: &str, password: &str) {
            self.auth().register(email).await.unwrap();
            let token = self.last_emailed_token();
            self.auth()
                .complete_token_flow(&token, password)
                .await
                .unwrap();
        }

        /// Plant a captcha answer and return its correlation id.
        async fn solved_captcha(&self) -> String {
            let id = uuid::Uuid::new_v4().to_string();
            self.captcha.insert_challenge(&id, "AB34").await;
            id
        }
    }

    const GOOD_PASSWORD: &str = "Abc123$5";

    #[tokio::test]
    async fn test_register_sends_verification_link() {
        let h = Harness::new().await;

        let user = h.auth().register("a@x.com").await.unwrap();
        assert!(!user.email_verified);

        assert_eq!(h.mailer.recipients(), vec!["a@x.com".to_string()]);
        let token = h.last_emailed_token();
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn test_register_twice_conflicts_and_leaves_account_unchanged() {
        let h = Harness::new().await;

        let first = h.auth().register("a@x.com").await.unwrap();
        let token_before = h.last_emailed_token();

        let err = h.auth().register("a@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::AccountExists));

        // Only the original mail went out; the stored token is untouched.
        assert_eq!(h.mailer.recipients().len(), 1);
        let stored = UserRepository::new(&h.pool)
            .get_by_id(first.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.verification_token.as_deref(), Some(token_before.as_str()));
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_email() {
        let h = Harness::new().await;
        assert!(matches!(
            h.auth().register("not-an-email").await,
            Err(AuthError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_full_activation_then_login() {
        let h = Harness::new().await;
        h.activate_account("a@x.com", GOOD_PASSWORD).await;

        let captcha_id = h.solved_captcha().await;
        let user = h
            .auth()
            .login("a@x.com", GOOD_PASSWORD, Some(&captcha_id), "ab34")
            .await
            .unwrap();
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn test_login_fails_without_any_one_precondition() {
        let h = Harness::new().await;
        h.activate_account("a@x.com", GOOD_PASSWORD).await;

        // Wrong captcha answer.
        let id = h.solved_captcha().await;
        assert!(matches!(
            h.auth().login("a@x.com", GOOD_PASSWORD, Some(&id), "nope").await,
            Err(AuthError::BadCredentials)
        ));

        // Missing captcha correlation id.
        assert!(matches!(
            h.auth().login("a@x.com", GOOD_PASSWORD, None, "AB34").await,
            Err(AuthError::BadCredentials)
        ));

        // Unknown account.
        let id = h.solved_captcha().await;
        assert!(matches!(
            h.auth().login("ghost@x.com", GOOD_PASSWORD, Some(&id), "AB34").await,
            Err(AuthError::BadCredentials)
        ));

        // Wrong password.
        let id = h.solved_captcha().await;
        assert!(matches!(
            h.auth().login("a@x.com", "Wrong9$x", Some(&id), "AB34").await,
            Err(AuthError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_rejects_unverified_account_identically() {
        let h = Harness::new().await;
        h.auth().register("a@x.com").await.unwrap();

        let id = h.solved_captcha().await;
        let err = h
            .auth()
            .login("a@x.com", GOOD_PASSWORD, Some(&id), "AB34")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));
    }

    #[tokio::test]
    async fn test_captcha_is_consumed_by_failed_login() {
        let h = Harness::new().await;
        h.activate_account("a@x.com", GOOD_PASSWORD).await;

        let id = h.solved_captcha().await;
        // First attempt fails on the password, but the captcha is spent.
        let _ = h.auth().login("a@x.com", "Wrong9$x", Some(&id), "AB34").await;
        assert!(matches!(
            h.auth().login("a@x.com", GOOD_PASSWORD, Some(&id), "AB34").await,
            Err(AuthError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn test_weak_password_does_not_burn_token() {
        let h = Harness::new().await;
        h.auth().register("a@x.com").await.unwrap();
        let token = h.last_emailed_token();

        let err = h
            .auth()
            .complete_token_flow(&token, "abc12345")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(_)));

        // Token is still live; a stronger password succeeds.
        h.auth()
            .complete_token_flow(&token, GOOD_PASSWORD)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_completed_token_cannot_be_replayed() {
        let h = Harness::new().await;
        h.activate_account("a@x.com", GOOD_PASSWORD).await;

        let token = h.last_emailed_token();
        assert!(matches!(
            h.auth().complete_token_flow(&token, GOOD_PASSWORD).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let h = Harness::new().await;
        assert!(matches!(
            h.auth().complete_token_flow("no-such-token", GOOD_PASSWORD).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_reset_flow_changes_password() {
        let h = Harness::new().await;
        h.activate_account("a@x.com", GOOD_PASSWORD).await;

        h.auth().request_password_reset("a@x.com").await.unwrap();
        assert_eq!(h.mailer.recipients().len(), 2);

        let token = h.last_emailed_token();
        assert!(h.auth().validate_reset_token(&token).await.unwrap());

        h.auth()
            .complete_token_flow(&token, "New123$x")
            .await
            .unwrap();

        // Old password no longer works, new one does.
        let id = h.solved_captcha().await;
        assert!(matches!(
            h.auth().login("a@x.com", GOOD_PASSWORD, Some(&id), "AB34").await,
            Err(AuthError::BadCredentials)
        ));
        let id = h.solved_captcha().await;
        assert!(
            h.auth()
                .login("a@x.com", "New123$x", Some(&id), "AB34")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_reset_request_is_silent_for_unknown_and_unverified() {
        let h = Harness::new().await;

        h.auth().request_password_reset("ghost@x.com").await.unwrap();
        h.auth().request_password_reset("not-an-email").await.unwrap();
        assert!(h.mailer.recipients().is_empty());

        h.auth().register("a@x.com").await.unwrap();
        h.auth().request_password_reset("a@x.com").await.unwrap();
        // Only the registration mail; no reset mail for an unverified account.
        assert_eq!(h.mailer.recipients().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_roundtrip_and_completion() {
        let h = Harness::new().await;
        h.activate_account("a@x.com", GOOD_PASSWORD).await;
        let email = Email::parse("a@x.com").unwrap();

        let profile = h.auth().get_profile(&email).await.unwrap();
        assert!(!profile.profile_completed);

        let update = ProfileUpdate {
            display_name: Some("Mei Lin".to_string()),
            mobile: Some("0912345678".to_string()),
            birth_date: chrono::NaiveDate::from_ymd_opt(1990, 1, 1),
        };
        let profile = h.auth().update_profile(&email, &update).await.unwrap();
        assert!(profile.profile_completed);
        assert_eq!(profile.display_name.as_deref(), Some("Mei Lin"));

        let ghost = Email::parse("ghost@x.com").unwrap();
        assert!(matches!(
            h.auth().get_profile(&ghost).await,
            Err(AuthError::AccountNotFound)
        ));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("Abc123$5").is_ok());

        // Each individual rule.
        assert!(matches!(
            validate_password("abc12345"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password("Ab1$"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password("ABC123$5"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password("Abcdef$g"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_password("Abc12345"),
            Err(AuthError::WeakPassword(_))
        ));
        // Symbol outside the accepted set.
        assert!(matches!(
            validate_password("Abc123#5"),
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password(GOOD_PASSWORD).unwrap();
        assert_ne!(hash, GOOD_PASSWORD);
        assert!(verify_password(GOOD_PASSWORD, &hash).is_ok());
        assert!(matches!(
            verify_password("Wrong9$x", &hash),
            Err(AuthError::BadCredentials)
        ));
    }
}
