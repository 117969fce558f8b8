//! Account model and profile views.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use camellia_core::{Email, UserId};

/// An account record.
///
/// Created unverified and without a credential at registration; the password
/// is set when the first verification (or a later reset) token is consumed.
/// The password hash itself never leaves the repository layer.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub email_verified: bool,
    /// Live email-verification token, if one has been issued and not consumed.
    pub verification_token: Option<String>,
    pub verification_token_expires: Option<DateTime<Utc>>,
    /// Live password-reset token, if one has been issued and not consumed.
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    pub display_name: Option<String>,
    pub mobile: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile attributes exposed to the account holder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: Email,
    pub display_name: Option<String>,
    pub mobile: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_completed: bool,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            display_name: user.display_name,
            mobile: user.mobile,
            birth_date: user.birth_date,
            profile_completed: user.profile_completed,
        }
    }
}

/// Profile fields accepted from the account holder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub mobile: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl ProfileUpdate {
    /// A profile counts as completed once the display name is non-blank.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.display_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }
}

/// The authenticated account attached to a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
}
