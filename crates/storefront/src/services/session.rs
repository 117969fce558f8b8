//! Bearer credential issuance and verification.
//!
//! The auth workflow only decides *when* a credential is issued and which
//! identity it asserts; the credential itself is an HS256-signed token whose
//! subject is the account email. Nothing else in the service parses it.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use camellia_core::Email;

/// How long an issued bearer credential stays valid.
const BEARER_TTL_HOURS: i64 = 24;

/// Claims carried by a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account email the credential asserts.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Issue a bearer credential for a verified identity.
///
/// # Errors
///
/// Returns `jsonwebtoken::errors::Error` if signing fails.
pub fn issue(secret: &SecretString, email: &Email) -> Result<String, jsonwebtoken::errors::Error> {
    issue_with_ttl(secret, email, chrono::Duration::hours(BEARER_TTL_HOURS))
}

fn issue_with_ttl(
    secret: &SecretString,
    email: &Email,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: email.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
}

/// Verify a bearer credential and return its claims.
///
/// # Errors
///
/// Returns `jsonwebtoken::errors::Error` if the signature is invalid or the
/// credential is expired.
pub fn verify(secret: &SecretString, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("kJ8#mP2$vQ9!xR4&wT7*yU1@zA5^bC3%")
    }

    fn email() -> Email {
        Email::parse("a@x.com").unwrap()
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let token = issue(&secret(), &email()).unwrap();
        let claims = verify(&secret(), &token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = issue(&secret(), &email()).unwrap();
        let other = SecretString::from("nV6!cX1@dZ8$eW3#fY0%gU5&hT2*iS9^");
        assert!(verify(&other, &token).is_err());
    }

    #[test]
    fn test_verify_rejects_tampered_token() {
        let token = issue(&secret(), &email()).unwrap();
        let tampered = format!("{token}x");
        assert!(verify(&secret(), &tampered).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        // Far enough in the past to clear the default validation leeway.
        let token =
            issue_with_ttl(&secret(), &email(), chrono::Duration::hours(-2)).unwrap();
        assert!(verify(&secret(), &token).is_err());
    }
}
