//! End-to-end tests for the Camellia storefront.
//!
//! The tests in `tests/` drive a running server over HTTP and are ignored by
//! default:
//!
//! ```bash
//! # Start the storefront
//! cargo run -p camellia-storefront
//!
//! # Run the end-to-end tests against it
//! cargo test -p camellia-integration-tests -- --ignored
//! ```
//!
//! Registrations use throwaway unique addresses, so the suite can be re-run
//! against the same database.

#![cfg_attr(not(test), forbid(unsafe_code))]

use reqwest::Client;

/// Base URL of the storefront under test (`STOREFRONT_BASE_URL` to override).
#[must_use]
pub fn base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// An HTTP client with a cookie store, so the captcha cookie round-trips.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// A unique throwaway address so repeated runs never collide.
#[must_use]
pub fn unique_email() -> String {
    format!("e2e-{}@example.com", uuid::Uuid::new_v4())
}
