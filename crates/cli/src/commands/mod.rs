//! CLI subcommand implementations.

pub mod migrate;
pub mod seed;

/// Database URL from the environment, with the storefront's default.
pub(crate) fn database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://camellia.db".to_string())
}
