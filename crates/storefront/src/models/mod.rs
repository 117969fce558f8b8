//! Domain models for the storefront.

pub mod cart;
pub mod product;
pub mod user;

pub use cart::{Cart, CartLine, CartSnapshot, CartSnapshotLine};
pub use product::Product;
pub use user::{CurrentUser, ProfileUpdate, User, UserProfile};
