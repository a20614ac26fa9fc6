//! Integration tests for GoMarketplace.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p go-marketplace-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_session` - Session lifecycle against the memory and file stores
//! - `cart_payload` - Compatibility of the persisted payload format
//!
//! Shared fixtures live here so every test file builds products the same way.

use go_marketplace_core::{NewCartItem, Price, ProductId};

/// Storage key used by the default configuration.
pub const PRODUCTS_KEY: &str = "@GoMarketplace:products";

/// Parse a product id, panicking on invalid test input.
///
/// # Panics
///
/// Panics if `id` is blank.
#[must_use]
pub fn product_id(id: &str) -> ProductId {
    ProductId::parse(id).expect("valid test product id")
}

/// A product descriptor priced in cents.
#[must_use]
pub fn product(id: &str, title: &str, cents: i64) -> NewCartItem {
    NewCartItem::new(
        product_id(id),
        title,
        format!("https://cdn.example.com/{id}.png"),
        Price::from_cents(cents),
    )
}
