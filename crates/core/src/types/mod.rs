//! Core types for GoMarketplace.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod price;

pub use cart::{Cart, CartItem, LineChange, NewCartItem, Repairs};
pub use id::{ProductId, ProductIdError};
pub use price::Price;
