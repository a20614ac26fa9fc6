//! Cart error types.
//!
//! Every failure is returned to the caller of the cart operation. None of them
//! are fatal to the session: a caller can show a notice and retry.

use go_marketplace_core::{ProductId, ProductIdError};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by [`CartSession`](crate::CartSession) operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// `increment` or `decrement` was called for a product that is not in the cart.
    #[error("Item not in cart: {0}")]
    NotInCart(ProductId),

    /// The line is already at the largest quantity a cart line can hold.
    #[error("Item quantity at limit: {0}")]
    QuantityLimit(ProductId),

    /// The product descriptor passed to `add` is malformed.
    #[error("Invalid item: {0}")]
    InvalidItem(#[from] ProductIdError),

    /// Reading the stored cart failed while opening the session.
    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    /// Writing the cart failed. The in-memory cart already reflects the change
    /// but may not survive a restart.
    #[error("Cart changed but could not be saved: {0}")]
    Persistence(#[source] StorageError),

    /// The stored payload is not a list of cart items.
    #[error("Stored cart is corrupt: {0}")]
    CorruptPayload(#[source] serde_json::Error),

    /// The cart could not be encoded for storage.
    #[error("Cart could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    /// The session has ended; open a new one.
    #[error("Cart session has ended")]
    SessionEnded,
}

impl CartError {
    /// True when the in-memory cart was updated even though this error was returned.
    #[must_use]
    pub const fn is_unsaved_change(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Encode(_))
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
