//! Cart commands backed by the file store.
//!
//! Each invocation opens a session on `CART_STORAGE_DIR`, applies at most one
//! change, prints the resulting cart and ends the session.

use std::fmt::Write as _;

use go_marketplace_cart::{CartConfig, CartError, CartSession, FileStore};
use go_marketplace_core::{Cart, NewCartItem, Price, ProductId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while running a cart command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Cart operation failed.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Price must not be negative.
    #[error("Invalid price: {0}")]
    NegativePrice(Decimal),

    /// Price has more decimal places than the stored cart keeps exactly.
    #[error("Invalid price: {0} (at most {MAX_PRICE_SCALE} decimal places)")]
    PricePrecision(Decimal),
}

/// Decimal places accepted for a unit price.
pub const MAX_PRICE_SCALE: u32 = 2;

/// Open a cart session on the configured storage directory.
///
/// # Errors
///
/// Returns an error if the stored cart cannot be read or parsed.
pub async fn open(config: &CartConfig) -> Result<CartSession<FileStore>, CommandError> {
    let store = FileStore::new(&config.storage_dir);
    tracing::debug!(dir = %store.dir().display(), "Opening cart");
    Ok(CartSession::open(store, config.storage_key()).await?)
}

/// Overwrite the stored cart with an empty one without reading it first.
///
/// # Errors
///
/// Returns an error if the storage directory cannot be written.
pub async fn clear(config: &CartConfig) -> Result<(), CommandError> {
    let store = FileStore::new(&config.storage_dir);
    CartSession::reset(&store, &config.storage_key()).await?;
    Ok(())
}

/// Add one unit of a product.
///
/// # Errors
///
/// Returns an error if the id or price is invalid, or if the cart cannot be saved.
/// Prices are limited to [`MAX_PRICE_SCALE`] decimal places so the stored
/// number reads back as the same amount.
pub async fn add(
    session: &CartSession<FileStore>,
    id: &str,
    title: String,
    image_url: String,
    price: Decimal,
) -> Result<(), CommandError> {
    if price.is_sign_negative() {
        return Err(CommandError::NegativePrice(price));
    }
    if price.normalize().scale() > MAX_PRICE_SCALE {
        return Err(CommandError::PricePrecision(price));
    }

    let id = ProductId::parse(id).map_err(CartError::from)?;
    let item = NewCartItem::new(id, title, image_url, Price::new(price));
    session.add(item).await?;
    Ok(())
}

/// Add one unit of a product already in the cart.
///
/// # Errors
///
/// Returns an error if the product is not in the cart or the cart cannot be saved.
pub async fn increment(session: &CartSession<FileStore>, id: &str) -> Result<(), CommandError> {
    let id = ProductId::parse(id).map_err(CartError::from)?;
    session.increment(&id).await?;
    Ok(())
}

/// Remove one unit of a product already in the cart.
///
/// # Errors
///
/// Returns an error if the product is not in the cart or the cart cannot be saved.
pub async fn decrement(session: &CartSession<FileStore>, id: &str) -> Result<(), CommandError> {
    let id = ProductId::parse(id).map_err(CartError::from)?;
    session.decrement(&id).await?;
    Ok(())
}

/// Print the cart to stdout.
#[allow(clippy::print_stdout)]
pub fn print(cart: &Cart) {
    print!("{}", render(cart));
}

/// Render the cart as a plain-text table.
#[must_use]
pub fn render(cart: &Cart) -> String {
    if cart.is_empty() {
        return "Cart is empty\n".to_string();
    }

    let mut out = String::new();
    for item in cart.items() {
        let _ = writeln!(
            out,
            "{:<16} {:<24} {:>4} x {:>10} = {:>10}",
            item.id.as_str(),
            item.title.as_str(),
            item.quantity,
            item.price.to_string(),
            item.line_total().to_string(),
        );
    }
    let _ = writeln!(
        out,
        "{} item(s), subtotal {}",
        cart.item_count(),
        cart.subtotal()
    );
    out
}
