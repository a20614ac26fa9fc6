//! Cart line items and the ordered cart collection.
//!
//! [`Cart`] owns the two cart invariants:
//! - every line has `quantity >= 1` (a line reaching zero is removed)
//! - no two lines share a [`ProductId`]
//!
//! All mutation goes through [`Cart::add`], [`Cart::increment`] and
//! [`Cart::decrement`], so a `Cart` value can never violate them. Loading a
//! persisted list goes through [`Cart::from_items`], which repairs lists that
//! were written by something else.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A product as offered to the cart, before it has a quantity.
///
/// Extra fields in the input (such as a stray `quantity`) are ignored; a new
/// line always starts at quantity 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCartItem {
    pub id: ProductId,
    pub title: String,
    pub image_url: String,
    pub price: Price,
}

impl NewCartItem {
    /// Create a new product descriptor.
    #[must_use]
    pub fn new(
        id: ProductId,
        title: impl Into<String>,
        image_url: impl Into<String>,
        price: Price,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            image_url: image_url.into(),
            price,
        }
    }

    fn into_line(self) -> CartItem {
        CartItem {
            id: self.id,
            title: self.title,
            image_url: self.image_url,
            price: self.price,
            quantity: 1,
        }
    }
}

/// A line in the cart: a product plus the quantity desired.
///
/// Field names match the persisted payload:
/// `{"id", "title", "image_url", "price", "quantity"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub title: String,
    pub image_url: String,
    /// Unit price.
    pub price: Price,
    pub quantity: u32,
}

impl CartItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// What a successful mutation did to the targeted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    /// A new line was appended with quantity 1.
    Added,
    /// The line's quantity went up; carries the new quantity.
    Incremented(u32),
    /// The line's quantity went down; carries the new quantity.
    Decremented(u32),
    /// The line was at quantity 1 and has been removed.
    Removed,
    /// The line is already at `u32::MAX`; nothing changed.
    AtLimit,
}

impl LineChange {
    /// True when the cart was modified.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::AtLimit)
    }
}

/// Entries fixed up while building a cart from a stored list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repairs {
    /// Lines dropped because their quantity was zero.
    pub dropped_empty: Vec<ProductId>,
    /// Lines folded into an earlier line with the same id.
    pub merged_duplicates: Vec<ProductId>,
}

impl Repairs {
    /// True when the stored list already satisfied the cart invariants.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped_empty.is_empty() && self.merged_duplicates.is_empty()
    }
}

/// An ordered collection of cart lines. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from a stored list of lines.
    ///
    /// Lines with quantity 0 are dropped. A line whose id already appeared is
    /// merged into the first occurrence (quantities summed, first position kept).
    #[must_use]
    pub fn from_items(items: Vec<CartItem>) -> (Self, Repairs) {
        let mut cart = Self::new();
        let mut repairs = Repairs::default();

        for item in items {
            if item.quantity == 0 {
                repairs.dropped_empty.push(item.id);
                continue;
            }

            if let Some(existing) = cart.get_mut(&item.id) {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                repairs.merged_duplicates.push(item.id);
            } else {
                cart.items.push(item);
            }
        }

        (cart, repairs)
    }

    /// The lines in display order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Consumes the cart and returns its lines.
    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    /// Look up a line by product id.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    fn get_mut(&mut self, id: &ProductId) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|item| &item.id == id)
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Add one unit of a product.
    ///
    /// Appends a new line at quantity 1, or bumps the existing line for the
    /// same id. The descriptor's title, image and price are only used for a new
    /// line; an existing line keeps what it was added with.
    ///
    /// Returns [`LineChange::AtLimit`] without touching the cart when the
    /// existing line cannot grow any further.
    pub fn add(&mut self, item: NewCartItem) -> LineChange {
        if let Some(existing) = self.get_mut(&item.id) {
            bump(existing)
        } else {
            self.items.push(item.into_line());
            LineChange::Added
        }
    }

    /// Add one unit to an existing line.
    ///
    /// Returns `None` (leaving the cart untouched) if no line has this id, and
    /// [`LineChange::AtLimit`] if the line cannot grow any further.
    pub fn increment(&mut self, id: &ProductId) -> Option<LineChange> {
        self.get_mut(id).map(bump)
    }

    /// Remove one unit from an existing line, dropping the line at zero.
    ///
    /// Returns `None` (leaving the cart untouched) if no line has this id.
    pub fn decrement(&mut self, id: &ProductId) -> Option<LineChange> {
        let index = self.items.iter().position(|item| &item.id == id)?;
        let line = self.items.get_mut(index)?;

        if line.quantity > 1 {
            line.quantity -= 1;
            Some(LineChange::Decremented(line.quantity))
        } else {
            self.items.remove(index);
            Some(LineChange::Removed)
        }
    }
}

fn bump(line: &mut CartItem) -> LineChange {
    match line.quantity.checked_add(1) {
        Some(quantity) => {
            line.quantity = quantity;
            LineChange::Incremented(quantity)
        }
        None => LineChange::AtLimit,
    }
}
