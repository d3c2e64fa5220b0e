//! Kickflip Core - Checkout Domain Model
//!
//! Protocol-agnostic domain types for the skate-shop checkout pipeline:
//! catalog snapshots, the session cart, shipping addresses, and the order
//! lifecycle state machine. No storage, no network - those live in
//! `kickflip-store` and `kickflip-payment`.

pub mod address;
pub mod cart;
pub mod order;
pub mod product;

pub use address::{Address, AddressError, AddressForm};
pub use cart::{Cart, CartError, CartItem};
pub use order::{NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, StatusError};
pub use product::Product;

/// Relational key type shared by all persisted entities.
pub type Id = i64;

/// Monetary amounts in whole Chilean pesos.
///
/// CLP is an integral currency and the payment provider takes integer
/// amounts, so no fractional representation is carried anywhere.
pub type Money = i64;
