//! Persistence Boundary for Kickflip
//!
//! `Store` is the long-lived handle used for reads and single-row updates;
//! `StoreTx` scopes the one place that needs an all-or-nothing unit: order
//! creation (order row + line rows + stock decrements commit together or
//! not at all).
//!
//! Two backends: [`MemoryStore`] for dev and tests, [`PgStore`] on `sqlx`
//! for production.

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use kickflip_core::{Address, AddressForm, Id, NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, Product};

/// Storage-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to begin transaction: {0}")]
    Begin(String),

    #[error("failed to commit transaction: {0}")]
    Commit(String),

    #[error("failed to rollback transaction: {0}")]
    Rollback(String),

    #[error("transaction already completed")]
    Completed,

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Long-lived storage handle.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open an atomic unit of work for order creation.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn product(&self, id: Id) -> Result<Option<Product>, StoreError>;

    async fn products(&self) -> Result<Vec<Product>, StoreError>;

    async fn order(&self, id: Id) -> Result<Option<Order>, StoreError>;

    async fn order_lines(&self, order_id: Id) -> Result<Vec<OrderLine>, StoreError>;

    /// Persist an already-validated status. Transition legality is the
    /// caller's job (the domain state machine).
    async fn update_order_status(&self, id: Id, status: OrderStatus) -> Result<(), StoreError>;

    async fn set_tracking_code(&self, id: Id, code: &str) -> Result<(), StoreError>;

    async fn user_address(&self, user_id: Id) -> Result<Option<Address>, StoreError>;

    /// Create an address and attach it to the user, replacing any previous
    /// attachment.
    async fn attach_address(
        &self,
        user_id: Id,
        form: &AddressForm,
    ) -> Result<Address, StoreError>;
}

/// One atomic unit of work.
///
/// Dropping a `StoreTx` without calling [`StoreTx::commit`] must discard
/// every write made through it.
#[async_trait]
pub trait StoreTx: Send {
    /// Re-resolve a product inside the transaction. Cart snapshots are not
    /// trusted at checkout time.
    async fn product(&mut self, id: Id) -> Result<Option<Product>, StoreError>;

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, StoreError>;

    async fn insert_line(&mut self, line: NewOrderLine) -> Result<OrderLine, StoreError>;

    /// Guarded stock decrement: subtract `quantity` only if the remaining
    /// stock stays non-negative. Returns `false` (and writes nothing) when
    /// stock is insufficient, so concurrent checkouts cannot drive stock
    /// below zero.
    async fn reserve_stock(&mut self, product_id: Id, quantity: u32) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
