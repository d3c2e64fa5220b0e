//! Checkout Orchestrator for Kickflip
//!
//! Turns a session cart into a persisted order and walks it through the
//! payment handshake. One struct, [`Checkout`], owns the three injected
//! capabilities (store, session store, payment gateway) and every
//! operation of the pipeline:
//!
//! - cart management (`add_to_cart`, `set_quantity`, `remove_from_cart`)
//! - atomic order placement (`place_order`)
//! - payment initiation and reconciliation (`payment_redirect`,
//!   `confirm_payment`)
//! - fulfillment transitions (`mark_shipped`, `mark_delivered`)

pub mod session;

pub use session::{MemorySessions, SessionError, SessionStore};

use std::sync::Arc;

use kickflip_core::{
    AddressError, AddressForm, Cart, CartError, Id, Money, NewOrder, NewOrderLine, Order,
    OrderLine, OrderStatus, StatusError,
};
use kickflip_payment::{PaymentError, PaymentGateway, RedirectInfo};
use kickflip_store::{Store, StoreError, StoreTx};
use serde::Serialize;

/// Flat shipping fee in pesos, applied to every order.
pub const SHIPPING_COST: Money = 5000;

/// Checkout pipeline errors. See the crate docs for which ones are
/// shopper-recoverable; none of them are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("a shipping address is required")]
    AddressRequired,

    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("product {0} no longer exists")]
    ProductNotFound(Id),

    #[error("not enough stock for product {product_id} (requested {requested})")]
    InsufficientStock { product_id: Id, requested: u32 },

    #[error("no such order: {0}")]
    UnknownOrder(Id),

    #[error("order belongs to another user")]
    Forbidden,

    #[error("order is not payable in status '{0}'")]
    NotPayable(OrderStatus),

    #[error("provider returned an unusable buy order: {0}")]
    MalformedBuyOrder(String),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Price breakdown shown on the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
}

/// What came of a provider return redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Provider authorized the payment: the order is now `paid` and the
    /// session cart has been cleared.
    Approved(Order),
    /// Provider declined. The order stays `pending` (stock already
    /// decremented, no automatic retry or deletion) and the cart is kept.
    Rejected { status: String },
    /// The shopper came back without a token: the attempt was abandoned or
    /// expired. Nothing changed.
    Abandoned,
}

/// The checkout pipeline with its injected collaborators.
#[derive(Clone)]
pub struct Checkout {
    store: Arc<dyn Store>,
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<dyn PaymentGateway>,
    shipping_cost: Money,
    return_url: String,
}

impl Checkout {
    pub fn new(
        store: Arc<dyn Store>,
        sessions: Arc<dyn SessionStore>,
        gateway: Arc<dyn PaymentGateway>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sessions,
            gateway,
            shipping_cost: SHIPPING_COST,
            return_url: return_url.into(),
        }
    }

    /// Override the flat shipping fee (tests, promotions).
    pub fn with_shipping_cost(mut self, shipping_cost: Money) -> Self {
        self.shipping_cost = shipping_cost;
        self
    }

    /// The catalog as checkout sees it.
    pub async fn products(&self) -> Result<Vec<kickflip_core::Product>, CheckoutError> {
        Ok(self.store.products().await?)
    }

    // ----- Cart management -----

    pub async fn cart(&self, session_id: &str) -> Result<Cart, CheckoutError> {
        Ok(self.sessions.cart(session_id).await?)
    }

    /// Add a product to the session cart with a fresh price/name snapshot.
    /// Overwrites any existing entry for the product.
    pub async fn add_to_cart(
        &self,
        session_id: &str,
        product_id: Id,
        quantity: u32,
    ) -> Result<Cart, CheckoutError> {
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))?;

        let mut cart = self.sessions.cart(session_id).await?;
        cart.add(&product, quantity)?;
        self.sessions.put_cart(session_id, &cart).await?;

        tracing::debug!(product_id, quantity, "cart add");
        Ok(cart)
    }

    pub async fn set_quantity(
        &self,
        session_id: &str,
        product_id: Id,
        quantity: u32,
    ) -> Result<Cart, CheckoutError> {
        let mut cart = self.sessions.cart(session_id).await?;
        cart.update_quantity(product_id, quantity)?;
        self.sessions.put_cart(session_id, &cart).await?;
        Ok(cart)
    }

    pub async fn remove_from_cart(
        &self,
        session_id: &str,
        product_id: Id,
    ) -> Result<Cart, CheckoutError> {
        let mut cart = self.sessions.cart(session_id).await?;
        cart.remove(product_id);
        self.sessions.put_cart(session_id, &cart).await?;
        Ok(cart)
    }

    // ----- Order placement -----

    /// Price breakdown for a cart. Pure.
    pub fn quote(&self, cart: &Cart) -> Quote {
        let subtotal = cart.subtotal();
        Quote {
            subtotal,
            shipping: self.shipping_cost,
            total: subtotal + self.shipping_cost,
        }
    }

    /// The user's stored shipping address, for form prefill.
    pub async fn stored_address(
        &self,
        user_id: Id,
    ) -> Result<Option<kickflip_core::Address>, CheckoutError> {
        Ok(self.store.user_address(user_id).await?)
    }

    /// Materialize the session cart into a `pending` order.
    ///
    /// The order row, every order line, and every stock decrement commit as
    /// one unit; any failure rolls the whole step back. The cart is left in
    /// place; it is only cleared once the payment is confirmed.
    pub async fn place_order(
        &self,
        user_id: Id,
        session_id: &str,
        address: Option<&AddressForm>,
    ) -> Result<Order, CheckoutError> {
        let cart = self.sessions.cart(session_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        // Stored address wins; otherwise a valid submission is required.
        if self.store.user_address(user_id).await?.is_none() {
            let form = address
                .filter(|form| !form.is_blank())
                .ok_or(CheckoutError::AddressRequired)?;
            let form = form.validate()?;
            self.store.attach_address(user_id, &form).await?;
        }

        let total = cart.subtotal() + self.shipping_cost;

        let mut tx = self.store.begin().await?;
        let placed = Self::materialize(tx.as_mut(), user_id, &cart, total).await;
        match placed {
            Ok(order) => {
                tx.commit().await?;
                tracing::info!(order_id = order.id, total, lines = cart.len(), "order placed");
                Ok(order)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::error!(error = %rb, "rollback failed after checkout error");
                }
                Err(e)
            }
        }
    }

    async fn materialize(
        tx: &mut dyn StoreTx,
        user_id: Id,
        cart: &Cart,
        total: Money,
    ) -> Result<Order, CheckoutError> {
        let order = tx.insert_order(NewOrder { user_id, total }).await?;

        for (product_id, item) in cart.items() {
            // A session backend could hand back an entry the cart type would
            // never produce; a zero-quantity line must not reach the order.
            if item.quantity == 0 {
                return Err(CartError::InvalidQuantity(0).into());
            }

            // Re-resolve inside the transaction; the snapshot id may be
            // stale if the product was deleted since it was added.
            let product = tx
                .product(product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(product_id))?;

            tx.insert_line(NewOrderLine {
                order_id: order.id,
                product_id: product.id,
                quantity: item.quantity,
                // Snapshot price from the cart, not the live catalog price.
                unit_price: item.price,
            })
            .await?;

            if !tx.reserve_stock(product_id, item.quantity).await? {
                return Err(CheckoutError::InsufficientStock {
                    product_id,
                    requested: item.quantity,
                });
            }
        }

        Ok(order)
    }

    // ----- Payment -----

    /// Create the provider transaction for a pending order and return the
    /// hosted redirect. Order state is untouched; a provider failure only
    /// surfaces as an error.
    pub async fn payment_redirect(
        &self,
        user_id: Id,
        order_id: Id,
    ) -> Result<RedirectInfo, CheckoutError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;
        if order.user_id != user_id {
            return Err(CheckoutError::Forbidden);
        }
        if order.status != OrderStatus::Pending {
            return Err(CheckoutError::NotPayable(order.status));
        }

        Ok(self.gateway.initiate(&order, &self.return_url).await?)
    }

    /// Handle the provider's return redirect.
    ///
    /// No token means the attempt was abandoned; nothing changes. Otherwise
    /// the transaction is committed with the provider and an `AUTHORIZED`
    /// verdict moves the order `pending -> paid` and clears the session
    /// cart. Any other verdict leaves order and cart untouched.
    pub async fn confirm_payment(
        &self,
        session_id: &str,
        token: Option<&str>,
    ) -> Result<Confirmation, CheckoutError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(Confirmation::Abandoned),
        };

        let result = self.gateway.confirm(token).await?;

        if let kickflip_payment::ProviderStatus::Rejected(status) = result.status {
            tracing::warn!(buy_order = %result.buy_order, %status, "payment rejected");
            return Ok(Confirmation::Rejected { status });
        }

        let order_id: Id = result
            .buy_order
            .parse()
            .map_err(|_| CheckoutError::MalformedBuyOrder(result.buy_order.clone()))?;
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;

        let paid = order.status.transition(OrderStatus::Paid)?;
        self.store.update_order_status(order.id, paid).await?;
        self.sessions.clear_cart(session_id).await?;

        tracing::info!(order_id = order.id, "payment confirmed");
        Ok(Confirmation::Approved(Order {
            status: paid,
            ..order
        }))
    }

    // ----- Fulfillment (administrative) -----

    pub async fn mark_shipped(
        &self,
        order_id: Id,
        tracking_code: &str,
    ) -> Result<Order, CheckoutError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;
        let shipped = order.status.transition(OrderStatus::Shipped)?;
        self.store.update_order_status(order_id, shipped).await?;
        self.store.set_tracking_code(order_id, tracking_code).await?;

        Ok(Order {
            status: shipped,
            tracking_code: Some(tracking_code.to_string()),
            ..order
        })
    }

    pub async fn mark_delivered(&self, order_id: Id) -> Result<Order, CheckoutError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;
        let delivered = order.status.transition(OrderStatus::Delivered)?;
        self.store.update_order_status(order_id, delivered).await?;

        Ok(Order {
            status: delivered,
            ..order
        })
    }

    // ----- Order detail -----

    /// An order with its lines, owner-checked.
    pub async fn order_detail(
        &self,
        user_id: Id,
        order_id: Id,
    ) -> Result<(Order, Vec<OrderLine>), CheckoutError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;
        if order.user_id != user_id {
            return Err(CheckoutError::Forbidden);
        }
        let lines = self.store.order_lines(order_id).await?;
        Ok((order, lines))
    }
}
