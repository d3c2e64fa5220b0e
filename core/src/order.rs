//! Orders and the order lifecycle state machine.
//!
//! The status field is an explicit enum with a transition table, not a free
//! string: every mutation goes through [`OrderStatus::transition`], which
//! rejects anything the table does not list (e.g. `paid -> pending`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Id, Money};

/// Order lifecycle status.
///
/// `pending -> paid` happens on payment confirmation; `paid -> shipped ->
/// delivered` are fulfillment transitions driven by administrative action.
/// A rejected payment leaves the order `pending` with no automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
}

impl OrderStatus {
    /// The transition table. Anything not listed is illegal.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Paid, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    /// Validated transition.
    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus, StatusError> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(StatusError::Illegal { from: self, to: next })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Illegal state machine transitions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("illegal order transition: {from} -> {to}")]
    Illegal { from: OrderStatus, to: OrderStatus },
}

/// A persisted purchase record.
///
/// `total` is fixed at creation time (snapshot subtotal plus shipping) and
/// never recomputed, so later catalog price changes cannot move it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total: Money,
    pub tracking_code: Option<String>,
}

/// Insert payload for a new order. Status starts `pending`, timestamp is
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: Id,
    pub total: Money,
}

/// One purchased product inside an order: quantity plus the unit price the
/// shopper actually saw, copied from the cart snapshot. Immutable after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Id,
    pub order_id: Id,
    pub product_id: Id,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Insert payload for a new order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub order_id: Id,
    pub product_id: Id,
    pub quantity: u32,
    pub unit_price: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let status = OrderStatus::Pending;
        let status = status.transition(OrderStatus::Paid).unwrap();
        let status = status.transition(OrderStatus::Shipped).unwrap();
        let status = status.transition(OrderStatus::Delivered).unwrap();
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn unlisted_transitions_are_rejected() {
        // In particular: a paid order can never go back to pending.
        assert_eq!(
            OrderStatus::Paid.transition(OrderStatus::Pending),
            Err(StatusError::Illegal {
                from: OrderStatus::Paid,
                to: OrderStatus::Pending,
            })
        );
        assert!(OrderStatus::Pending
            .transition(OrderStatus::Shipped)
            .is_err());
        assert!(OrderStatus::Delivered
            .transition(OrderStatus::Delivered)
            .is_err());
        assert!(OrderStatus::Pending.transition(OrderStatus::Pending).is_err());
    }

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }
}
