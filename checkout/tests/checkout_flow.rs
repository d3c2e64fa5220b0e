//! End-to-end checkout pipeline tests against the in-memory store, the
//! in-memory session store, and the scripted payment gateway.

use std::sync::Arc;

use kickflip_checkout::{Checkout, CheckoutError, Confirmation, MemorySessions, SessionStore};
use kickflip_core::{AddressForm, OrderStatus, Product};
use kickflip_payment::mock::MockGateway;
use kickflip_store::{MemoryStore, Store};

const USER: i64 = 7;
const SID: &str = "sid-test";

struct Rig {
    store: Arc<MemoryStore>,
    sessions: Arc<MemorySessions>,
    gateway: Arc<MockGateway>,
    checkout: Checkout,
}

fn rig() -> Rig {
    let store = Arc::new(MemoryStore::with_products([
        Product::new(1, "Maple Deck 8.0", 1000, 10),
        Product::new(2, "54mm Wheels", 500, 4),
    ]));
    let sessions = Arc::new(MemorySessions::new());
    let gateway = Arc::new(MockGateway::new());
    let checkout = Checkout::new(
        store.clone(),
        sessions.clone(),
        gateway.clone(),
        "http://localhost:3000/pay/confirm",
    );
    Rig {
        store,
        sessions,
        gateway,
        checkout,
    }
}

fn address() -> AddressForm {
    AddressForm {
        street: "Av. Skate 123".into(),
        locality: "Providencia".into(),
        region: "RM".into(),
    }
}

async fn fill_cart(rig: &Rig) {
    rig.checkout.add_to_cart(SID, 1, 2).await.unwrap();
    rig.checkout.add_to_cart(SID, 2, 1).await.unwrap();
}

#[tokio::test]
async fn empty_cart_checkout_creates_nothing() {
    let rig = rig();

    let err = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert!(rig.store.order(1).await.unwrap().is_none());
}

#[tokio::test]
async fn place_order_creates_order_lines_and_decrements_stock() {
    let rig = rig();
    fill_cart(&rig).await;

    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, 2 * 1000 + 500 + 5000);

    let lines = rig.store.order_lines(order.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(rig.store.product(1).await.unwrap().unwrap().stock, 8);
    assert_eq!(rig.store.product(2).await.unwrap().unwrap().stock, 3);

    // Address got attached on the way through.
    let attached = rig.store.user_address(USER).await.unwrap().unwrap();
    assert_eq!(attached.street, "Av. Skate 123");

    // The cart survives until the payment is confirmed.
    assert!(!rig.sessions.cart(SID).await.unwrap().is_empty());
}

#[tokio::test]
async fn stored_address_wins_over_the_form() {
    let rig = rig();
    fill_cart(&rig).await;
    rig.store.attach_address(USER, &address()).await.unwrap();

    // No form submitted; the stored address carries the checkout.
    rig.checkout.place_order(USER, SID, None).await.unwrap();
}

#[tokio::test]
async fn missing_address_blocks_checkout() {
    let rig = rig();
    fill_cart(&rig).await;

    let err = rig.checkout.place_order(USER, SID, None).await.unwrap_err();
    assert!(matches!(err, CheckoutError::AddressRequired));

    let bad = AddressForm {
        street: "Av. Skate 123".into(),
        locality: "  ".into(),
        region: "RM".into(),
    };
    let err = rig
        .checkout
        .place_order(USER, SID, Some(&bad))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidAddress(_)));

    // Nothing persisted either way.
    assert!(rig.store.order(1).await.unwrap().is_none());
    assert_eq!(rig.store.product(1).await.unwrap().unwrap().stock, 10);
}

#[tokio::test]
async fn vanished_product_rolls_back_everything() {
    let rig = rig();
    fill_cart(&rig).await;

    // Product 2 disappears from the catalog after it was snapshotted into
    // the cart. (The memory store has no delete; a cart entry pointing at an
    // id that never existed exercises the same path.)
    rig.checkout.add_to_cart(SID, 1, 2).await.unwrap();
    let mut cart = rig.sessions.cart(SID).await.unwrap();
    let stale = Product::new(99, "Discontinued Deck", 1234, 1);
    cart.add(&stale, 1).unwrap();
    rig.sessions.put_cart(SID, &cart).await.unwrap();

    let err = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::ProductNotFound(99)));
    // Full rollback: no order, no lines, other products' stock untouched.
    assert!(rig.store.order(1).await.unwrap().is_none());
    assert!(rig.store.order_lines(1).await.unwrap().is_empty());
    assert_eq!(rig.store.product(1).await.unwrap().unwrap().stock, 10);
    assert_eq!(rig.store.product(2).await.unwrap().unwrap().stock, 4);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_everything() {
    let rig = rig();
    rig.checkout.add_to_cart(SID, 1, 2).await.unwrap();
    rig.checkout.add_to_cart(SID, 2, 1).await.unwrap();
    rig.checkout.set_quantity(SID, 2, 5).await.unwrap(); // only 4 in stock

    let err = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::InsufficientStock {
            product_id: 2,
            requested: 5
        }
    ));
    assert!(rig.store.order(1).await.unwrap().is_none());
    assert_eq!(rig.store.product(1).await.unwrap().unwrap().stock, 10);
    assert_eq!(rig.store.product(2).await.unwrap().unwrap().stock, 4);
}

#[tokio::test]
async fn zero_quantity_session_entry_cannot_become_an_order() {
    let rig = rig();

    // An entry the cart type itself refuses to create, but which a session
    // backend could still hand back as stored data.
    let cart: kickflip_core::Cart = serde_json::from_value(serde_json::json!({
        "1": {"quantity": 0, "price": 1000, "name": "Maple Deck 8.0"}
    }))
    .unwrap();
    rig.sessions.put_cart(SID, &cart).await.unwrap();

    let err = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Cart(kickflip_core::CartError::InvalidQuantity(0))
    ));
    assert!(rig.store.order(1).await.unwrap().is_none());
    assert!(rig.store.order_lines(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn order_lines_carry_the_cart_snapshot_price() {
    let rig = rig();

    // The shopper added the deck when it cost 900; the catalog now says
    // 1000. The order must charge what the shopper saw.
    let mut cart = kickflip_core::Cart::new();
    cart.add(&Product::new(1, "Maple Deck 8.0", 900, 10), 2).unwrap();
    rig.sessions.put_cart(SID, &cart).await.unwrap();

    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    assert_eq!(order.total, 2 * 900 + 5000);
    let lines = rig.store.order_lines(order.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].unit_price, 900);
    assert_eq!(
        lines
            .iter()
            .map(|l| l.unit_price * i64::from(l.quantity))
            .sum::<i64>()
            + 5000,
        order.total
    );
}

#[tokio::test]
async fn authorized_confirmation_marks_paid_and_clears_cart() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    let redirect = rig.checkout.payment_redirect(USER, order.id).await.unwrap();
    assert!(!redirect.token.is_empty());

    let confirmation = rig
        .checkout
        .confirm_payment(SID, Some(&redirect.token))
        .await
        .unwrap();

    match confirmation {
        Confirmation::Approved(paid) => assert_eq!(paid.status, OrderStatus::Paid),
        other => panic!("expected approval, got {other:?}"),
    }
    assert_eq!(
        rig.store.order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Paid
    );
    assert!(rig.sessions.cart(SID).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_confirmation_leaves_order_pending_and_cart_intact() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    let redirect = rig.checkout.payment_redirect(USER, order.id).await.unwrap();
    rig.gateway.script_status(&redirect.token, "FAILED");

    let confirmation = rig
        .checkout
        .confirm_payment(SID, Some(&redirect.token))
        .await
        .unwrap();

    assert_eq!(
        confirmation,
        Confirmation::Rejected {
            status: "FAILED".into()
        }
    );
    assert_eq!(
        rig.store.order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Pending
    );
    assert!(!rig.sessions.cart(SID).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_token_is_an_abandoned_attempt() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    assert_eq!(
        rig.checkout.confirm_payment(SID, None).await.unwrap(),
        Confirmation::Abandoned
    );
    assert_eq!(
        rig.checkout.confirm_payment(SID, Some("")).await.unwrap(),
        Confirmation::Abandoned
    );
    assert_eq!(
        rig.store.order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn gateway_failure_during_confirm_changes_nothing() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    let redirect = rig.checkout.payment_redirect(USER, order.id).await.unwrap();
    rig.gateway.script_error(&redirect.token, "timeout");

    let err = rig
        .checkout
        .confirm_payment(SID, Some(&redirect.token))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Payment(_)));
    assert_eq!(
        rig.store.order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Pending
    );
    assert!(!rig.sessions.cart(SID).await.unwrap().is_empty());
}

#[tokio::test]
async fn gateway_failure_during_initiate_changes_nothing() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    rig.gateway.fail_initiate();
    let err = rig
        .checkout
        .payment_redirect(USER, order.id)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Payment(_)));
    assert_eq!(
        rig.store.order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn double_confirmation_is_rejected_by_the_state_machine() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    let redirect = rig.checkout.payment_redirect(USER, order.id).await.unwrap();
    rig.checkout
        .confirm_payment(SID, Some(&redirect.token))
        .await
        .unwrap();

    // A replayed return redirect must not re-transition the order.
    let err = rig
        .checkout
        .confirm_payment(SID, Some(&redirect.token))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Status(_)));
}

#[tokio::test]
async fn another_users_order_cannot_be_paid_or_viewed() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    let err = rig.checkout.payment_redirect(99, order.id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Forbidden));

    let err = rig.checkout.order_detail(99, order.id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Forbidden));
}

#[tokio::test]
async fn fulfillment_walks_paid_shipped_delivered() {
    let rig = rig();
    fill_cart(&rig).await;
    let order = rig
        .checkout
        .place_order(USER, SID, Some(&address()))
        .await
        .unwrap();

    // Shipping a pending order is illegal.
    let err = rig.checkout.mark_shipped(order.id, "STK-001").await.unwrap_err();
    assert!(matches!(err, CheckoutError::Status(_)));

    let redirect = rig.checkout.payment_redirect(USER, order.id).await.unwrap();
    rig.checkout
        .confirm_payment(SID, Some(&redirect.token))
        .await
        .unwrap();

    let shipped = rig.checkout.mark_shipped(order.id, "STK-001").await.unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.tracking_code.as_deref(), Some("STK-001"));

    let delivered = rig.checkout.mark_delivered(order.id).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);

    // A delivered order is no longer payable.
    let err = rig.checkout.payment_redirect(USER, order.id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::NotPayable(_)));
}
