//! Route handlers.
//!
//! Each handler takes the shared state plus whatever the ingress already
//! extracted (session id, user id, decoded form) and produces a full
//! response. Handlers never panic; every pipeline error goes through
//! [`respond::checkout_error`].

use http::StatusCode;
use kickflip_checkout::{CheckoutError, Confirmation};
use kickflip_core::{AddressForm, Cart, Id};
use serde::Deserialize;

use crate::respond::{checkout_error, json, see_other, HttpResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CartForm {
    pub product_id: Id,
    #[serde(default)]
    pub quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityForm {
    pub product_id: Id,
    pub quantity: u32,
}

/// The checkout form. All fields optional so a shopper with a stored
/// address can submit an empty form.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub region: String,
}

impl CheckoutForm {
    fn address(&self) -> AddressForm {
        AddressForm {
            street: self.street.clone(),
            locality: self.locality.clone(),
            region: self.region.clone(),
        }
    }
}

/// `token_ws` as the provider sends it back, via query string or form body.
#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub token_ws: Option<String>,
}

fn cart_json(cart: &Cart) -> serde_json::Value {
    let items: Vec<_> = cart
        .items()
        .map(|(product_id, item)| {
            serde_json::json!({
                "product_id": product_id,
                "name": item.name,
                "price": item.price,
                "quantity": item.quantity,
                "line_total": item.price * i64::from(item.quantity),
            })
        })
        .collect();
    serde_json::json!({ "items": items, "subtotal": cart.subtotal() })
}

// ----- Catalog -----

pub async fn products(state: &AppState) -> HttpResponse {
    match state.checkout.products().await {
        Ok(products) => json(StatusCode::OK, &products),
        Err(e) => checkout_error(&e),
    }
}

// ----- Cart -----

pub async fn view_cart(state: &AppState, sid: &str) -> HttpResponse {
    match state.checkout.cart(sid).await {
        Ok(cart) => json(StatusCode::OK, &cart_json(&cart)),
        Err(e) => checkout_error(&e),
    }
}

pub async fn add_to_cart(state: &AppState, sid: &str, form: CartForm) -> HttpResponse {
    let quantity = form.quantity.unwrap_or(1);
    match state
        .checkout
        .add_to_cart(sid, form.product_id, quantity)
        .await
    {
        Ok(cart) => {
            let name = cart
                .get(form.product_id)
                .map_or_else(String::new, |item| item.name.clone());
            see_other("/cart", Some(&format!("{name} added to your cart!")))
        }
        Err(e) => checkout_error(&e),
    }
}

pub async fn remove_from_cart(state: &AppState, sid: &str, form: CartForm) -> HttpResponse {
    match state.checkout.remove_from_cart(sid, form.product_id).await {
        Ok(_) => see_other("/cart", Some("Product removed from your cart.")),
        Err(e) => checkout_error(&e),
    }
}

pub async fn set_quantity(state: &AppState, sid: &str, form: QuantityForm) -> HttpResponse {
    match state
        .checkout
        .set_quantity(sid, form.product_id, form.quantity)
        .await
    {
        Ok(cart) => json(StatusCode::OK, &cart_json(&cart)),
        Err(e) => checkout_error(&e),
    }
}

// ----- Checkout -----

pub async fn checkout_form(state: &AppState, sid: &str, user: Id) -> HttpResponse {
    let cart = match state.checkout.cart(sid).await {
        Ok(cart) => cart,
        Err(e) => return checkout_error(&e),
    };
    if cart.is_empty() {
        return see_other("/cart", Some("Your cart is empty."));
    }

    let quote = state.checkout.quote(&cart);
    let address = match state.checkout.stored_address(user).await {
        Ok(address) => address,
        Err(e) => return checkout_error(&e),
    };

    json(
        StatusCode::OK,
        &serde_json::json!({
            "cart": cart_json(&cart),
            "quote": quote,
            "address": address,
        }),
    )
}

pub async fn place_order(
    state: &AppState,
    sid: &str,
    user: Id,
    form: CheckoutForm,
) -> HttpResponse {
    let address = form.address();
    let submitted = (!address.is_blank()).then_some(&address);

    match state.checkout.place_order(user, sid, submitted).await {
        Ok(order) => see_other(&format!("/pay/{}", order.id), None),
        // Validation problems re-render the form with the input retained.
        Err(e @ (CheckoutError::AddressRequired | CheckoutError::InvalidAddress(_))) => json(
            StatusCode::UNPROCESSABLE_ENTITY,
            &serde_json::json!({ "error": e.to_string(), "form": address }),
        ),
        Err(e) => checkout_error(&e),
    }
}

// ----- Payment -----

pub async fn pay_init(state: &AppState, user: Id, order_id: Id) -> HttpResponse {
    match state.checkout.payment_redirect(user, order_id).await {
        Ok(redirect) => json(
            StatusCode::OK,
            &serde_json::json!({ "url": redirect.url, "token": redirect.token }),
        ),
        Err(e) => checkout_error(&e),
    }
}

/// The provider's return redirect. No CSRF protection here on purpose: the
/// caller is the external provider, not a browser session of ours.
pub async fn pay_confirm(state: &AppState, sid: &str, params: TokenParams) -> HttpResponse {
    match state
        .checkout
        .confirm_payment(sid, params.token_ws.as_deref())
        .await
    {
        Ok(Confirmation::Approved(order)) => see_other(
            "/panel",
            Some(&format!(
                "Payment approved! Order #{} is on its way.",
                order.id
            )),
        ),
        Ok(Confirmation::Rejected { .. }) => {
            see_other("/panel", Some("The payment was rejected by the bank."))
        }
        Ok(Confirmation::Abandoned) => {
            see_other("/panel", Some("The purchase was cancelled or expired."))
        }
        Err(e) => checkout_error(&e),
    }
}

// ----- Orders -----

pub async fn order_detail(state: &AppState, user: Id, order_id: Id) -> HttpResponse {
    match state.checkout.order_detail(user, order_id).await {
        Ok((order, lines)) => json(
            StatusCode::OK,
            &serde_json::json!({ "order": order, "lines": lines }),
        ),
        Err(e) => checkout_error(&e),
    }
}
