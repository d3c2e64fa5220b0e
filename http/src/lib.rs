//! # HTTP Ingress for Kickflip
//!
//! Wires the checkout pipeline to HTTP: a `matchit` route table served by a
//! Hyper 1.0 connection loop, with form/query decoding via
//! `serde_urlencoded` and JSON responses. Templating is deliberately absent;
//! user-facing messages travel as a `msg` query parameter on `303` redirects
//! the way flash messages would.
//!
//! Visitor identity is a `sid` cookie (minted on first contact);
//! authenticated identity is the trusted `x-user-id` header; real
//! authentication sits in front of this service.

pub mod handlers;
pub mod ingress;
pub mod respond;

pub use ingress::{serve, AppRouter};

use kickflip_checkout::Checkout;

/// Shared per-request resources.
#[derive(Clone)]
pub struct AppState {
    pub checkout: Checkout,
}

impl AppState {
    pub fn new(checkout: Checkout) -> Self {
        Self { checkout }
    }
}
