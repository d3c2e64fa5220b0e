//! Payment Gateway Adapter for Kickflip
//!
//! Wraps the external provider's two-phase transaction handshake behind the
//! narrow [`PaymentGateway`] trait so the provider is swappable and mockable:
//!
//! 1. `initiate` creates a provider transaction and yields a hosted redirect
//!    URL plus an opaque token; the shopper pays on the provider's site.
//! 2. `confirm` commits the transaction when the provider sends the shopper
//!    back with the token, and reports whether it was authorized.
//!
//! The wire shape follows Webpay Plus: see [`webpay`]. Tests use
//! [`mock::MockGateway`].

pub mod mock;
pub mod webpay;

pub use webpay::{WebpayConfig, WebpayGateway};

use async_trait::async_trait;
use kickflip_core::Order;

/// Errors at the provider boundary. All of them surface to the shopper as a
/// message and never mutate order state.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("could not reach payment provider: {0}")]
    Connect(String),

    #[error("payment provider returned {code}: {body}")]
    Provider { code: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Where to send the shopper to complete payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInfo {
    /// Provider-hosted payment page.
    pub url: String,
    /// Opaque transaction token, posted to the payment page and echoed back
    /// on the return redirect as `token_ws`.
    pub token: String,
}

/// Provider verdict on a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// The literal `AUTHORIZED` status.
    Authorized,
    /// Any other status, carried verbatim for the log line.
    Rejected(String),
}

impl ProviderStatus {
    pub fn from_raw(raw: &str) -> Self {
        if raw == "AUTHORIZED" {
            ProviderStatus::Authorized
        } else {
            ProviderStatus::Rejected(raw.to_string())
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, ProviderStatus::Authorized)
    }
}

/// Outcome of committing a transaction with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// The buy-order identifier the provider echoes back; this is the order
    /// id as a string and is what links the confirmation to the order.
    pub buy_order: String,
    pub status: ProviderStatus,
}

/// The narrow seam between checkout and the external provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a provider transaction for `order` and return the redirect.
    /// `return_url` is where the provider sends the shopper afterwards.
    async fn initiate(&self, order: &Order, return_url: &str)
        -> Result<RedirectInfo, PaymentError>;

    /// Commit the transaction identified by `token` and report the verdict.
    async fn confirm(&self, token: &str) -> Result<PaymentResult, PaymentError>;
}
