//! Session-store capability.
//!
//! The cart never lives in ambient request state; whoever runs the checkout
//! flow is handed a [`SessionStore`] and addresses carts by session id. The
//! cart's serde form is a flat JSON object, so any key-value backend
//! (in-process map, Redis, signed cookie) can implement this.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use kickflip_core::Cart;

/// Session backend errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),
}

/// Per-visitor key-value state holding the cart.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The visitor's cart; an empty cart when the session has none yet.
    async fn cart(&self, session_id: &str) -> Result<Cart, SessionError>;

    async fn put_cart(&self, session_id: &str, cart: &Cart) -> Result<(), SessionError>;

    async fn clear_cart(&self, session_id: &str) -> Result<(), SessionError>;
}

/// In-process [`SessionStore`].
///
/// Carts are held in their serialized form to keep the backend honest about
/// the wire format (a Redis implementation would store the same bytes).
#[derive(Debug, Clone, Default)]
pub struct MemorySessions {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, SessionError> {
        self.inner
            .lock()
            .map_err(|_| SessionError::Backend("session store lock poisoned".into()))
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn cart(&self, session_id: &str) -> Result<Cart, SessionError> {
        match self.lock()?.get(session_id) {
            Some(raw) => {
                serde_json::from_str(raw).map_err(|e| SessionError::Backend(e.to_string()))
            }
            None => Ok(Cart::new()),
        }
    }

    async fn put_cart(&self, session_id: &str, cart: &Cart) -> Result<(), SessionError> {
        let raw = serde_json::to_string(cart).map_err(|e| SessionError::Backend(e.to_string()))?;
        self.lock()?.insert(session_id.to_string(), raw);
        Ok(())
    }

    async fn clear_cart(&self, session_id: &str) -> Result<(), SessionError> {
        self.lock()?.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kickflip_core::Product;

    #[tokio::test]
    async fn carts_round_trip_per_session() {
        let sessions = MemorySessions::new();
        let mut cart = Cart::new();
        cart.add(&Product::new(1, "Griptape", 4990, 30), 2).unwrap();

        sessions.put_cart("sid-a", &cart).await.unwrap();

        assert_eq!(sessions.cart("sid-a").await.unwrap(), cart);
        assert!(sessions.cart("sid-b").await.unwrap().is_empty());

        sessions.clear_cart("sid-a").await.unwrap();
        assert!(sessions.cart("sid-a").await.unwrap().is_empty());
    }
}
