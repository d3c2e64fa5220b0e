//! Scripted gateway for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kickflip_core::Order;

use crate::{PaymentError, PaymentGateway, PaymentResult, ProviderStatus, RedirectInfo};

/// A [`PaymentGateway`] test double.
///
/// `initiate` hands out tokens `tok-1`, `tok-2`, ... with the buy order
/// recorded, so a later `confirm` of that token reports `AUTHORIZED` for the
/// right order by default. Individual tokens can be scripted to reject or
/// fail instead.
#[derive(Default)]
pub struct MockGateway {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_token: u64,
    issued: HashMap<String, String>,
    scripted: HashMap<String, Script>,
    initiate_fails: bool,
}

enum Script {
    Status(String),
    Error(String),
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `initiate` call fail as if the provider were unreachable.
    pub fn fail_initiate(&self) {
        self.inner.lock().unwrap().initiate_fails = true;
    }

    /// Script `confirm(token)` to report the given provider status.
    pub fn script_status(&self, token: &str, status: &str) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .insert(token.to_string(), Script::Status(status.to_string()));
    }

    /// Script `confirm(token)` to fail with a connection error.
    pub fn script_error(&self, token: &str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .insert(token.to_string(), Script::Error(message.to_string()));
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate(
        &self,
        order: &Order,
        _return_url: &str,
    ) -> Result<RedirectInfo, PaymentError> {
        let mut state = self.inner.lock().unwrap();
        if state.initiate_fails {
            return Err(PaymentError::Connect("provider unreachable".into()));
        }

        state.next_token += 1;
        let token = format!("tok-{}", state.next_token);
        state.issued.insert(token.clone(), order.id.to_string());

        Ok(RedirectInfo {
            url: format!("https://pay.example/webpay?token={token}"),
            token,
        })
    }

    async fn confirm(&self, token: &str) -> Result<PaymentResult, PaymentError> {
        let state = self.inner.lock().unwrap();

        let buy_order = state
            .issued
            .get(token)
            .cloned()
            .ok_or_else(|| PaymentError::Malformed(format!("unknown token: {token}")))?;

        match state.scripted.get(token) {
            Some(Script::Error(message)) => Err(PaymentError::Connect(message.clone())),
            Some(Script::Status(status)) => Ok(PaymentResult {
                buy_order,
                status: ProviderStatus::from_raw(status),
            }),
            None => Ok(PaymentResult {
                buy_order,
                status: ProviderStatus::Authorized,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: kickflip_core::Id) -> Order {
        Order {
            id,
            user_id: 7,
            created_at: chrono::Utc::now(),
            status: kickflip_core::OrderStatus::Pending,
            total: 24990,
            tracking_code: None,
        }
    }

    #[tokio::test]
    async fn issued_tokens_confirm_authorized_for_their_order() {
        let gateway = MockGateway::new();

        let first = gateway.initiate(&order(11), "http://r").await.unwrap();
        let second = gateway.initiate(&order(12), "http://r").await.unwrap();
        assert_ne!(first.token, second.token);

        let result = gateway.confirm(&second.token).await.unwrap();
        assert_eq!(result.buy_order, "12");
        assert!(result.status.is_authorized());
    }

    #[tokio::test]
    async fn scripts_override_the_default_outcome() {
        let gateway = MockGateway::new();
        let redirect = gateway.initiate(&order(11), "http://r").await.unwrap();

        gateway.script_status(&redirect.token, "FAILED");
        let result = gateway.confirm(&redirect.token).await.unwrap();
        assert_eq!(result.status, ProviderStatus::Rejected("FAILED".into()));

        gateway.script_error(&redirect.token, "timed out");
        assert!(matches!(
            gateway.confirm(&redirect.token).await,
            Err(PaymentError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn unknown_tokens_and_scripted_outages_fail() {
        let gateway = MockGateway::new();
        assert!(matches!(
            gateway.confirm("tok-99").await,
            Err(PaymentError::Malformed(_))
        ));

        gateway.fail_initiate();
        assert!(matches!(
            gateway.initiate(&order(11), "http://r").await,
            Err(PaymentError::Connect(_))
        ));
    }
}
