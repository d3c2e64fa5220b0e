//! Webpay Plus REST client.
//!
//! Create: `POST {base}/transactions` with the commerce credentials in the
//! `Tbk-Api-Key-Id` / `Tbk-Api-Key-Secret` headers. Commit:
//! `PUT {base}/transactions/{token}`. Both calls are synchronous from the
//! request's point of view; no retry logic lives here.

use async_trait::async_trait;
use kickflip_core::Order;
use serde::{Deserialize, Serialize};

use crate::{PaymentError, PaymentGateway, PaymentResult, ProviderStatus, RedirectInfo};

/// Transbank's published integration (sandbox) environment.
pub const INTEGRATION_BASE_URL: &str =
    "https://webpay3gint.transbank.cl/rswebpaytransaction/api/webpay/v1.2";
pub const INTEGRATION_COMMERCE_CODE: &str = "597055555532";
pub const INTEGRATION_API_KEY: &str =
    "579B532A7440BB0C9079DED94D31EA1615BACEB56610332264630D42D0A36B1C";

/// Provider endpoint and credentials.
#[derive(Debug, Clone)]
pub struct WebpayConfig {
    pub base_url: String,
    pub commerce_code: String,
    pub api_key: String,
}

impl WebpayConfig {
    /// Sandbox credentials, matching the provider's test integration.
    pub fn integration() -> Self {
        Self {
            base_url: INTEGRATION_BASE_URL.to_string(),
            commerce_code: INTEGRATION_COMMERCE_CODE.to_string(),
            api_key: INTEGRATION_API_KEY.to_string(),
        }
    }
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    buy_order: &'a str,
    session_id: &'a str,
    amount: i64,
    return_url: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    token: String,
    url: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    buy_order: String,
    status: String,
}

/// [`PaymentGateway`] implementation against a Webpay Plus-shaped REST API.
#[derive(Debug, Clone)]
pub struct WebpayGateway {
    config: WebpayConfig,
    client: reqwest::Client,
}

impl WebpayGateway {
    pub fn new(config: WebpayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Tbk-Api-Key-Id", &self.config.commerce_code)
            .header("Tbk-Api-Key-Secret", &self.config.api_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PaymentError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(PaymentError::Provider { code, body })
    }
}

#[async_trait]
impl PaymentGateway for WebpayGateway {
    async fn initiate(
        &self,
        order: &Order,
        return_url: &str,
    ) -> Result<RedirectInfo, PaymentError> {
        let buy_order = order.id.to_string();
        let session_id = uuid::Uuid::new_v4().to_string();

        // Amounts are already integral pesos; the provider takes integers.
        let request = CreateRequest {
            buy_order: &buy_order,
            session_id: &session_id,
            amount: order.total,
            return_url,
        };

        tracing::info!(order_id = order.id, amount = order.total, "creating provider transaction");

        let response = self
            .authed(self.client.post(format!("{}/transactions", self.config.base_url)))
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Connect(e.to_string()))?;
        let response = Self::check(response).await?;

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Malformed(e.to_string()))?;

        Ok(RedirectInfo {
            url: created.url,
            token: created.token,
        })
    }

    async fn confirm(&self, token: &str) -> Result<PaymentResult, PaymentError> {
        tracing::info!("committing provider transaction");

        let response = self
            .authed(
                self.client
                    .put(format!("{}/transactions/{token}", self.config.base_url)),
            )
            .send()
            .await
            .map_err(|e| PaymentError::Connect(e.to_string()))?;
        let response = Self::check(response).await?;

        let committed: CommitResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Malformed(e.to_string()))?;

        Ok(PaymentResult {
            buy_order: committed.buy_order,
            status: ProviderStatus::from_raw(&committed.status),
        })
    }
}
