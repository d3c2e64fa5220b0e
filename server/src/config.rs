//! Environment-driven configuration.

use std::net::SocketAddr;

use anyhow::Context;
use kickflip_payment::webpay::{self, WebpayConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// When set, orders and the catalog live in PostgreSQL; otherwise the
    /// in-memory store runs with a seeded demo catalog.
    pub database_url: Option<String>,
    pub webpay: WebpayConfig,
    /// Where the provider sends the shopper after paying.
    pub return_url: String,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Read configuration from the environment. Defaults target local
    /// development against the provider's sandbox.
    pub fn from_env() -> anyhow::Result<Self> {
        let addr = var("KICKFLIP_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid KICKFLIP_ADDR: {addr}"))?;

        let webpay = WebpayConfig {
            base_url: var("WEBPAY_BASE_URL")
                .unwrap_or_else(|| webpay::INTEGRATION_BASE_URL.to_string()),
            commerce_code: var("WEBPAY_COMMERCE_CODE")
                .unwrap_or_else(|| webpay::INTEGRATION_COMMERCE_CODE.to_string()),
            api_key: var("WEBPAY_API_KEY")
                .unwrap_or_else(|| webpay::INTEGRATION_API_KEY.to_string()),
        };

        let return_url = var("KICKFLIP_RETURN_URL")
            .unwrap_or_else(|| format!("http://{addr}/pay/confirm"));

        Ok(Self {
            addr,
            database_url: var("DATABASE_URL"),
            webpay,
            return_url,
        })
    }
}
