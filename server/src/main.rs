//! kickflip
//!
//! The skate-shop checkout service: session carts, atomic order placement,
//! and Webpay Plus payment confirmation over HTTP.

mod config;

use std::sync::Arc;

use anyhow::Result;
use kickflip_checkout::{Checkout, MemorySessions};
use kickflip_core::Product;
use kickflip_http::AppState;
use kickflip_payment::WebpayGateway;
use kickflip_store::{MemoryStore, PgStore, Store};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Demo catalog for the in-memory backend.
fn demo_catalog() -> Vec<Product> {
    vec![
        Product::new(1, "Maple Deck 8.0", 34990, 12),
        Product::new(2, "Indy Trucks 149mm (pair)", 54990, 8),
        Product::new(3, "54mm 99a Wheels (set)", 29990, 20),
        Product::new(4, "ABEC-7 Bearings", 12990, 30),
        Product::new(5, "Mob Griptape Sheet", 7990, 40),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kickflip_checkout=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("using PostgreSQL store");
            Arc::new(PgStore::connect(url).await?)
        }
        None => {
            tracing::info!("using in-memory store with demo catalog");
            Arc::new(MemoryStore::with_products(demo_catalog()))
        }
    };

    let sessions = Arc::new(MemorySessions::new());
    let gateway = Arc::new(WebpayGateway::new(config.webpay.clone()));
    let checkout = Checkout::new(store, sessions, gateway, config.return_url.clone());

    kickflip_http::serve(config.addr, AppState::new(checkout))
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}
