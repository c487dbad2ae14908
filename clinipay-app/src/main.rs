//! # Clinipay Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the SQLite store adapter
//! - Construct provider adapters for each rail with credentials
//! - Start the HTTP server
//!
//! Each rail is wired only when its full credential set is present; a rail
//! with missing secrets stays offline and its operations answer 503 rather
//! than running half-configured.

mod config;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinipay_engine::{PaymentEngine, inbound::HttpServer};
use clinipay_providers::{CardGatewayAdapter, MobileMoneyAdapter};
use clinipay_store::build_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clinipay_app=debug,clinipay_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting clinipay server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build store (handles connection and migration)
    let store = build_store(&config.database_url).await?;

    let mut engine = PaymentEngine::new(store);

    if let Some(cfg) = config.rails.card {
        tracing::info!("card gateway rail configured");
        engine = engine.with_card(Arc::new(CardGatewayAdapter::new(cfg)));
    }

    if let Some(cfg) = config.rails.mobile_money {
        tracing::info!("mobile money rail configured");
        engine = engine.with_mobile_money(Arc::new(MobileMoneyAdapter::new(cfg)));
    }

    // Create and run the HTTP server
    let server = HttpServer::new(engine);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    Ok(())
}
