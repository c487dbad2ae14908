//! Process configuration.
//!
//! Two tiers of settings: the server refuses to start without a port and a
//! database, while a payment rail with an incomplete credential set merely
//! stays offline. A clinic may legitimately run card-only or
//! mobile-money-only; a missing rail answers 503 instead of blocking
//! startup.

use std::env;

use clinipay_providers::{CardGatewayConfig, MobileMoneyConfig};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rails: RailConfigs,
}

/// Credential sets per rail; `None` keeps that rail offline.
pub struct RailConfigs {
    pub card: Option<CardGatewayConfig>,
    pub mobile_money: Option<MobileMoneyConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").map_err(|_| {
            anyhow::anyhow!(
                "DATABASE_URL environment variable is required (e.g. sqlite://clinipay.db)"
            )
        })?;

        let rails = RailConfigs {
            card: RailConfigs::load("card gateway", CardGatewayConfig::from_env()),
            mobile_money: RailConfigs::load("mobile money", MobileMoneyConfig::from_env()),
        };

        Ok(Self {
            port,
            database_url,
            rails,
        })
    }
}

impl RailConfigs {
    fn load<T>(rail: &str, loaded: anyhow::Result<T>) -> Option<T> {
        match loaded {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                tracing::warn!("{} rail offline: {}", rail, e);
                None
            }
        }
    }
}
