//! Per-provider configuration.
//!
//! Each adapter receives its credentials at construction time. `from_env`
//! fails when a required secret is absent, so a misconfigured rail is
//! refused outright instead of silently degrading.

use std::env;

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

/// Credentials and endpoints for the card/redirect gateway.
#[derive(Debug, Clone)]
pub struct CardGatewayConfig {
    /// API secret key, sent as a bearer token
    pub secret_key: String,
    /// Shared secret used to verify webhook signatures
    pub webhook_secret: String,
    pub base_url: String,
    /// Where the hosted payment page redirects the customer afterwards
    pub callback_url: String,
}

impl CardGatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            secret_key: required("CARD_GATEWAY_SECRET_KEY")?,
            webhook_secret: required("CARD_GATEWAY_WEBHOOK_SECRET")?,
            base_url: env::var("CARD_GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.cardgateway.example".to_string()),
            callback_url: required("CARD_GATEWAY_CALLBACK_URL")?,
        })
    }
}

/// Credentials and endpoints for the mobile-money push gateway.
#[derive(Debug, Clone)]
pub struct MobileMoneyConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Business short code receiving the payment
    pub shortcode: String,
    /// Passkey combined with shortcode and timestamp into the API password
    pub passkey: String,
    pub base_url: String,
    /// Webhook delivery URL registered with the provider
    pub callback_url: String,
    /// Shared-secret token appended to the callback URL; the provider has
    /// no signature scheme, so this is the authenticity check
    pub webhook_token: String,
}

impl MobileMoneyConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            consumer_key: required("MOBILE_MONEY_CONSUMER_KEY")?,
            consumer_secret: required("MOBILE_MONEY_CONSUMER_SECRET")?,
            shortcode: required("MOBILE_MONEY_SHORTCODE")?,
            passkey: required("MOBILE_MONEY_PASSKEY")?,
            base_url: env::var("MOBILE_MONEY_BASE_URL")
                .unwrap_or_else(|_| "https://api.mobilemoney.example".to_string()),
            callback_url: required("MOBILE_MONEY_CALLBACK_URL")?,
            webhook_token: required("MOBILE_MONEY_WEBHOOK_TOKEN")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_config_fails_closed_without_secret() {
        // Isolated env: only set what the test controls.
        unsafe {
            env::remove_var("CARD_GATEWAY_SECRET_KEY");
        }
        assert!(CardGatewayConfig::from_env().is_err());
    }
}
