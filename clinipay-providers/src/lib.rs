//! # Clinipay Providers
//!
//! Concrete `PaymentProvider` adapters for the two external rails:
//!
//! - [`CardGatewayAdapter`] - redirect/pull model: synchronous initialize
//!   returning a hosted payment URL, direct pull verification by reference,
//!   HMAC-SHA512 signed webhooks.
//! - [`MobileMoneyAdapter`] - push-prompt/poll model: initialize triggers a
//!   prompt on the customer's handset and returns a provider-assigned
//!   checkout request id; confirmation arrives via webhook or polling.
//!
//! Credentials are injected at construction through typed config structs -
//! there is no global provider state.

pub mod card;
pub mod config;
pub mod mobile_money;
pub mod signature;

pub use card::CardGatewayAdapter;
pub use config::{CardGatewayConfig, MobileMoneyConfig};
pub use mobile_money::MobileMoneyAdapter;
