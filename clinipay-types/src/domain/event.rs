//! Canonical webhook events.
//!
//! Each provider callback, once authenticated, is mapped to a
//! [`ProviderEvent`] before it touches the store. Events whose key matches
//! no known transaction are persisted as [`OrphanEvent`]s for later manual
//! reconciliation instead of being dropped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::Provider;

/// How a provider signal identifies the transaction it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKey {
    /// Engine-assigned reference (card/redirect rail)
    Reference(String),
    /// Provider-assigned checkout request id (mobile-money rail)
    CheckoutRequestId(String),
}

impl EventKey {
    pub fn as_str(&self) -> &str {
        match self {
            EventKey::Reference(s) => s,
            EventKey::CheckoutRequestId(s) => s,
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKey::Reference(s) => write!(f, "reference:{}", s),
            EventKey::CheckoutRequestId(s) => write!(f, "checkout:{}", s),
        }
    }
}

/// Outcome asserted by a provider signal. Cancellation is never asserted by
/// a provider; it is an explicit caller action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Completed,
    Failed,
}

/// An authenticated provider callback, normalized across rails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub key: EventKey,
    pub outcome: PaymentOutcome,
    /// Amount the provider claims to have settled, major units
    pub confirmed_amount: Option<Decimal>,
    /// The provider's own transaction id
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    /// Raw payload, preserved for the audit trail
    pub raw: serde_json::Value,
}

/// A verified webhook that matched no known transaction at delivery time.
///
/// These are acknowledged to the provider (dropping them would trigger
/// endless retries) and kept for an operator to reconcile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanEvent {
    pub id: Uuid,
    pub provider: Provider,
    pub event_key: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl OrphanEvent {
    pub fn new(provider: Provider, event_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            event_key: event_key.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}
