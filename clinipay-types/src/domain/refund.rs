//! Refund ledger entries.
//!
//! Refunds are additive records against a completed transaction. They never
//! mutate the original transaction's status, and the sum of non-failed
//! refund amounts for a reference can never exceed the original amount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one refund attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    /// Reserved against the original amount, provider call in flight
    Pending,
    Completed,
    /// Provider rejected the refund; the reservation is released
    Failed,
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Pending => write!(f, "PENDING"),
            RefundStatus::Completed => write!(f, "COMPLETED"),
            RefundStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RefundStatus::Pending),
            "COMPLETED" => Ok(RefundStatus::Completed),
            "FAILED" => Ok(RefundStatus::Failed),
            other => Err(format!("unknown refund status: {}", other)),
        }
    }
}

/// A recorded refund against a completed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: Uuid,
    /// Reference of the transaction being refunded
    pub original_reference: String,
    /// Engine-assigned reference for this refund attempt
    pub refund_reference: String,
    /// Amount in major currency units
    pub amount: Decimal,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}
