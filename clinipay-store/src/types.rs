//! Database row structs mapped to domain types.
//!
//! SQLite stores ids and timestamps as TEXT, amounts as canonical Decimal
//! strings, and boolean flags as INTEGER.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use clinipay_types::{
    Currency, OrphanEvent, PaymentMethod, Provider, RefundRecord, RefundStatus, StoreError,
    Transaction, TransactionId, TransactionStatus,
};

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(e.to_string()))
}

fn parse_decimal(s: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s).map_err(|e| StoreError::Database(e.to_string()))
}

/// Transaction row from database.
#[derive(FromRow)]
pub struct DbTransaction {
    pub id: String,
    pub reference: String,
    pub provider: String,
    pub method: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub clinic_id: String,
    pub invoice_id: Option<String>,
    pub patient_id: Option<String>,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub checkout_request_id: Option<String>,
    pub external_id: Option<String>,
    pub metadata: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub reconciliation_flag: i64,
}

impl DbTransaction {
    pub fn into_domain(self) -> Result<Transaction, StoreError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| StoreError::Database(e.to_string()))?;

        let provider = Provider::from_str(&self.provider).map_err(StoreError::Database)?;
        let method = PaymentMethod::from_str(&self.method).map_err(StoreError::Database)?;
        let currency = Currency::from_str(&self.currency).map_err(StoreError::Database)?;
        let status = TransactionStatus::from_str(&self.status).map_err(StoreError::Database)?;

        let metadata: serde_json::Value = serde_json::from_str(&self.metadata)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let completed_at = self.completed_at.as_deref().map(parse_timestamp).transpose()?;

        Ok(Transaction::from_parts(
            TransactionId::from_uuid(id),
            self.reference,
            provider,
            method,
            parse_decimal(&self.amount)?,
            currency,
            status,
            self.clinic_id,
            self.invoice_id,
            self.patient_id,
            self.customer_email,
            self.customer_phone,
            self.checkout_request_id,
            self.external_id,
            metadata,
            parse_timestamp(&self.created_at)?,
            completed_at,
            self.error_message,
            self.reconciliation_flag != 0,
        ))
    }
}

/// Refund row from database.
#[derive(FromRow)]
pub struct DbRefund {
    pub id: String,
    pub original_reference: String,
    pub refund_reference: String,
    pub amount: String,
    pub reason: String,
    pub status: String,
    pub created_at: String,
}

impl DbRefund {
    pub fn into_domain(self) -> Result<RefundRecord, StoreError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| StoreError::Database(e.to_string()))?;
        let status = RefundStatus::from_str(&self.status).map_err(StoreError::Database)?;

        Ok(RefundRecord {
            id,
            original_reference: self.original_reference,
            refund_reference: self.refund_reference,
            amount: parse_decimal(&self.amount)?,
            reason: self.reason,
            status,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Orphan webhook event row from database.
#[derive(FromRow)]
pub struct DbOrphanEvent {
    pub id: String,
    pub provider: String,
    pub event_key: String,
    pub payload: String,
    pub received_at: String,
}

impl DbOrphanEvent {
    pub fn into_domain(self) -> Result<OrphanEvent, StoreError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| StoreError::Database(e.to_string()))?;
        let provider = Provider::from_str(&self.provider).map_err(StoreError::Database)?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(OrphanEvent {
            id,
            provider,
            event_key: self.event_key,
            payload,
            received_at: parse_timestamp(&self.received_at)?,
        })
    }
}
