//! Data Transfer Objects (DTOs) for requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Currency, PaymentMethod, TransactionStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Payment actions
// ─────────────────────────────────────────────────────────────────────────────

/// The `POST /payments` request body, dispatched on the `action` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum PaymentAction {
    /// Start a card payment; returns a hosted redirect URL.
    #[serde(rename = "initialize-card")]
    InitializeCard {
        amount: Decimal,
        #[serde(default)]
        currency: Currency,
        clinic_id: String,
        customer_email: String,
        #[serde(default)]
        invoice_id: Option<String>,
        #[serde(default)]
        patient_id: Option<String>,
        #[serde(default)]
        metadata: serde_json::Value,
    },

    /// Pull-verify a card payment after the customer returns from redirect.
    #[serde(rename = "verify-card")]
    VerifyCard { reference: String },

    /// Trigger a mobile-money push prompt on the customer's device.
    #[serde(rename = "initialize-mobilemoney")]
    InitializeMobileMoney {
        amount: Decimal,
        #[serde(default)]
        currency: Currency,
        clinic_id: String,
        customer_email: String,
        customer_phone: String,
        #[serde(default)]
        invoice_id: Option<String>,
        #[serde(default)]
        patient_id: Option<String>,
        #[serde(default)]
        metadata: serde_json::Value,
    },

    /// Poll the mobile-money provider by checkout request id.
    #[serde(rename = "check-mobilemoney-status")]
    CheckMobileMoneyStatus { checkout_request_id: String },

    /// Refund part or all of a completed payment.
    #[serde(rename = "process-refund")]
    ProcessRefund {
        reference: String,
        amount: Decimal,
        reason: String,
    },

    /// Record an out-of-band payment (cash, insurance, bank transfer)
    /// against an invoice, routed through the same idempotent transition
    /// as the gateway rails.
    #[serde(rename = "record-payment")]
    RecordPayment {
        reference: String,
        amount: Decimal,
        #[serde(default)]
        currency: Currency,
        method: PaymentMethod,
        clinic_id: String,
        customer_email: String,
        #[serde(default)]
        invoice_id: Option<String>,
        #[serde(default)]
        patient_id: Option<String>,
    },

    /// Payment history for a clinic, optionally for one patient.
    #[serde(rename = "get-payment-history")]
    GetPaymentHistory {
        clinic_id: String,
        #[serde(default)]
        patient_id: Option<String>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Response after initializing a payment on either rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub reference: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
}

/// Response after a pull verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub reference: String,
    pub status: TransactionStatus,
    /// Set when this verification detected a source disagreement
    pub reconciliation_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
