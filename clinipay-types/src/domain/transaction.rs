//! Transaction domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a Transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random TransactionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a TransactionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The external payment rail a transaction runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    /// Card/redirect gateway: synchronous initialize, pull verification.
    CardGateway,
    /// Mobile-money push-prompt gateway: async prompt, poll + webhook.
    MobileMoneyGateway,
    /// Out-of-band payment recorded by clinic staff (cash, insurance);
    /// no external rail is involved.
    Manual,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::CardGateway => write!(f, "CARD_GATEWAY"),
            Provider::MobileMoneyGateway => write!(f, "MOBILE_MONEY_GATEWAY"),
            Provider::Manual => write!(f, "MANUAL"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD_GATEWAY" => Ok(Provider::CardGateway),
            "MOBILE_MONEY_GATEWAY" => Ok(Provider::MobileMoneyGateway),
            "MANUAL" => Ok(Provider::Manual),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// How the payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    Cash,
    BankTransfer,
    Insurance,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "CARD"),
            PaymentMethod::MobileMoney => write!(f, "MOBILE_MONEY"),
            PaymentMethod::Cash => write!(f, "CASH"),
            PaymentMethod::BankTransfer => write!(f, "BANK_TRANSFER"),
            PaymentMethod::Insurance => write!(f, "INSURANCE"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "MOBILE_MONEY" => Ok(PaymentMethod::MobileMoney),
            "CASH" => Ok(PaymentMethod::Cash),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "INSURANCE" => Ok(PaymentMethod::Insurance),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// Currencies accepted by the billing system. Amounts are carried in major
/// units of their currency and never converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    KES,
    USD,
    EUR,
    GBP,
}

impl Default for Currency {
    fn default() -> Self {
        Currency::KES
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KES" => Ok(Currency::KES),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            other => Err(format!("unknown currency: {}", other)),
        }
    }
}

/// Lifecycle state of a payment attempt.
///
/// `Pending` is the only non-terminal state. A terminal status is never
/// overwritten; a disagreeing second signal raises the reconciliation flag
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Failed => write!(f, "FAILED"),
            TransactionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// A single payment attempt against one of the external rails.
///
/// Created only by `initialize` (status = Pending), mutated only through the
/// store's conditional transition, never deleted (audit retention). The
/// `reference` is the engine-assigned idempotency key and is immutable after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: TransactionId,
    /// Engine-assigned idempotency key, globally unique
    pub reference: String,
    /// Which external rail carries this payment
    pub provider: Provider,
    /// How the payment was made
    pub method: PaymentMethod,
    /// Amount in major currency units
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    /// Tenant context, resolved by the caller
    pub clinic_id: String,
    pub invoice_id: Option<String>,
    pub patient_id: Option<String>,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    /// Provider-assigned correlation id for push-prompt payments,
    /// distinct from `reference`
    pub checkout_request_id: Option<String>,
    /// The provider's own transaction id, learned at confirmation
    pub external_id: Option<String>,
    /// Opaque caller metadata
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Set when two signal sources disagree on the outcome; a flagged
    /// transaction is only ever resolved by an operator
    pub reconciliation_flag: bool,
}

impl Transaction {
    /// Reconstructs a transaction from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransactionId,
        reference: String,
        provider: Provider,
        method: PaymentMethod,
        amount: Decimal,
        currency: Currency,
        status: TransactionStatus,
        clinic_id: String,
        invoice_id: Option<String>,
        patient_id: Option<String>,
        customer_email: String,
        customer_phone: Option<String>,
        checkout_request_id: Option<String>,
        external_id: Option<String>,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
        reconciliation_flag: bool,
    ) -> Self {
        Self {
            id,
            reference,
            provider,
            method,
            amount,
            currency,
            status,
            clinic_id,
            invoice_id,
            patient_id,
            customer_email,
            customer_phone,
            checkout_request_id,
            external_id,
            metadata,
            created_at,
            completed_at,
            error_message,
            reconciliation_flag,
        }
    }
}
