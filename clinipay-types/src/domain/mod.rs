//! Domain models for the payment engine.

pub mod contact;
pub mod event;
pub mod refund;
pub mod transaction;

pub use contact::{normalize_phone, validate_email};
pub use event::{EventKey, OrphanEvent, PaymentOutcome, ProviderEvent};
pub use refund::{RefundRecord, RefundStatus};
pub use transaction::{
    Currency, PaymentMethod, Provider, Transaction, TransactionId, TransactionStatus,
};
