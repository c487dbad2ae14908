//! Transaction store port trait.
//!
//! This is the primary port in our hexagonal architecture. The store owns the
//! only shared-mutable resource in the system: the Transaction keyed by
//! `reference`. Every writer (pull-verify callers and webhook handlers) goes
//! through [`TransactionStore::transition`], the single atomic conditional
//! update, so a losing writer observes a no-op instead of corrupting state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Currency, OrphanEvent, PaymentMethod, Provider, RefundRecord, RefundStatus, Transaction,
    TransactionStatus, normalize_phone, validate_email,
};
use crate::error::{DomainError, StoreError};

/// Input for creating a Pending transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Caller-supplied idempotency key; generated by the store when absent
    pub reference: Option<String>,
    pub provider: Provider,
    pub method: PaymentMethod,
    /// Major currency units, must be > 0
    pub amount: Decimal,
    pub currency: Currency,
    pub clinic_id: String,
    pub invoice_id: Option<String>,
    pub patient_id: Option<String>,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewTransaction {
    /// Validates the input and normalizes the phone number for the
    /// mobile-money rail. Runs before any network call or state change.
    pub fn normalized(mut self) -> Result<Self, DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "amount must be greater than zero".into(),
            ));
        }

        match self.provider {
            Provider::CardGateway => {
                validate_email(&self.customer_email)?;
            }
            Provider::MobileMoneyGateway => {
                let phone = self.customer_phone.as_deref().ok_or_else(|| {
                    DomainError::Validation("phone number is required for mobile money".into())
                })?;
                self.customer_phone = Some(normalize_phone(phone)?);
            }
            // Manual payments carry whatever contact details the clinic has.
            Provider::Manual => {}
        }

        Ok(self)
    }
}

/// Fields recorded alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    /// Replaces the stored metadata when present
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of the atomic conditional transition.
///
/// This single primitive is what makes duplicate webhook delivery and the
/// racing pull/push confirmations safe.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The transaction was Pending; this writer won and the target status
    /// is now persisted.
    Applied(Transaction),
    /// The transaction was already in the requested terminal status; nothing
    /// changed (idempotent confirmation).
    AlreadySettled(Transaction),
    /// The transaction was already terminal with a *different* status. The
    /// stored record is unchanged apart from `reconciliation_flag`, which is
    /// now set; an operator must resolve it.
    Conflicted(Transaction),
}

impl Transition {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Transition::Applied(tx) | Transition::AlreadySettled(tx) | Transition::Conflicted(tx) => {
                tx
            }
        }
    }
}

/// Input for reserving a refund against a completed transaction.
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub refund_reference: String,
    pub amount: Decimal,
    pub reason: String,
}

/// The durable record of every payment attempt and its lifecycle state.
///
/// All mutating operations MUST be atomic. Implementations should use
/// database transactions for multi-step writes.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────
    // Transaction lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a Pending transaction. Validates input via
    /// [`NewTransaction::normalized`], generates `reference` when absent.
    /// A duplicate reference is a conflict.
    async fn create(&self, input: NewTransaction) -> Result<Transaction, StoreError>;

    /// Looks up a transaction by its reference.
    async fn get_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StoreError>;

    /// Looks up a transaction by the provider-assigned checkout request id.
    async fn find_by_checkout_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Records the provider-assigned checkout request id after initialize.
    async fn set_checkout_id(
        &self,
        reference: &str,
        checkout_request_id: &str,
    ) -> Result<(), StoreError>;

    /// Atomic conditional transition to a terminal status. Applies only while
    /// the stored status is Pending and unflagged; see [`Transition`] for the
    /// arbitration.
    async fn transition(
        &self,
        reference: &str,
        target: TransactionStatus,
        patch: TransitionPatch,
    ) -> Result<Transition, StoreError>;

    /// Marks a transaction for manual review without changing its status
    /// (e.g. a provider-confirmed amount that disagrees with the stored
    /// amount). A flagged transaction no longer accepts transitions.
    async fn flag_for_reconciliation(
        &self,
        reference: &str,
        note: &str,
    ) -> Result<Transaction, StoreError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Refund ledger (read-and-reserve MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────

    /// Reserves a refund: checks the original is Completed and that
    /// sum(non-failed refunds) + amount ≤ original amount, then inserts a
    /// Pending refund row, all in one database transaction.
    async fn record_refund(
        &self,
        original_reference: &str,
        refund: NewRefund,
    ) -> Result<RefundRecord, StoreError>;

    /// Settles a reserved refund after the provider call.
    async fn complete_refund(
        &self,
        refund_reference: &str,
        status: RefundStatus,
    ) -> Result<RefundRecord, StoreError>;

    /// Lists refunds recorded against a transaction.
    async fn list_refunds(
        &self,
        original_reference: &str,
    ) -> Result<Vec<RefundRecord>, StoreError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Orphan events & history
    // ─────────────────────────────────────────────────────────────────────────

    /// Persists a verified webhook that matched no known transaction.
    async fn store_orphan_event(&self, event: OrphanEvent) -> Result<(), StoreError>;

    /// Lists stored orphan events, oldest first.
    async fn list_orphan_events(&self, limit: i64) -> Result<Vec<OrphanEvent>, StoreError>;

    /// Payment history for a clinic, optionally narrowed to one patient.
    async fn list_by_clinic(
        &self,
        clinic_id: &str,
        patient_id: Option<&str>,
    ) -> Result<Vec<Transaction>, StoreError>;
}
