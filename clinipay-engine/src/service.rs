//! Payment Application Service
//!
//! Orchestrates the transaction store and the provider adapters. Contains
//! no infrastructure logic - pure business orchestration.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use clinipay_types::{
    AppError, DomainError, EventKey, InitializePayment, InitializeResponse, NewRefund,
    NewTransaction, OrphanEvent, PaymentProvider, Provider, RefundRecord, RefundStatus,
    StoreError, Transaction, TransactionStatus, TransactionStore, Transition, TransitionPatch,
    VerifyResponse, WebhookPayload,
};

use crate::reconcile::{self, Resolution, Signal};

/// What happened to an ingested webhook, for the acknowledgment body.
///
/// Every variant is acknowledged with HTTP 200: a non-2xx would make the
/// provider retry forever, and none of these are the provider's fault.
#[derive(Debug)]
pub enum WebhookDisposition {
    /// The event won the race and resolved the transaction.
    Applied(Transaction),
    /// Agreeing duplicate of an already-settled outcome.
    Duplicate(Transaction),
    /// Disagreed with the stored outcome; flagged for operator review.
    Conflicted(Transaction),
    /// No matching transaction; stored for later reconciliation.
    Orphaned,
    /// Authentic and well-formed, but not a payment outcome; stored for
    /// the audit trail.
    Unhandled,
}

impl WebhookDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookDisposition::Applied(_) => "applied",
            WebhookDisposition::Duplicate(_) => "duplicate",
            WebhookDisposition::Conflicted(_) => "conflicted",
            WebhookDisposition::Orphaned => "orphaned",
            WebhookDisposition::Unhandled => "unhandled",
        }
    }
}

/// Application service for payment operations.
///
/// Generic over `S: TransactionStore` - the store adapter is injected at
/// compile time. Provider adapters are injected per rail; a rail without an
/// adapter (missing secrets) refuses its operations.
pub struct PaymentEngine<S: TransactionStore> {
    store: S,
    card: Option<Arc<dyn PaymentProvider>>,
    mobile_money: Option<Arc<dyn PaymentProvider>>,
}

impl<S: TransactionStore> PaymentEngine<S> {
    /// Creates an engine with no rails configured.
    pub fn new(store: S) -> Self {
        Self {
            store,
            card: None,
            mobile_money: None,
        }
    }

    pub fn with_card(mut self, adapter: Arc<dyn PaymentProvider>) -> Self {
        self.card = Some(adapter);
        self
    }

    pub fn with_mobile_money(mut self, adapter: Arc<dyn PaymentProvider>) -> Self {
        self.mobile_money = Some(adapter);
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fail closed: no adapter means the rail's operations are refused.
    fn adapter(&self, provider: Provider) -> Result<Arc<dyn PaymentProvider>, DomainError> {
        let slot = match provider {
            Provider::CardGateway => self.card.as_ref(),
            Provider::MobileMoneyGateway => self.mobile_money.as_ref(),
            Provider::Manual => None,
        };
        slot.cloned().ok_or(DomainError::NotConfigured(provider))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Initialize
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a Pending transaction and starts the payment on its rail.
    #[tracing::instrument(skip(self, input), fields(provider = %provider))]
    pub async fn initialize(
        &self,
        provider: Provider,
        input: NewTransaction,
    ) -> Result<InitializeResponse, AppError> {
        let adapter = self.adapter(provider)?;

        // Validation happens inside create, before any network call.
        let tx = self.store.create(input).await?;

        let request = InitializePayment {
            reference: tx.reference.clone(),
            amount: tx.amount,
            currency: tx.currency,
            customer_email: tx.customer_email.clone(),
            customer_phone: tx.customer_phone.clone(),
            metadata: tx.metadata.clone(),
        };

        // A provider failure here leaves the record Pending: the outcome is
        // unknown, and a webhook or explicit re-verification may still
        // resolve it.
        let handle = adapter.initialize(&request).await?;

        if let Some(checkout_request_id) = &handle.checkout_request_id {
            self.store
                .set_checkout_id(&tx.reference, checkout_request_id)
                .await?;
        }

        tracing::info!(reference = %tx.reference, "payment initialized");

        Ok(InitializeResponse {
            reference: tx.reference,
            status: TransactionStatus::Pending,
            redirect_url: handle.redirect_url,
            checkout_request_id: handle.checkout_request_id,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pull verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull-verifies a transaction by its engine reference.
    #[tracing::instrument(skip(self))]
    pub async fn verify(&self, reference: &str) -> Result<VerifyResponse, AppError> {
        let tx = self
            .store
            .get_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", reference)))?;

        self.pull_verify(tx).await
    }

    /// Pull-verifies a mobile-money transaction by its checkout request id.
    #[tracing::instrument(skip(self))]
    pub async fn check_mobile_money(
        &self,
        checkout_request_id: &str,
    ) -> Result<VerifyResponse, AppError> {
        let tx = self
            .store
            .find_by_checkout_id(checkout_request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("checkout request {}", checkout_request_id))
            })?;

        self.pull_verify(tx).await
    }

    async fn pull_verify(&self, tx: Transaction) -> Result<VerifyResponse, AppError> {
        // Terminal (or flagged) records answer from the store; the provider
        // adds nothing.
        if tx.status.is_terminal() || tx.reconciliation_flag {
            return Ok(Self::verify_response(&tx));
        }

        let adapter = self.adapter(tx.provider)?;
        let key = match tx.provider {
            Provider::CardGateway => EventKey::Reference(tx.reference.clone()),
            Provider::MobileMoneyGateway => EventKey::CheckoutRequestId(
                tx.checkout_request_id.clone().ok_or_else(|| {
                    AppError::Internal(format!(
                        "transaction {} has no checkout request id",
                        tx.reference
                    ))
                })?,
            ),
            Provider::Manual => {
                return Ok(Self::verify_response(&tx));
            }
        };

        // A transport timeout propagates as an error and the transaction
        // stays Pending; the charge may still succeed downstream.
        let verdict = adapter.verify(&key).await?;

        let Some(outcome) = verdict.outcome else {
            // Provider has not resolved the payment yet.
            return Ok(Self::verify_response(&tx));
        };

        let resolution = reconcile::apply_outcome(
            &self.store,
            &tx,
            Signal {
                outcome,
                confirmed_amount: verdict.confirmed_amount,
                external_id: verdict.external_id,
                message: verdict.message,
            },
        )
        .await?;

        Ok(Self::verify_response(resolution.transaction()))
    }

    fn verify_response(tx: &Transaction) -> VerifyResponse {
        VerifyResponse {
            reference: tx.reference.clone(),
            status: tx.status,
            reconciliation_flag: tx.reconciliation_flag,
            error_message: tx.error_message.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook ingestion
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingests a provider webhook: authenticate over the raw bytes FIRST,
    /// then parse, then reconcile.
    #[tracing::instrument(skip(self, raw_body, signature), fields(provider = %provider))]
    pub async fn ingest_webhook(
        &self,
        provider: Provider,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookDisposition, AppError> {
        let adapter = self.adapter(provider)?;

        if let Err(e) = adapter.authenticate_webhook(raw_body, signature) {
            // Security event: never reaches the store.
            tracing::warn!(provider = %provider, error = %e, "webhook rejected as unauthentic");
            return Err(e.into());
        }

        let event = match adapter
            .parse_webhook(raw_body)
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            WebhookPayload::Event(event) => event,
            WebhookPayload::Unhandled { kind, raw } => {
                // Not a payment outcome, but the provider retries anything
                // it cannot deliver; acknowledge and keep the payload.
                tracing::info!(kind = %kind, "webhook carried no payment outcome; acknowledged");
                self.store
                    .store_orphan_event(OrphanEvent::new(
                        provider,
                        &format!("unhandled:{}", kind),
                        raw,
                    ))
                    .await?;
                return Ok(WebhookDisposition::Unhandled);
            }
        };

        let tx = match &event.key {
            EventKey::Reference(reference) => self.store.get_by_reference(reference).await?,
            EventKey::CheckoutRequestId(id) => self.store.find_by_checkout_id(id).await?,
        };

        let Some(tx) = tx else {
            // Webhook raced ahead of initialize, or the key is unrecognized.
            // Store it and acknowledge; rejection would be indistinguishable
            // from an authenticity failure and dropping it would trigger
            // endless provider retries.
            tracing::info!(key = %event.key, "webhook matched no transaction; stored as orphan");
            self.store
                .store_orphan_event(OrphanEvent::new(
                    provider,
                    event.key.as_str(),
                    event.raw.clone(),
                ))
                .await?;
            return Ok(WebhookDisposition::Orphaned);
        };

        let resolution = reconcile::apply_outcome(
            &self.store,
            &tx,
            Signal {
                outcome: event.outcome,
                confirmed_amount: event.confirmed_amount,
                external_id: event.external_id,
                message: event.error_message,
            },
        )
        .await?;

        Ok(match resolution {
            Resolution::Transitioned(Transition::Applied(tx)) => WebhookDisposition::Applied(tx),
            Resolution::Transitioned(Transition::AlreadySettled(tx)) => {
                WebhookDisposition::Duplicate(tx)
            }
            Resolution::Transitioned(Transition::Conflicted(tx))
            | Resolution::AmountMismatch(tx) => WebhookDisposition::Conflicted(tx),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refunds
    // ─────────────────────────────────────────────────────────────────────────

    /// Refunds part or all of a completed payment.
    ///
    /// The amount is checked and reserved atomically against the original,
    /// so two concurrent partial refunds cannot jointly over-refund. The
    /// original transaction's status is never touched.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        original_reference: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<RefundRecord, AppError> {
        let tx = self
            .store
            .get_by_reference(original_reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", original_reference)))?;

        if tx.status != TransactionStatus::Completed {
            return Err(DomainError::Refund(format!(
                "transaction {} is {}, only completed payments can be refunded",
                original_reference, tx.status
            ))
            .into());
        }

        let adapter = self.adapter(tx.provider)?;

        let refund_reference = format!("RF-{}", Uuid::new_v4().simple());
        let reserved = self
            .store
            .record_refund(
                original_reference,
                NewRefund {
                    refund_reference: refund_reference.clone(),
                    amount,
                    reason: reason.to_string(),
                },
            )
            .await?;

        match adapter.refund(original_reference, amount, reason).await {
            Ok(provider_refund) => {
                tracing::info!(
                    refund_reference = %reserved.refund_reference,
                    provider_refund = %provider_refund.refund_reference,
                    "refund accepted by provider"
                );
                let settled = self
                    .store
                    .complete_refund(&reserved.refund_reference, provider_refund.status)
                    .await?;
                Ok(settled)
            }
            Err(e @ DomainError::Provider(_)) => {
                // Unknown outcome (timeout or transport failure): keep the
                // reservation so a concurrent refund cannot slip past it.
                // An operator or retry settles it later.
                tracing::warn!(
                    refund_reference = %reserved.refund_reference,
                    error = %e,
                    "provider refund outcome unknown; reservation kept"
                );
                Err(e.into())
            }
            Err(e) => {
                // Explicit rejection: release the reservation.
                self.store
                    .complete_refund(&reserved.refund_reference, RefundStatus::Failed)
                    .await?;
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manual recording, cancellation, history
    // ─────────────────────────────────────────────────────────────────────────

    /// Records an out-of-band payment against an invoice.
    ///
    /// Routed through the same create + conditional transition as the
    /// gateway rails: applying the same external reference twice is an
    /// idempotent no-op, and a disagreeing duplicate flags the record
    /// instead of double-posting.
    #[tracing::instrument(skip(self, input))]
    pub async fn record_payment(&self, input: NewTransaction) -> Result<Transaction, AppError> {
        let reference = input
            .reference
            .clone()
            .ok_or_else(|| AppError::BadRequest("record-payment requires a reference".into()))?;

        match self.store.create(input).await {
            Ok(_) => {}
            // Already recorded once; the transition below arbitrates.
            Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }

        match self
            .store
            .transition(
                &reference,
                TransactionStatus::Completed,
                TransitionPatch::default(),
            )
            .await?
        {
            Transition::Applied(tx) | Transition::AlreadySettled(tx) => Ok(tx),
            Transition::Conflicted(tx) => Err(AppError::Conflict(format!(
                "reference {} already settled as {}; flagged for reconciliation",
                tx.reference, tx.status
            ))),
        }
    }

    /// Cancels a still-pending transaction. Explicit caller action only;
    /// no provider ever asserts cancellation.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, reference: &str) -> Result<Transaction, AppError> {
        match self
            .store
            .transition(
                reference,
                TransactionStatus::Cancelled,
                TransitionPatch {
                    error_message: Some("cancelled by caller".into()),
                    ..Default::default()
                },
            )
            .await?
        {
            Transition::Applied(tx) | Transition::AlreadySettled(tx) => Ok(tx),
            Transition::Conflicted(tx) => Err(AppError::Conflict(format!(
                "transaction {} is already {}",
                tx.reference, tx.status
            ))),
        }
    }

    /// Payment history for a clinic, optionally narrowed to one patient.
    pub async fn history(
        &self,
        clinic_id: &str,
        patient_id: Option<&str>,
    ) -> Result<Vec<Transaction>, AppError> {
        self.store
            .list_by_clinic(clinic_id, patient_id)
            .await
            .map_err(Into::into)
    }

    /// Stored webhooks awaiting manual reconciliation.
    pub async fn orphan_events(&self, limit: i64) -> Result<Vec<OrphanEvent>, AppError> {
        self.store.list_orphan_events(limit).await.map_err(Into::into)
    }
}
