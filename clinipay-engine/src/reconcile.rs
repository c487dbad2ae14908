//! Reconciliation of provider signals against the stored transaction.
//!
//! Both resolution paths - a caller's pull verification and a pushed webhook
//! - go through [`apply_outcome`], which funnels into the store's single
//! atomic conditional transition. Whichever signal arrives first while the
//! transaction is still Pending becomes authoritative; a later agreeing
//! signal is an idempotent confirmation; a disagreeing one flags the record
//! for an operator instead of silently resolving either way.

use rust_decimal::Decimal;

use clinipay_types::{
    PaymentOutcome, StoreError, Transaction, TransactionStatus, TransactionStore, Transition,
    TransitionPatch,
};

/// A provider signal reduced to what reconciliation needs.
#[derive(Debug, Clone)]
pub struct Signal {
    pub outcome: PaymentOutcome,
    pub confirmed_amount: Option<Decimal>,
    pub external_id: Option<String>,
    pub message: Option<String>,
}

/// Outcome of applying one signal.
#[derive(Debug)]
pub enum Resolution {
    Transitioned(Transition),
    /// The provider confirmed success for a different amount than the one
    /// initialized. The transaction is flagged, not completed.
    AmountMismatch(Transaction),
}

impl Resolution {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Resolution::Transitioned(t) => t.transaction(),
            Resolution::AmountMismatch(tx) => tx,
        }
    }
}

/// Applies one provider signal to the stored transaction.
pub async fn apply_outcome<S: TransactionStore>(
    store: &S,
    tx: &Transaction,
    signal: Signal,
) -> Result<Resolution, StoreError> {
    // A success claim for the wrong amount is a disagreement between
    // sources, exactly like two different terminal statuses.
    if signal.outcome == PaymentOutcome::Completed {
        if let Some(confirmed) = signal.confirmed_amount {
            if confirmed != tx.amount && tx.status == TransactionStatus::Pending {
                let note = format!(
                    "provider confirmed amount {} but {} was initialized",
                    confirmed, tx.amount
                );
                tracing::warn!(
                    reference = %tx.reference,
                    %confirmed,
                    initialized = %tx.amount,
                    "amount mismatch; transaction flagged for reconciliation"
                );
                let flagged = store.flag_for_reconciliation(&tx.reference, &note).await?;
                return Ok(Resolution::AmountMismatch(flagged));
            }
        }
    }

    let target = match signal.outcome {
        PaymentOutcome::Completed => TransactionStatus::Completed,
        PaymentOutcome::Failed => TransactionStatus::Failed,
    };

    let patch = TransitionPatch {
        external_id: signal.external_id,
        error_message: signal.message,
        metadata: None,
    };

    let transition = store.transition(&tx.reference, target, patch).await?;

    if let Transition::Conflicted(conflicted) = &transition {
        tracing::warn!(
            reference = %conflicted.reference,
            stored_status = %conflicted.status,
            requested_status = %target,
            "signal disagrees with stored outcome; queued for operator review"
        );
    }

    Ok(Resolution::Transitioned(transition))
}
