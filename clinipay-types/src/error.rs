//! Error types for the payment engine.

use crate::domain::Provider;

/// Domain-level errors (business rule violations and provider outcomes).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Bad amount/email/phone, rejected before any network or state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote API error, malformed response, or transport timeout. A timeout
    /// is an *unknown* outcome: the transaction stays Pending.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Webhook failed its authenticity check. The event never reaches the
    /// store; logged as a security event.
    #[error("Webhook authenticity check failed: {0}")]
    Authenticity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Two signal sources disagree on a terminal outcome. The transaction is
    /// flagged for manual review and never auto-resolved.
    #[error("Conflicting outcome for transaction {reference}; flagged for reconciliation")]
    Conflict { reference: String },

    /// Over-refund, or refund against a non-completed transaction. Rejected
    /// before any provider call.
    #[error("Refund error: {0}")]
    Refund(String),

    /// The provider's secrets are absent; its operations are refused rather
    /// than silently degraded.
    #[error("Provider {0} is not configured")]
    NotConfigured(Provider),
}

/// Store-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Entity not found")]
    NotFound,
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream provider failed: {0}")]
    UpstreamFailed(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::BadRequest(msg),
            DomainError::Provider(msg) => AppError::UpstreamFailed(msg),
            DomainError::Authenticity(msg) => AppError::Unauthorized(msg),
            DomainError::NotFound(msg) => AppError::NotFound(msg),
            DomainError::Conflict { reference } => AppError::Conflict(format!(
                "transaction {} flagged for reconciliation",
                reference
            )),
            DomainError::Refund(msg) => AppError::BadRequest(msg),
            DomainError::NotConfigured(provider) => {
                AppError::ServiceUnavailable(format!("provider {} is not configured", provider))
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => e.into(),
            StoreError::Database(e) => AppError::Internal(e),
            StoreError::Conflict(e) => AppError::Conflict(e),
            StoreError::NotFound => AppError::NotFound("Resource not found".into()),
        }
    }
}
