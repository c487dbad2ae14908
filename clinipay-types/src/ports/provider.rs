//! Payment provider port trait.
//!
//! One contract, two rails: the card/redirect gateway (synchronous
//! initialize, pull verification) and the mobile-money push-prompt gateway
//! (asynchronous prompt, poll + webhook confirmation). Call sites never
//! branch on the concrete provider.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Currency, EventKey, PaymentOutcome, Provider, ProviderEvent, RefundStatus};
use crate::error::DomainError;

/// Input handed to an adapter's `initialize`, after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializePayment {
    /// Engine-assigned reference for this attempt
    pub reference: String,
    /// Major currency units; minor-unit conversion happens inside adapters
    pub amount: Decimal,
    pub currency: Currency,
    pub customer_email: String,
    /// Normalized international form for the mobile-money rail
    pub customer_phone: Option<String>,
    pub metadata: serde_json::Value,
}

/// What the provider handed back from `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHandle {
    pub reference: String,
    /// Hosted payment page (card rail)
    pub redirect_url: Option<String>,
    /// Provider-assigned correlation id (mobile-money rail)
    pub checkout_request_id: Option<String>,
}

/// Result of a pull verification.
///
/// `outcome = None` means the provider has not resolved the payment yet
/// (e.g. the push prompt is still open on the handset); the transaction
/// stays Pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVerdict {
    pub outcome: Option<PaymentOutcome>,
    pub external_id: Option<String>,
    /// Provider-confirmed amount, converted back to major units
    pub confirmed_amount: Option<Decimal>,
    pub message: Option<String>,
}

/// Result of a provider refund call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRefund {
    pub refund_reference: String,
    pub status: RefundStatus,
}

/// What an authenticated webhook body turned out to contain.
///
/// Providers deliver more than payment outcomes on the same URL (refund
/// notifications, reversal results, subscription events). A well-formed body
/// the adapter recognizes but cannot map to a payment outcome is
/// `Unhandled`, not an error: the caller must still acknowledge it, or the
/// provider retries it forever. Only unparseable bodies are errors.
#[derive(Debug, Clone)]
pub enum WebhookPayload {
    /// A payment outcome to reconcile against a transaction.
    Event(ProviderEvent),
    /// Well-formed, authenticated, but not a payment outcome.
    Unhandled {
        /// Provider-side event type, for the audit record
        kind: String,
        raw: serde_json::Value,
    },
}

/// Adapter contract for one external payment rail.
#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Which rail this adapter wraps.
    fn provider(&self) -> Provider;

    /// Starts a payment. Card rail: synchronous, returns a redirect URL.
    /// Mobile-money rail: triggers a prompt on the customer's device and
    /// returns the provider-assigned checkout request id.
    async fn initialize(&self, req: &InitializePayment) -> Result<ProviderHandle, DomainError>;

    /// Pull-queries the provider for the current outcome. A transport
    /// timeout is a [`DomainError::Provider`], never a Failed verdict.
    async fn verify(&self, key: &EventKey) -> Result<ProviderVerdict, DomainError>;

    /// Asks the provider to refund part or all of a captured payment.
    async fn refund(
        &self,
        reference: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<ProviderRefund, DomainError>;

    /// Authenticates a webhook over the exact raw, unparsed body. MUST run
    /// before any JSON parsing; parsing and re-serializing would invalidate
    /// the signature.
    fn authenticate_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), DomainError>;

    /// Maps an authenticated payload to a canonical event, or marks it
    /// unhandled when it carries no payment outcome. Errors only on bodies
    /// the adapter cannot parse at all.
    fn parse_webhook(&self, raw_body: &[u8]) -> Result<WebhookPayload, DomainError>;
}
