//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod provider;
mod store;

pub use provider::{
    InitializePayment, PaymentProvider, ProviderHandle, ProviderRefund, ProviderVerdict,
    WebhookPayload,
};
pub use store::{NewRefund, NewTransaction, TransactionStore, Transition, TransitionPatch};
