//! # Clinipay Types
//!
//! Domain types and port traits for the clinic payment transaction engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Transaction, RefundRecord, ProviderEvent)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

pub use domain::{
    Currency, EventKey, OrphanEvent, PaymentMethod, PaymentOutcome, Provider, ProviderEvent,
    RefundRecord, RefundStatus, Transaction, TransactionId, TransactionStatus, normalize_phone,
    validate_email,
};
pub use dto::{InitializeResponse, PaymentAction, VerifyResponse};
pub use error::{AppError, DomainError, StoreError};
pub use ports::{
    InitializePayment, NewRefund, NewTransaction, PaymentProvider, ProviderHandle, ProviderRefund,
    ProviderVerdict, TransactionStore, Transition, TransitionPatch, WebhookPayload,
};
