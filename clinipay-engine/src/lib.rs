//! # Clinipay Engine
//!
//! Application service layer and HTTP adapter for the payment engine.
//!
//! ## Architecture
//!
//! - `service` - Application service (orchestrates the ports)
//! - `reconcile` - Arbitration between pull verification and pushed webhooks
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `S: TransactionStore`, allowing different
//! store implementations to be injected; provider adapters are injected as
//! trait objects per rail.

pub mod inbound;
pub mod reconcile;
pub mod service;


pub use service::{PaymentEngine, WebhookDisposition};
