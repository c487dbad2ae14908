//! Inbound HTTP adapter (axum).

pub mod handlers;
pub mod server;

pub use server::HttpServer;
