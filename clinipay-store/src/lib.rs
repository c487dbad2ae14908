//! # Clinipay Store
//!
//! SQLite adapter implementing the `TransactionStore` port. The store owns
//! the durable record of every payment attempt and the single atomic
//! conditional transition all writers must go through.

pub mod sqlite;
mod types;

#[cfg(test)]
mod sqlite_tests;

pub use sqlite::SqliteStore;

/// Build and initialize a store from a database URL.
///
/// Connects, runs migrations, and returns a ready-to-use [`SqliteStore`].
///
/// # Examples
///
/// ```ignore
/// let store = build_store("sqlite://clinipay.db?mode=rwc").await?;
/// ```
pub async fn build_store(database_url: &str) -> anyhow::Result<SqliteStore> {
    SqliteStore::new(database_url).await
}
