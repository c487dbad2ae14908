//! SQLite transaction store adapter.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

use clinipay_types::{
    DomainError, NewRefund, NewTransaction, OrphanEvent, RefundRecord, RefundStatus, StoreError,
    Transaction, TransactionStatus, TransactionStore, Transition, TransitionPatch,
};

use crate::types::{DbOrphanEvent, DbRefund, DbTransaction};

const TX_COLUMNS: &str = "id, reference, provider, method, amount, currency, status, clinic_id, \
    invoice_id, patient_id, customer_email, customer_phone, checkout_request_id, external_id, \
    metadata, created_at, completed_at, error_message, reconciliation_flag";

const REFUND_COLUMNS: &str =
    "id, original_reference, refund_reference, amount, reason, status, created_at";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite store implementation. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new SQLite store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database exists per connection; the pool must not
        // open a second one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        for ddl in [
            include_str!("../migrations/0001_create_transactions.sql"),
            include_str!("../migrations/0002_create_refunds.sql"),
            include_str!("../migrations/0003_create_orphan_events.sql"),
        ] {
            sqlx::query(ddl).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Generates an engine reference: `CP-` plus 12 random alphanumerics.
    fn generate_reference() -> String {
        use rand::Rng;
        use rand::distr::Alphanumeric;

        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        format!("CP-{}", suffix.to_uppercase())
    }

    async fn fetch_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("SELECT {} FROM transactions WHERE reference = ?", TX_COLUMNS);
        let row: Option<DbTransaction> = sqlx::query_as(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(DbTransaction::into_domain).transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn create(&self, input: NewTransaction) -> Result<Transaction, StoreError> {
        let input = input.normalized().map_err(StoreError::Domain)?;

        let id = Uuid::new_v4();
        let reference = input
            .reference
            .clone()
            .unwrap_or_else(Self::generate_reference);
        let now = chrono::Utc::now();

        let metadata = serde_json::to_string(&input.metadata)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO transactions
               (id, reference, provider, method, amount, currency, status, clinic_id,
                invoice_id, patient_id, customer_email, customer_phone, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 'PENDING', ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(&reference)
        .bind(input.provider.to_string())
        .bind(input.method.to_string())
        .bind(input.amount.to_string())
        .bind(input.currency.to_string())
        .bind(&input.clinic_id)
        .bind(&input.invoice_id)
        .bind(&input.patient_id)
        .bind(&input.customer_email)
        .bind(&input.customer_phone)
        .bind(&metadata)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("reference {} already exists", reference))
            }
            other => StoreError::Database(other.to_string()),
        })?;

        self.fetch_by_reference(&reference)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StoreError> {
        self.fetch_by_reference(reference).await
    }

    async fn find_by_checkout_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE checkout_request_id = ?",
            TX_COLUMNS
        );
        let row: Option<DbTransaction> = sqlx::query_as(&sql)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn set_checkout_id(
        &self,
        reference: &str,
        checkout_request_id: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE transactions SET checkout_request_id = ? WHERE reference = ?"#,
        )
        .bind(checkout_request_id)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn transition(
        &self,
        reference: &str,
        target: TransactionStatus,
        patch: TransitionPatch,
    ) -> Result<Transition, StoreError> {
        if !target.is_terminal() {
            return Err(StoreError::Domain(DomainError::Validation(
                "transition target must be a terminal status".into(),
            )));
        }

        let completed_at = (target == TransactionStatus::Completed)
            .then(|| chrono::Utc::now().to_rfc3339());
        let metadata = patch
            .metadata
            .map(|m| serde_json::to_string(&m))
            .transpose()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        // The guard `status = 'PENDING' AND reconciliation_flag = 0` is the
        // arbitration point: exactly one writer can win it, and a flagged
        // transaction is never auto-resolved.
        let result = sqlx::query(
            r#"UPDATE transactions
               SET status = ?,
                   external_id = COALESCE(?, external_id),
                   error_message = COALESCE(?, error_message),
                   metadata = COALESCE(?, metadata),
                   completed_at = COALESCE(?, completed_at)
               WHERE reference = ? AND status = 'PENDING' AND reconciliation_flag = 0"#,
        )
        .bind(target.to_string())
        .bind(&patch.external_id)
        .bind(&patch.error_message)
        .bind(&metadata)
        .bind(&completed_at)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let stored = self
            .fetch_by_reference(reference)
            .await?
            .ok_or(StoreError::NotFound)?;

        if result.rows_affected() == 1 {
            return Ok(Transition::Applied(stored));
        }

        if stored.status == TransactionStatus::Pending {
            if stored.reconciliation_flag {
                // Flagged while still pending (e.g. amount mismatch); only
                // an operator resolves it.
                return Ok(Transition::Conflicted(stored));
            }
            // Should not happen under SQLite's serialized writes.
            return Err(StoreError::Database(format!(
                "conditional transition for {} raced unexpectedly",
                reference
            )));
        }

        if stored.status == target {
            // Agreeing duplicate: harmless idempotent confirmation.
            return Ok(Transition::AlreadySettled(stored));
        }

        // Disagreeing terminal status: flag, never overwrite.
        sqlx::query(r#"UPDATE transactions SET reconciliation_flag = 1 WHERE reference = ?"#)
            .bind(reference)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::warn!(
            reference,
            stored_status = %stored.status,
            requested_status = %target,
            "conflicting terminal statuses; transaction flagged for reconciliation"
        );

        let mut flagged = stored;
        flagged.reconciliation_flag = true;
        Ok(Transition::Conflicted(flagged))
    }

    async fn flag_for_reconciliation(
        &self,
        reference: &str,
        note: &str,
    ) -> Result<Transaction, StoreError> {
        let result = sqlx::query(
            r#"UPDATE transactions SET reconciliation_flag = 1, error_message = ?
               WHERE reference = ?"#,
        )
        .bind(note)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        self.fetch_by_reference(reference)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn record_refund(
        &self,
        original_reference: &str,
        refund: NewRefund,
    ) -> Result<RefundRecord, StoreError> {
        if refund.amount <= Decimal::ZERO {
            return Err(StoreError::Domain(DomainError::Refund(
                "refund amount must be greater than zero".into(),
            )));
        }

        // Take the write lock up front. A deferred transaction that reads
        // the prior refunds first can hit SQLITE_BUSY when two reservations
        // race to upgrade; immediate mode serializes them cleanly.
        let mut db_tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let sql = format!("SELECT {} FROM transactions WHERE reference = ?", TX_COLUMNS);
        let original: Option<DbTransaction> = sqlx::query_as(&sql)
            .bind(original_reference)
            .fetch_optional(&mut *db_tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let original = original
            .ok_or_else(|| {
                StoreError::Domain(DomainError::Refund(format!(
                    "unknown transaction: {}",
                    original_reference
                )))
            })?
            .into_domain()?;

        if original.status != TransactionStatus::Completed {
            return Err(StoreError::Domain(DomainError::Refund(format!(
                "transaction {} is {}, only completed payments can be refunded",
                original_reference, original.status
            ))));
        }

        // Non-failed rows count against the original amount, so a reserved
        // (still Pending) refund blocks a concurrent over-refund.
        let prior: Vec<DbRefund> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE original_reference = ? AND status != 'FAILED'",
            REFUND_COLUMNS
        ))
        .bind(original_reference)
        .fetch_all(&mut *db_tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut refunded = Decimal::ZERO;
        for row in prior {
            refunded += row.into_domain()?.amount;
        }

        if refunded + refund.amount > original.amount {
            return Err(StoreError::Domain(DomainError::Refund(format!(
                "refund of {} exceeds remaining refundable amount {}",
                refund.amount,
                original.amount - refunded
            ))));
        }

        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"INSERT INTO refunds
               (id, original_reference, refund_reference, amount, reason, status, created_at)
               VALUES (?, ?, ?, ?, ?, 'PENDING', ?)"#,
        )
        .bind(id.to_string())
        .bind(original_reference)
        .bind(&refund.refund_reference)
        .bind(refund.amount.to_string())
        .bind(&refund.reason)
        .bind(now.to_rfc3339())
        .execute(&mut *db_tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(RefundRecord {
            id,
            original_reference: original_reference.to_string(),
            refund_reference: refund.refund_reference,
            amount: refund.amount,
            reason: refund.reason,
            status: RefundStatus::Pending,
            created_at: now,
        })
    }

    async fn complete_refund(
        &self,
        refund_reference: &str,
        status: RefundStatus,
    ) -> Result<RefundRecord, StoreError> {
        let result = sqlx::query(r#"UPDATE refunds SET status = ? WHERE refund_reference = ?"#)
            .bind(status.to_string())
            .bind(refund_reference)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let row: DbRefund = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE refund_reference = ?",
            REFUND_COLUMNS
        ))
        .bind(refund_reference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.into_domain()
    }

    async fn list_refunds(
        &self,
        original_reference: &str,
    ) -> Result<Vec<RefundRecord>, StoreError> {
        let rows: Vec<DbRefund> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE original_reference = ? ORDER BY created_at ASC",
            REFUND_COLUMNS
        ))
        .bind(original_reference)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(DbRefund::into_domain).collect()
    }

    async fn store_orphan_event(&self, event: OrphanEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO orphan_events (id, provider, event_key, payload, received_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.provider.to_string())
        .bind(&event.event_key)
        .bind(&payload)
        .bind(event.received_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_orphan_events(&self, limit: i64) -> Result<Vec<OrphanEvent>, StoreError> {
        let rows: Vec<DbOrphanEvent> = sqlx::query_as(
            r#"SELECT id, provider, event_key, payload, received_at
               FROM orphan_events ORDER BY received_at ASC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(DbOrphanEvent::into_domain).collect()
    }

    async fn list_by_clinic(
        &self,
        clinic_id: &str,
        patient_id: Option<&str>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<DbTransaction> = match patient_id {
            Some(patient_id) => {
                let sql = format!(
                    "SELECT {} FROM transactions WHERE clinic_id = ? AND patient_id = ? \
                     ORDER BY created_at DESC",
                    TX_COLUMNS
                );
                sqlx::query_as(&sql)
                    .bind(clinic_id)
                    .bind(patient_id)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM transactions WHERE clinic_id = ? ORDER BY created_at DESC",
                    TX_COLUMNS
                );
                sqlx::query_as(&sql).bind(clinic_id).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }
}
