//! Transactional batch writer
//!
//! One transaction per batch, one prepared insert per transaction. A batch
//! either commits completely or not at all.

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres, Statement, Transaction};
use wardbase_common::types::{WardRecord, WARD_COLUMNS};

use super::config::validate_table_name;
use super::error::WriteError;
use super::types::{Batch, BatchReceipt};

/// Persists whole batches atomically
#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// Write every row of `batch` in one transaction.
    ///
    /// On error nothing from the batch is visible in the table.
    async fn write_batch(&self, batch: Batch) -> Result<BatchReceipt, WriteError>;
}

/// PostgreSQL writer backed by a shared pool
#[derive(Debug, Clone)]
pub struct PgBatchWriter {
    pool: PgPool,
    insert_sql: String,
}

impl PgBatchWriter {
    /// Writer for the given table. The table is expected to exist.
    pub fn new(pool: PgPool, table: &str) -> wardbase_common::Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            insert_sql: insert_statement(table),
        })
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        batch: Batch,
    ) -> Result<u64, WriteError> {
        // Dropped on every return path, including early errors
        let statement = (&mut **tx).prepare(self.insert_sql.as_str()).await?;

        let mut inserted = 0u64;
        for row in batch.rows {
            let line = row.line;
            let record = WardRecord::try_from(row)
                .map_err(|source| WriteError::MalformedRow { line, source })?;

            let [district, mandal, village, mp, mla, no_of_wards] = record.into_fields();
            statement
                .query()
                .bind(district)
                .bind(mandal)
                .bind(village)
                .bind(mp)
                .bind(mla)
                .bind(no_of_wards)
                .execute(&mut **tx)
                .await?;
            inserted += 1;
        }

        Ok(inserted)
    }
}

#[async_trait]
impl BatchWriter for PgBatchWriter {
    #[tracing::instrument(
        skip(self, batch),
        fields(worker_id = batch.worker_id, sequence = batch.sequence, rows = batch.len())
    )]
    async fn write_batch(&self, batch: Batch) -> Result<BatchReceipt, WriteError> {
        let mut tx = self.pool.begin().await?;

        match self.insert_rows(&mut tx, batch).await {
            Ok(rows_inserted) => {
                tx.commit().await?;
                tracing::debug!(rows_inserted, "Batch committed");
                Ok(BatchReceipt { rows_inserted })
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed after batch error");
                }
                Err(e)
            },
        }
    }
}

/// Parameterized insert covering every ward column
pub fn insert_statement(table: &str) -> String {
    let placeholders: Vec<String> = (1..=WARD_COLUMNS.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        WARD_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_shape() {
        assert_eq!(
            insert_statement("ward"),
            "INSERT INTO ward (district, mandal, village, mp, mla, no_of_wards) \
             VALUES ($1, $2, $3, $4, $5, $6)"
        );
    }

    #[tokio::test]
    async fn test_rejects_unsafe_table_name() {
        // Lazy pool: no connection is attempted
        let pool = PgPool::connect_lazy("postgresql://localhost/wardbase").unwrap();
        assert!(PgBatchWriter::new(pool.clone(), "ward; --").is_err());

        let writer = PgBatchWriter::new(pool, "public.ward").unwrap();
        assert!(writer.insert_sql().starts_with("INSERT INTO public.ward ("));
    }
}
