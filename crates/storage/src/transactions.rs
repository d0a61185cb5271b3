use chrono::{DateTime, NaiveDate, Utc};
use smartspend_core::{
    Category, CategorySource, JobId, JobStatus, OwnerId, Transaction, TransactionId,
};
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::error::{parse_field, StoreError};

const TX_COLUMNS: &str = "id, owner_id, job_id, date, amount, raw_description, \
     sanitized_description, category, category_source, created_at";

type TxRow = (
    String,
    String,
    Option<String>,
    NaiveDate,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

fn tx_from_row(r: TxRow) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        id: parse_field("transaction id", &r.0)?,
        owner_id: parse_field("owner id", &r.1)?,
        job_id: r.2.as_deref().map(|v| parse_field("job id", v)).transpose()?,
        date: r.3,
        amount: parse_field("amount", &r.4)?,
        raw_description: r.5,
        sanitized_description: r.6,
        category: r.7.as_deref().map(|v| parse_field("category", v)).transpose()?,
        category_source: r
            .8
            .as_deref()
            .map(|v| parse_field("category source", v))
            .transpose()?,
        created_at: r.9,
    })
}

/// Inserts a transaction. With a `source_row`, a second insert for the same
/// job row is ignored and `false` is returned.
pub async fn insert_transaction(
    conn: &mut SqliteConnection,
    tx: &Transaction,
    source_row: Option<usize>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO transactions (id, owner_id, job_id, source_row, date, amount, raw_description, \
         sanitized_description, category, category_source, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (job_id, source_row) DO NOTHING",
    )
    .bind(tx.id.to_string())
    .bind(tx.owner_id.to_string())
    .bind(tx.job_id.map(|id| id.to_string()))
    .bind(source_row.map(|r| r as i64))
    .bind(tx.date)
    .bind(tx.amount.as_decimal().to_string())
    .bind(&tx.raw_description)
    .bind(&tx.sanitized_description)
    .bind(tx.category.map(Category::as_str))
    .bind(tx.category_source.map(CategorySource::as_str))
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persists one categorized row of a running job and counts it as processed,
/// atomically. Redelivery of an already committed row is a no-op that
/// returns `false`.
pub async fn commit_job_row(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: JobId,
    row: usize,
    tx: &Transaction,
) -> Result<bool, StoreError> {
    let mut db_tx = pool.begin().await?;

    let inserted = insert_transaction(&mut db_tx, tx, Some(row)).await?;
    if inserted {
        let updated = sqlx::query(
            "UPDATE jobs SET processed_count = processed_count + 1 \
             WHERE id = ? AND owner_id = ? AND status = ?",
        )
        .bind(job_id.to_string())
        .bind(owner_id.to_string())
        .bind(JobStatus::Running.as_str())
        .execute(&mut *db_tx)
        .await?;

        if updated.rows_affected() != 1 {
            db_tx.rollback().await?;
            return Err(StoreError::JobNotRunning);
        }
    }

    db_tx.commit().await?;
    Ok(inserted)
}

pub async fn get_transaction(
    conn: &mut SqliteConnection,
    owner_id: OwnerId,
    id: TransactionId,
) -> Result<Option<Transaction>, StoreError> {
    let row = sqlx::query_as::<_, TxRow>(&format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE id = ? AND owner_id = ?"
    ))
    .bind(id.to_string())
    .bind(owner_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(tx_from_row).transpose()
}

/// Largest page `list_transactions` returns.
pub const MAX_PAGE: u32 = 500;

/// A window into a listing. `limit` is clamped to `1..=MAX_PAGE` and
/// defaults to `MAX_PAGE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self { limit, offset }
    }

    fn limit(&self) -> i64 {
        i64::from(self.limit.unwrap_or(MAX_PAGE).clamp(1, MAX_PAGE))
    }

    fn offset(&self) -> i64 {
        i64::from(self.offset.unwrap_or(0))
    }
}

/// The owner's transactions, optionally restricted to one job. A job's rows
/// come back in file order, otherwise newest first.
pub async fn list_transactions(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: Option<JobId>,
    page: Page,
) -> Result<Vec<Transaction>, StoreError> {
    let rows = match job_id {
        Some(job_id) => {
            sqlx::query_as::<_, TxRow>(&format!(
                "SELECT {TX_COLUMNS} FROM transactions WHERE owner_id = ? AND job_id = ? \
                 ORDER BY source_row LIMIT ? OFFSET ?"
            ))
            .bind(owner_id.to_string())
            .bind(job_id.to_string())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, TxRow>(&format!(
                "SELECT {TX_COLUMNS} FROM transactions WHERE owner_id = ? \
                 ORDER BY date DESC, created_at DESC, id DESC LIMIT ? OFFSET ?"
            ))
            .bind(owner_id.to_string())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter().map(tx_from_row).collect()
}

pub async fn relabel_transaction(
    conn: &mut SqliteConnection,
    owner_id: OwnerId,
    id: TransactionId,
    category: Category,
    source: CategorySource,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE transactions SET category = ?, category_source = ? WHERE id = ? AND owner_id = ?",
    )
    .bind(category.as_str())
    .bind(source.as_str())
    .bind(id.to_string())
    .bind(owner_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("transaction"));
    }
    Ok(())
}
