use chrono::{DateTime, Utc};
use smartspend_core::{Job, JobId, JobStatus, OwnerId, RowFailure};

use crate::db::DbPool;
use crate::error::{count, parse_field, StoreError};

const JOB_COLUMNS: &str = "id, owner_id, status, submitted_at, started_at, completed_at, \
     total_count, processed_count, failed_count, error_summary";

type JobRow = (
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    i64,
    i64,
    i64,
    Option<String>,
);

fn job_from_row(r: JobRow) -> Result<Job, StoreError> {
    Ok(Job {
        id: parse_field("job id", &r.0)?,
        owner_id: parse_field("owner id", &r.1)?,
        status: parse_field("job status", &r.2)?,
        submitted_at: r.3,
        started_at: r.4,
        completed_at: r.5,
        total_count: count(r.6),
        processed_count: count(r.7),
        failed_count: count(r.8),
        error_summary: r.9,
    })
}

/// Records an accepted batch in the `queued` state.
pub async fn insert_job(
    pool: &DbPool,
    owner_id: OwnerId,
    total_count: u64,
) -> Result<Job, StoreError> {
    let id = JobId::new();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO jobs (id, owner_id, status, submitted_at, total_count) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(owner_id.to_string())
    .bind(JobStatus::Queued.as_str())
    .bind(now)
    .bind(i64::try_from(total_count).unwrap_or(i64::MAX))
    .execute(pool)
    .await?;

    Ok(Job {
        id,
        owner_id,
        status: JobStatus::Queued,
        submitted_at: now,
        started_at: None,
        completed_at: None,
        total_count,
        processed_count: 0,
        failed_count: 0,
        error_summary: None,
    })
}

/// Owner-scoped lookup: another owner's job id yields `None`.
pub async fn get_job(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: JobId,
) -> Result<Option<Job>, StoreError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ? AND owner_id = ?"
    ))
    .bind(job_id.to_string())
    .bind(owner_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(job_from_row).transpose()
}

pub async fn list_jobs(pool: &DbPool, owner_id: OwnerId) -> Result<Vec<Job>, StoreError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE owner_id = ? ORDER BY submitted_at DESC"
    ))
    .bind(owner_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(job_from_row).collect()
}

/// Exclusive claim: moves the job from `queued` to `running` only if nobody
/// else has. Parse-level row defects are recorded as failures at this point.
pub async fn claim_job(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: JobId,
    defects: &[RowFailure],
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = ?, started_at = ?, failed_count = ?, error_summary = ? \
         WHERE id = ? AND owner_id = ? AND status = ?",
    )
    .bind(JobStatus::Running.as_str())
    .bind(Utc::now())
    .bind(i64::try_from(defects.len()).unwrap_or(i64::MAX))
    .bind(RowFailure::summarize(defects))
    .bind(job_id.to_string())
    .bind(owner_id.to_string())
    .bind(JobStatus::Queued.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Counts one row of a running job as failed.
pub async fn record_row_failure(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: JobId,
    failure: &RowFailure,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE jobs SET failed_count = failed_count + 1, \
         error_summary = CASE WHEN error_summary IS NULL THEN ? ELSE error_summary || '; ' || ? END \
         WHERE id = ? AND owner_id = ? AND status = ?",
    )
    .bind(failure.to_string())
    .bind(failure.to_string())
    .bind(job_id.to_string())
    .bind(owner_id.to_string())
    .bind(JobStatus::Running.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        Ok(())
    } else {
        Err(StoreError::JobNotRunning)
    }
}

/// Moves a running job to a terminal state.
pub async fn finish_job(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: JobId,
    status: JobStatus,
    error_summary: Option<String>,
) -> Result<(), StoreError> {
    JobStatus::Running.transition(status)?;

    let result = sqlx::query(
        "UPDATE jobs SET status = ?, completed_at = ?, error_summary = ? \
         WHERE id = ? AND owner_id = ? AND status = ?",
    )
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(error_summary)
    .bind(job_id.to_string())
    .bind(owner_id.to_string())
    .bind(JobStatus::Running.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        Ok(())
    } else {
        Err(StoreError::JobNotRunning)
    }
}

/// Batch-level fault: marks a queued or running job `failed`, keeping
/// whatever counters it already has.
pub async fn fail_job(
    pool: &DbPool,
    owner_id: OwnerId,
    job_id: JobId,
    reason: &str,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = ?, completed_at = ?, \
         error_summary = CASE WHEN error_summary IS NULL THEN ? ELSE error_summary || '; ' || ? END \
         WHERE id = ? AND owner_id = ? AND status IN (?, ?)",
    )
    .bind(JobStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(reason)
    .bind(reason)
    .bind(job_id.to_string())
    .bind(owner_id.to_string())
    .bind(JobStatus::Queued.as_str())
    .bind(JobStatus::Running.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        Ok(())
    } else {
        Err(StoreError::NotFound("active job"))
    }
}

/// Fails every job left `queued` or `running` by a previous process. Their
/// tickets lived only in memory, so no worker will ever pick them up again.
/// Counters are kept so committed rows stay accounted for.
pub async fn fail_stale_jobs(pool: &DbPool) -> Result<u64, StoreError> {
    let reason = "interrupted by restart";
    let result = sqlx::query(
        "UPDATE jobs SET status = ?, completed_at = ?, \
         error_summary = CASE WHEN error_summary IS NULL THEN ? ELSE error_summary || '; ' || ? END \
         WHERE status IN (?, ?)",
    )
    .bind(JobStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(reason)
    .bind(reason)
    .bind(JobStatus::Queued.as_str())
    .bind(JobStatus::Running.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn insert_and_get_job() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let job = insert_job(&pool, owner, 3).await.unwrap();
        let fetched = get_job(&pool, owner, job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.total_count, 3);
        assert_eq!(fetched.processed_count, 0);
        assert_eq!(fetched.owner_id, owner);
    }

    #[tokio::test]
    async fn other_owner_cannot_see_job() {
        let (_dir, pool) = test_db().await;
        let alice = OwnerId::new();
        let job = insert_job(&pool, alice, 1).await.unwrap();
        assert!(get_job(&pool, OwnerId::new(), job.id).await.unwrap().is_none());
        assert!(list_jobs(&pool, OwnerId::new()).await.unwrap().is_empty());
        assert_eq!(list_jobs(&pool, alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let job = insert_job(&pool, owner, 2).await.unwrap();
        assert!(claim_job(&pool, owner, job.id, &[]).await.unwrap());
        assert!(!claim_job(&pool, owner, job.id, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn claim_scoped_by_owner() {
        let (_dir, pool) = test_db().await;
        let job = insert_job(&pool, OwnerId::new(), 2).await.unwrap();
        assert!(!claim_job(&pool, OwnerId::new(), job.id, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn claim_records_defects() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let job = insert_job(&pool, owner, 3).await.unwrap();
        let defects = vec![RowFailure::new(3, "invalid date 'x'")];
        claim_job(&pool, owner, job.id, &defects).await.unwrap();
        let job = get_job(&pool, owner, job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert_eq!(job.failed_count, 1);
        assert_eq!(job.error_summary.as_deref(), Some("row 3: invalid date 'x'"));
    }

    #[tokio::test]
    async fn row_failures_accumulate() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let job = insert_job(&pool, owner, 3).await.unwrap();
        claim_job(&pool, owner, job.id, &[]).await.unwrap();
        record_row_failure(&pool, owner, job.id, &RowFailure::new(1, "disk full"))
            .await
            .unwrap();
        record_row_failure(&pool, owner, job.id, &RowFailure::new(2, "disk full"))
            .await
            .unwrap();
        let job = get_job(&pool, owner, job.id).await.unwrap().unwrap();
        assert_eq!(job.failed_count, 2);
        assert_eq!(
            job.error_summary.as_deref(),
            Some("row 1: disk full; row 2: disk full")
        );
    }

    #[tokio::test]
    async fn finish_requires_running_and_terminal_state() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let job = insert_job(&pool, owner, 1).await.unwrap();

        let err = finish_job(&pool, owner, job.id, JobStatus::Succeeded, None).await;
        assert!(matches!(err, Err(StoreError::JobNotRunning)));

        claim_job(&pool, owner, job.id, &[]).await.unwrap();
        let err = finish_job(&pool, owner, job.id, JobStatus::Queued, None).await;
        assert!(matches!(err, Err(StoreError::InvalidTransition(_))));

        finish_job(&pool, owner, job.id, JobStatus::Succeeded, None)
            .await
            .unwrap();
        let done = get_job(&pool, owner, job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert!(done.completed_at.is_some());

        // Terminal states never move again.
        assert!(finish_job(&pool, owner, job.id, JobStatus::Failed, None).await.is_err());
        assert!(fail_job(&pool, owner, job.id, "late").await.is_err());
        assert!(!claim_job(&pool, owner, job.id, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn fail_job_from_queued() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let job = insert_job(&pool, owner, 1).await.unwrap();
        fail_job(&pool, owner, job.id, "queue closed").await.unwrap();
        let job = get_job(&pool, owner, job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_summary.as_deref(), Some("queue closed"));
    }

    #[tokio::test]
    async fn stale_jobs_fail_on_startup() {
        let (_dir, pool) = test_db().await;
        let owner = OwnerId::new();
        let queued = insert_job(&pool, owner, 2).await.unwrap();
        let running = insert_job(&pool, owner, 3).await.unwrap();
        let defect = RowFailure::new(2, "bad date");
        assert!(claim_job(&pool, owner, running.id, std::slice::from_ref(&defect)).await.unwrap());
        let done = insert_job(&pool, owner, 1).await.unwrap();
        assert!(claim_job(&pool, owner, done.id, &[]).await.unwrap());
        finish_job(&pool, owner, done.id, JobStatus::Succeeded, None).await.unwrap();

        assert_eq!(fail_stale_jobs(&pool).await.unwrap(), 2);

        let queued = get_job(&pool, owner, queued.id).await.unwrap().unwrap();
        assert_eq!(queued.status, JobStatus::Failed);
        assert_eq!(queued.error_summary.as_deref(), Some("interrupted by restart"));
        assert!(queued.completed_at.is_some());

        let running = get_job(&pool, owner, running.id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Failed);
        assert_eq!(running.failed_count, 1);
        assert!(running.error_summary.unwrap().ends_with("; interrupted by restart"));

        let done = get_job(&pool, owner, done.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);

        assert_eq!(fail_stale_jobs(&pool).await.unwrap(), 0);
    }
}
