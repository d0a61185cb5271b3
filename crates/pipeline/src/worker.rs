//! Job execution. A worker claims a queued job, snapshots the owner's rules
//! once, then categorizes and commits each row on its own so progress is
//! durable row by row.

use std::sync::Arc;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use smartspend_core::{JobId, JobStatus, OwnerId, RowFailure, Transaction, TransactionDraft, TransactionId};
use smartspend_import::RuleSnapshot;
use smartspend_storage::{
    claim_job, commit_job_row, fail_job, finish_job, list_rules, record_row_failure, DbPool,
    StoreError,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::engine::CategorizationEngine;
use crate::queue::JobTicket;

pub struct WorkerContext {
    pub pool: DbPool,
    pub engine: CategorizationEngine,
    /// Rows of one job categorized at the same time.
    pub row_concurrency: usize,
}

/// Runs one job to a terminal state. Returns `None` when another worker
/// already claimed it.
pub async fn run_job(
    ctx: &WorkerContext,
    ticket: JobTicket,
) -> Result<Option<JobStatus>, StoreError> {
    let span = tracing::info_span!("job", job_id = %ticket.job_id, owner_id = %ticket.owner_id);
    execute(ctx, ticket).instrument(span).await
}

async fn execute(ctx: &WorkerContext, ticket: JobTicket) -> Result<Option<JobStatus>, StoreError> {
    let JobTicket {
        job_id,
        owner_id,
        drafts,
        defects,
    } = ticket;

    if !claim_job(&ctx.pool, owner_id, job_id, &defects).await? {
        tracing::debug!("job already claimed, skipping");
        return Ok(None);
    }
    tracing::info!(rows = drafts.len(), defects = defects.len(), "job started");

    let rules = match list_rules(&ctx.pool, owner_id).await {
        Ok(rules) => RuleSnapshot::new(owner_id, rules),
        Err(e) => {
            tracing::error!(error = %e, "could not load rules");
            fail_job(&ctx.pool, owner_id, job_id, &format!("rule store unavailable: {e}")).await?;
            return Ok(Some(JobStatus::Failed));
        }
    };

    let rows: Vec<BoxFuture<'_, Result<(), RowFailure>>> = drafts
        .iter()
        .map(|draft| process_row(ctx, owner_id, job_id, &rules, draft).boxed())
        .collect();
    let results: Vec<Result<(), RowFailure>> = stream::iter(rows)
        .buffer_unordered(ctx.row_concurrency.max(1))
        .collect()
        .await;

    let mut failures = defects;
    let mut processed: u64 = 0;
    for result in results {
        match result {
            Ok(()) => processed += 1,
            Err(failure) => failures.push(failure),
        }
    }

    let status = JobStatus::settle(processed, failures.len() as u64);
    finish_job(
        &ctx.pool,
        owner_id,
        job_id,
        status,
        RowFailure::summarize(&failures),
    )
    .await?;
    tracing::info!(%status, processed, failed = failures.len(), "job finished");
    Ok(Some(status))
}

async fn process_row(
    ctx: &WorkerContext,
    owner_id: OwnerId,
    job_id: JobId,
    rules: &RuleSnapshot,
    draft: &TransactionDraft,
) -> Result<(), RowFailure> {
    let result = ctx.engine.categorize(&draft.description, rules).await;
    let tx = Transaction {
        id: TransactionId::new(),
        owner_id,
        job_id: Some(job_id),
        date: draft.date,
        amount: draft.amount,
        raw_description: draft.description.clone(),
        sanitized_description: result.sanitized.into_inner(),
        category: Some(result.category),
        category_source: Some(result.source),
        created_at: Utc::now(),
    };

    match commit_job_row(&ctx.pool, owner_id, job_id, draft.row, &tx).await {
        Ok(inserted) => {
            if !inserted {
                tracing::debug!(row = draft.row, "row already committed");
            }
            tracing::debug!(
                row = draft.row,
                category = %result.category,
                source = %result.source,
                "row committed"
            );
            Ok(())
        }
        Err(e) => {
            tracing::warn!(row = draft.row, error = %e, "row could not be persisted");
            let failure = RowFailure::new(draft.row, format!("could not persist row: {e}"));
            if let Err(e) = record_row_failure(&ctx.pool, owner_id, job_id, &failure).await {
                tracing::warn!(row = draft.row, error = %e, "row failure not recorded");
            }
            Err(failure)
        }
    }
}

/// Fixed set of tasks sharing one receiver.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        ctx: Arc<WorkerContext>,
        rx: mpsc::Receiver<JobTicket>,
        workers: usize,
    ) -> WorkerPool {
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|worker| {
                let ctx = Arc::clone(&ctx);
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(ticket) = next else { break };
                        let job_id = ticket.job_id;
                        if let Err(e) = run_job(&ctx, ticket).await {
                            tracing::error!(worker, %job_id, error = %e, "job aborted");
                        }
                    }
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect();
        WorkerPool { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits until the queue is closed and every worker has drained it.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}
