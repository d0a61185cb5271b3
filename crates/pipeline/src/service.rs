//! The operations offered to clients: batch submission, status polling,
//! corrections and the owner-scoped lookups around them.

use std::sync::Arc;

use smartspend_classify::ExternalClassifier;
use smartspend_core::{
    Category, CategoryRule, Job, JobId, OwnerId, RowFailure, Transaction, TransactionId,
};
use smartspend_import::{ColumnHints, IngestionParser, ParserConfig};
use smartspend_storage::{DbPool, Page};

use crate::engine::CategorizationEngine;
use crate::error::PipelineError;
use crate::learner;
use crate::queue::{JobQueue, JobTicket};
use crate::worker::{WorkerContext, WorkerPool};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub row_concurrency: usize,
    pub queue_capacity: usize,
    pub parser: ParserConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            row_concurrency: 8,
            queue_capacity: 256,
            parser: ParserConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    pool: DbPool,
    parser: Arc<IngestionParser>,
    queue: JobQueue,
}

impl Pipeline {
    /// Spawns the worker pool. Workers stop once every `Pipeline` clone is
    /// dropped and the queue is drained.
    pub fn start(
        pool: DbPool,
        classifier: ExternalClassifier,
        config: PipelineConfig,
    ) -> (Pipeline, WorkerPool) {
        let (queue, rx) = JobQueue::channel(config.queue_capacity);
        let ctx = Arc::new(WorkerContext {
            pool: pool.clone(),
            engine: CategorizationEngine::new(classifier),
            row_concurrency: config.row_concurrency,
        });
        let workers = WorkerPool::spawn(ctx, rx, config.workers);
        tracing::info!(
            workers = workers.len(),
            row_concurrency = config.row_concurrency,
            "pipeline started"
        );

        let pipeline = Pipeline {
            pool,
            parser: Arc::new(IngestionParser::new(config.parser)),
            queue,
        };
        (pipeline, workers)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Parses synchronously and queues the job. Layout problems are returned
    /// here and no job is created.
    pub async fn submit_batch(
        &self,
        owner_id: OwnerId,
        raw_batch: &[u8],
        hints: Option<&ColumnHints>,
    ) -> Result<Job, PipelineError> {
        let batch = self.parser.parse(raw_batch, hints)?;
        let total = batch.total_rows() as u64;
        let job = smartspend_storage::insert_job(&self.pool, owner_id, total).await?;

        let defects = batch
            .defects
            .iter()
            .map(|d| RowFailure::new(d.row, d.error.to_string()))
            .collect();
        let ticket = JobTicket {
            job_id: job.id,
            owner_id,
            drafts: batch.drafts,
            defects,
        };

        if let Err(e) = self.queue.enqueue(ticket) {
            let reason = match e {
                PipelineError::QueueFull => "job queue full",
                _ => "job queue closed",
            };
            tracing::warn!(job_id = %job.id, reason, "batch not queued, failing job");
            smartspend_storage::fail_job(&self.pool, owner_id, job.id, reason).await?;
            return Err(e);
        }

        tracing::info!(job_id = %job.id, %owner_id, rows = total, "batch accepted");
        Ok(job)
    }

    pub async fn job_status(&self, owner_id: OwnerId, job_id: JobId) -> Result<Job, PipelineError> {
        smartspend_storage::get_job(&self.pool, owner_id, job_id)
            .await?
            .ok_or(PipelineError::NotFound("job"))
    }

    pub async fn list_jobs(&self, owner_id: OwnerId) -> Result<Vec<Job>, PipelineError> {
        Ok(smartspend_storage::list_jobs(&self.pool, owner_id).await?)
    }

    pub async fn submit_correction(
        &self,
        owner_id: OwnerId,
        transaction_id: TransactionId,
        category: Category,
    ) -> Result<CategoryRule, PipelineError> {
        learner::learn_from_correction(&self.pool, owner_id, transaction_id, category).await
    }

    pub async fn add_rule(
        &self,
        owner_id: OwnerId,
        pattern: &str,
        category: Category,
        priority: Option<i64>,
    ) -> Result<CategoryRule, PipelineError> {
        learner::add_rule(&self.pool, owner_id, pattern, category, priority).await
    }

    pub async fn list_rules(&self, owner_id: OwnerId) -> Result<Vec<CategoryRule>, PipelineError> {
        Ok(smartspend_storage::list_rules(&self.pool, owner_id).await?)
    }

    pub async fn get_transaction(
        &self,
        owner_id: OwnerId,
        id: TransactionId,
    ) -> Result<Transaction, PipelineError> {
        let mut conn = self.pool.acquire().await.map_err(smartspend_storage::StoreError::from)?;
        smartspend_storage::get_transaction(&mut conn, owner_id, id)
            .await?
            .ok_or(PipelineError::NotFound("transaction"))
    }

    pub async fn list_transactions(
        &self,
        owner_id: OwnerId,
        job_id: Option<JobId>,
        page: Page,
    ) -> Result<Vec<Transaction>, PipelineError> {
        Ok(smartspend_storage::list_transactions(&self.pool, owner_id, job_id, page).await?)
    }
}
