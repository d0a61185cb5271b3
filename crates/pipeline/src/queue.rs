use smartspend_core::{JobId, OwnerId, RowFailure, TransactionDraft};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::PipelineError;

/// Everything a worker needs to run one job. The parsed rows travel with the
/// ticket; only the job record lives in the store until rows are committed.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub drafts: Vec<TransactionDraft>,
    /// Rows the parser already rejected.
    pub defects: Vec<RowFailure>,
}

/// Sending half of the worker channel. Dropping every clone lets the workers
/// drain what is queued and stop.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobTicket>,
}

impl JobQueue {
    pub fn channel(capacity: usize) -> (JobQueue, mpsc::Receiver<JobTicket>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (JobQueue { tx }, rx)
    }

    /// Hands the ticket to the workers without waiting for room. A full
    /// queue is reported as `QueueFull` so the caller is never parked.
    pub fn enqueue(&self, ticket: JobTicket) -> Result<(), PipelineError> {
        self.tx.try_send(ticket).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::QueueFull,
            TrySendError::Closed(_) => PipelineError::QueueClosed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
