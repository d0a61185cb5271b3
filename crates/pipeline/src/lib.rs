pub mod engine;
pub mod error;
pub mod learner;
pub mod queue;
pub mod service;
pub mod worker;

pub use engine::{Categorization, CategorizationEngine};
pub use error::PipelineError;
pub use learner::{add_rule, learn_from_correction};
pub use queue::{JobQueue, JobTicket};
pub use service::{Pipeline, PipelineConfig};
pub use worker::{run_job, WorkerContext, WorkerPool};
