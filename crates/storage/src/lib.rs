pub mod db;
pub mod error;
pub mod jobs;
pub mod rules;
pub mod transactions;

pub use db::{create_db, create_in_memory_db, DbPool};
pub use error::StoreError;
pub use jobs::{
    claim_job, fail_job, fail_stale_jobs, finish_job, get_job, insert_job, list_jobs,
    record_row_failure,
};
pub use rules::{get_rule, list_rules, max_rule_priority, upsert_rule, NewRule};
pub use transactions::{
    commit_job_row, get_transaction, insert_transaction, list_transactions,
    relabel_transaction, Page, MAX_PAGE,
};
