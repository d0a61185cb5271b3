use smartspend_core::TransitionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("Job is not running")]
    JobNotRunning,
    #[error("Rule pattern must not be empty")]
    EmptyPattern,
    #[error("Corrupt {what} in store: '{value}'")]
    Corrupt { what: &'static str, value: String },
}

pub(crate) fn parse_field<T>(what: &'static str, value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
{
    value.parse::<T>().map_err(|_| StoreError::Corrupt {
        what,
        value: value.to_string(),
    })
}

pub(crate) fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
