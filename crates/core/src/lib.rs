pub mod category;
pub mod ids;
pub mod job;
pub mod money;
pub mod rule;
pub mod sanitize;
pub mod transaction;

pub use category::{Category, CategorySource, UnknownCategory};
pub use ids::{JobId, OwnerId, RuleId, TransactionId};
pub use job::{Job, JobStatus, RowFailure, TransitionError};
pub use money::Money;
pub use rule::{normalize_pattern, normalize_text, CategoryRule, RuleOrigin};
pub use sanitize::{sanitize, SanitizedText};
pub use transaction::{Transaction, TransactionDraft};
