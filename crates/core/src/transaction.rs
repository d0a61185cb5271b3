use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::category::{Category, CategorySource};
use super::ids::{JobId, OwnerId, TransactionId};
use super::money::Money;

/// A parsed CSV row that passed validation and awaits categorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    /// 1-based data row number in the uploaded file (header excluded).
    pub row: usize,
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner_id: OwnerId,
    /// Batch job that produced this record.
    pub job_id: Option<JobId>,
    pub date: NaiveDate,
    pub amount: Money,
    pub raw_description: String,
    /// Kept for audit of what was sent to the classifier.
    pub sanitized_description: String,
    pub category: Option<Category>,
    pub category_source: Option<CategorySource>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }
}
