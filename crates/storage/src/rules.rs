use chrono::{DateTime, Utc};
use smartspend_core::{normalize_pattern, Category, CategoryRule, OwnerId, RuleId, RuleOrigin};
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::error::{parse_field, StoreError};

/// A rule as submitted; the pattern is normalized on write.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub owner_id: OwnerId,
    pub match_pattern: String,
    pub target_category: Category,
    pub priority: i64,
    pub origin: RuleOrigin,
}

type RuleRow = (i64, String, String, String, i64, String, DateTime<Utc>);

const RULE_COLUMNS: &str =
    "id, owner_id, match_pattern, target_category, priority, origin, created_at";

fn rule_from_row(r: RuleRow) -> Result<CategoryRule, StoreError> {
    Ok(CategoryRule {
        id: RuleId(r.0),
        owner_id: parse_field("owner id", &r.1)?,
        match_pattern: r.2,
        target_category: parse_field("category", &r.3)?,
        priority: r.4,
        origin: parse_field("rule origin", &r.5)?,
        created_at: r.6,
    })
}

/// Inserts a rule, or overwrites the owner's existing rule with the same
/// normalized pattern (target, priority and origin are replaced).
pub async fn upsert_rule(
    conn: &mut SqliteConnection,
    rule: &NewRule,
) -> Result<CategoryRule, StoreError> {
    let pattern = normalize_pattern(&rule.match_pattern).ok_or(StoreError::EmptyPattern)?;

    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "INSERT INTO category_rules (owner_id, match_pattern, target_category, priority, origin, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (owner_id, match_pattern) DO UPDATE SET \
             target_category = excluded.target_category, \
             priority = excluded.priority, \
             origin = excluded.origin \
         RETURNING {RULE_COLUMNS}"
    ))
    .bind(rule.owner_id.to_string())
    .bind(&pattern)
    .bind(rule.target_category.as_str())
    .bind(rule.priority)
    .bind(rule.origin.to_string())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    rule_from_row(row)
}

/// The owner's rules in matching order.
pub async fn list_rules(pool: &DbPool, owner_id: OwnerId) -> Result<Vec<CategoryRule>, StoreError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM category_rules WHERE owner_id = ? \
         ORDER BY priority DESC, created_at DESC, id DESC"
    ))
    .bind(owner_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(rule_from_row).collect()
}

pub async fn get_rule(
    pool: &DbPool,
    owner_id: OwnerId,
    id: RuleId,
) -> Result<Option<CategoryRule>, StoreError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM category_rules WHERE id = ? AND owner_id = ?"
    ))
    .bind(id.0)
    .bind(owner_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(rule_from_row).transpose()
}

pub async fn max_rule_priority(
    conn: &mut SqliteConnection,
    owner_id: OwnerId,
) -> Result<Option<i64>, StoreError> {
    let (max,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(priority) FROM category_rules WHERE owner_id = ?")
            .bind(owner_id.to_string())
            .fetch_one(&mut *conn)
            .await?;
    Ok(max)
}
