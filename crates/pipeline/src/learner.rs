//! Rules from user input: learned from a correction, or added by hand.

use smartspend_core::{
    normalize_pattern, Category, CategoryRule, CategorySource, OwnerId, RuleOrigin, TransactionId,
};
use smartspend_storage::{
    get_transaction, max_rule_priority, relabel_transaction, upsert_rule, DbPool, NewRule,
    StoreError,
};

use crate::error::PipelineError;

/// Turns a correction into a rule ranked above every other rule of the owner
/// and relabels the corrected transaction as `manual`. Both writes share one
/// database transaction.
///
/// Existing transactions with the same description are left as they are.
pub async fn learn_from_correction(
    pool: &DbPool,
    owner_id: OwnerId,
    transaction_id: TransactionId,
    category: Category,
) -> Result<CategoryRule, PipelineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    let corrected = get_transaction(&mut tx, owner_id, transaction_id)
        .await?
        .ok_or(PipelineError::NotFound("transaction"))?;
    let pattern =
        normalize_pattern(&corrected.raw_description).ok_or(PipelineError::EmptyDescription)?;

    let priority = next_priority(max_rule_priority(&mut tx, owner_id).await?);
    let rule = upsert_rule(
        &mut tx,
        &NewRule {
            owner_id,
            match_pattern: pattern,
            target_category: category,
            priority,
            origin: RuleOrigin::LearnedFromCorrection,
        },
    )
    .await?;

    relabel_transaction(&mut tx, owner_id, transaction_id, category, CategorySource::Manual).await?;
    tx.commit().await.map_err(StoreError::from)?;

    tracing::info!(
        %owner_id,
        %transaction_id,
        rule_id = %rule.id,
        priority = rule.priority,
        category = %category,
        "rule learned from correction"
    );
    Ok(rule)
}

/// Creates (or replaces) a `user_manual` rule. Without an explicit priority
/// the rule goes above the owner's current highest.
pub async fn add_rule(
    pool: &DbPool,
    owner_id: OwnerId,
    pattern: &str,
    category: Category,
    priority: Option<i64>,
) -> Result<CategoryRule, PipelineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    let priority = match priority {
        Some(p) => p,
        None => next_priority(max_rule_priority(&mut tx, owner_id).await?),
    };
    let rule = upsert_rule(
        &mut tx,
        &NewRule {
            owner_id,
            match_pattern: pattern.to_string(),
            target_category: category,
            priority,
            origin: RuleOrigin::UserManual,
        },
    )
    .await?;
    tx.commit().await.map_err(StoreError::from)?;

    tracing::info!(%owner_id, rule_id = %rule.id, priority = rule.priority, "rule added");
    Ok(rule)
}

fn next_priority(current_max: Option<i64>) -> i64 {
    current_max.map_or(1, |p| p.saturating_add(1))
}
