use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::category::Category;
use crate::ids::{OwnerId, RuleId};
use crate::sanitize::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    UserManual,
    LearnedFromCorrection,
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOrigin::UserManual => write!(f, "user_manual"),
            RuleOrigin::LearnedFromCorrection => write!(f, "learned_from_correction"),
        }
    }
}

impl FromStr for RuleOrigin {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_manual" => Ok(RuleOrigin::UserManual),
            "learned_from_correction" => Ok(RuleOrigin::LearnedFromCorrection),
            other => Err(format!("Unknown rule origin: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: RuleId,
    pub owner_id: OwnerId,
    /// Always stored in [`normalize_pattern`] form, never empty.
    pub match_pattern: String,
    pub target_category: Category,
    pub priority: i64,
    pub origin: RuleOrigin,
    pub created_at: DateTime<Utc>,
}

impl CategoryRule {
    /// Matching order: priority desc, then newest first. The id breaks any
    /// remaining tie so the order is total.
    pub fn matching_order(a: &CategoryRule, b: &CategoryRule) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.0.cmp(&a.id.0))
    }
}

/// Lowercases and collapses every whitespace run to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of a rule pattern, derived from a description the same way
/// descriptions are prepared for matching. Returns `None` when nothing is left.
pub fn normalize_pattern(text: &str) -> Option<String> {
    let pattern = normalize_text(sanitize(text).as_str());
    if pattern.is_empty() {
        None
    } else {
        Some(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule(id: i64, priority: i64, secs: i64) -> CategoryRule {
        CategoryRule {
            id: RuleId(id),
            owner_id: OwnerId::new(),
            match_pattern: "x".to_string(),
            target_category: Category::Dining,
            priority,
            origin: RuleOrigin::UserManual,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_text("  Walmart\t  GROCERIES\n#12 "), "walmart groceries #12");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn normalize_pattern_masks_and_rejects_empty() {
        assert_eq!(
            normalize_pattern("NETFLIX  Payment 12345678").as_deref(),
            Some("netflix payment [account]")
        );
        assert_eq!(normalize_pattern("   "), None);
    }

    #[test]
    fn higher_priority_sorts_first() {
        let mut rules = vec![rule(1, 1, 100), rule(2, 10, 50)];
        rules.sort_by(CategoryRule::matching_order);
        assert_eq!(rules[0].id, RuleId(2));
    }

    #[test]
    fn ties_broken_by_newest() {
        let mut rules = vec![rule(1, 5, 100), rule(2, 5, 200), rule(3, 5, 200)];
        rules.sort_by(CategoryRule::matching_order);
        let ids: Vec<i64> = rules.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn origin_roundtrip() {
        for o in [RuleOrigin::UserManual, RuleOrigin::LearnedFromCorrection] {
            assert_eq!(RuleOrigin::from_str(&o.to_string()).unwrap(), o);
        }
    }
}
