//! Two-tier categorization of a single description: owner rules first, the
//! external classifier only when no rule matches.

use smartspend_classify::{ClassifierOutcome, ExternalClassifier};
use smartspend_core::{normalize_text, sanitize, Category, CategorySource, RuleId, SanitizedText};
use smartspend_import::RuleMatcher;

#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub category: Category,
    pub source: CategorySource,
    /// What tier 2 saw (or would have seen).
    pub sanitized: SanitizedText,
    /// Set when a rule decided the category.
    pub rule_id: Option<RuleId>,
}

#[derive(Clone)]
pub struct CategorizationEngine {
    classifier: ExternalClassifier,
}

impl CategorizationEngine {
    pub fn new(classifier: ExternalClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &ExternalClassifier {
        &self.classifier
    }

    /// Never fails: a classifier problem degrades to the default category.
    pub async fn categorize(&self, description: &str, rules: &dyn RuleMatcher) -> Categorization {
        let sanitized = sanitize(description);
        let normalized = normalize_text(sanitized.as_str());

        if let Some(rule) = rules.find_match(&normalized) {
            tracing::debug!(rule_id = %rule.id, category = %rule.target_category, "rule match");
            return Categorization {
                category: rule.target_category,
                source: CategorySource::Rule,
                sanitized,
                rule_id: Some(rule.id),
            };
        }

        if normalized.is_empty() {
            return Categorization {
                category: Category::DEFAULT,
                source: CategorySource::Default,
                sanitized,
                rule_id: None,
            };
        }

        let outcome = self.classifier.classify(&sanitized).await;
        if let ClassifierOutcome::Labelled { category, confidence } = &outcome {
            tracing::debug!(%category, confidence, "classifier label");
        }
        Categorization {
            category: outcome.category(),
            source: outcome.source(),
            sanitized,
            rule_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use smartspend_classify::{ClassificationFailure, MockClassifier};
    use smartspend_core::{normalize_pattern, CategoryRule, OwnerId, RuleOrigin};
    use smartspend_import::RuleSnapshot;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(mock: MockClassifier) -> CategorizationEngine {
        CategorizationEngine::new(ExternalClassifier::new(
            Arc::new(mock),
            Duration::from_millis(200),
        ))
    }

    fn snapshot(owner: OwnerId, rules: &[(&str, Category, i64)]) -> RuleSnapshot {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, (pattern, category, priority))| CategoryRule {
                id: RuleId(i as i64 + 1),
                owner_id: owner,
                match_pattern: normalize_pattern(pattern).unwrap(),
                target_category: *category,
                priority: *priority,
                origin: RuleOrigin::UserManual,
                created_at: Utc::now(),
            })
            .collect();
        RuleSnapshot::new(owner, rules)
    }

    #[tokio::test]
    async fn rule_match_skips_classifier() {
        let owner = OwnerId::new();
        let mock = MockClassifier::label("Dining", 0.9);
        let calls = mock.calls();
        let engine = engine(mock);
        let rules = snapshot(owner, &[("walmart", Category::Groceries, 1)]);

        let result = engine.categorize("WALMART  Groceries #42", &rules).await;
        assert_eq!(result.category, Category::Groceries);
        assert_eq!(result.source, CategorySource::Rule);
        assert_eq!(result.rule_id, Some(RuleId(1)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn highest_priority_rule_wins() {
        let owner = OwnerId::new();
        let engine = engine(MockClassifier::label("Dining", 0.9));
        let rules = snapshot(
            owner,
            &[("uber", Category::Transport, 1), ("uber eats", Category::Dining, 5)],
        );
        let result = engine.categorize("UBER EATS order", &rules).await;
        assert_eq!(result.category, Category::Dining);
        assert_eq!(result.source, CategorySource::Rule);
    }

    #[tokio::test]
    async fn falls_back_to_classifier_with_sanitized_text() {
        let owner = OwnerId::new();
        let mock = MockClassifier::label("Dining", 0.93);
        let calls = mock.calls();
        let engine = engine(mock);

        let result = engine
            .categorize("Unknown Merchant XYZ card 4111 1111 1111 1111", &RuleSnapshot::empty(owner))
            .await;
        assert_eq!(result.category, Category::Dining);
        assert_eq!(result.source, CategorySource::Ai);

        let sent = calls.lock().unwrap().clone();
        assert_eq!(sent, vec!["Unknown Merchant XYZ card [CARD]".to_string()]);
    }

    #[tokio::test]
    async fn classifier_failure_defaults() {
        let engine = engine(MockClassifier::failing(ClassificationFailure::Status(503)));
        let result = engine
            .categorize("Mystery shop", &RuleSnapshot::empty(OwnerId::new()))
            .await;
        assert_eq!(result.category, Category::Uncategorized);
        assert_eq!(result.source, CategorySource::Default);
    }

    #[tokio::test]
    async fn classifier_timeout_defaults() {
        let mock = MockClassifier::label("Dining", 0.9).with_delay(Duration::from_secs(5));
        let engine = CategorizationEngine::new(ExternalClassifier::new(
            Arc::new(mock),
            Duration::from_millis(20),
        ));
        let result = engine
            .categorize("Slow merchant", &RuleSnapshot::empty(OwnerId::new()))
            .await;
        assert_eq!(result.category, Category::Uncategorized);
        assert_eq!(result.source, CategorySource::Default);
    }

    #[tokio::test]
    async fn empty_description_is_not_sent() {
        let mock = MockClassifier::label("Dining", 0.9);
        let calls = mock.calls();
        let engine = engine(mock);
        let result = engine.categorize("   ", &RuleSnapshot::empty(OwnerId::new())).await;
        assert_eq!(result.source, CategorySource::Default);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_categorization_is_stable() {
        let owner = OwnerId::new();
        let engine = engine(MockClassifier::label("Health", 0.7));
        let rules = snapshot(owner, &[("pharmacy", Category::Health, 2)]);
        for desc in ["CVS PHARMACY 123", "Dentist visit"] {
            let first = engine.categorize(desc, &rules).await;
            let second = engine.categorize(desc, &rules).await;
            assert_eq!(first, second);
        }
    }
}
