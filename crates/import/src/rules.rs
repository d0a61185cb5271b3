use smartspend_core::{normalize_text, Category, CategoryRule, OwnerId};

/// Tier-1 lookup: the highest-ranked rule whose pattern occurs in the
/// description. Implementations may index rules however they like as long as
/// the winner is the same as a linear scan in matching order.
pub trait RuleMatcher: Send + Sync {
    /// `description` is expected in [`normalize_text`] form.
    fn find_match(&self, normalized_description: &str) -> Option<&CategoryRule>;

    fn match_category(&self, description: &str) -> Option<Category> {
        self.find_match(&normalize_text(description))
            .map(|rule| rule.target_category)
    }
}

/// Point-in-time copy of one owner's rules, pre-sorted in matching order.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    owner_id: OwnerId,
    rules: Vec<CategoryRule>,
}

impl RuleSnapshot {
    /// Rules belonging to any other owner are discarded.
    pub fn new(owner_id: OwnerId, rules: Vec<CategoryRule>) -> Self {
        let mut rules: Vec<CategoryRule> = rules
            .into_iter()
            .filter(|r| r.owner_id == owner_id && !r.match_pattern.is_empty())
            .collect();
        rules.sort_by(CategoryRule::matching_order);
        Self { owner_id, rules }
    }

    pub fn empty(owner_id: OwnerId) -> Self {
        Self { owner_id, rules: Vec::new() }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleMatcher for RuleSnapshot {
    fn find_match(&self, normalized_description: &str) -> Option<&CategoryRule> {
        self.rules
            .iter()
            .find(|r| normalized_description.contains(r.match_pattern.as_str()))
    }
}

/// Stateless form of the matcher over an arbitrary rule slice. The input order
/// does not matter; the best-ranked matching rule wins.
pub fn match_description(description: &str, rules: &[CategoryRule]) -> Option<Category> {
    let text = normalize_text(description);
    rules
        .iter()
        .filter(|r| !r.match_pattern.is_empty() && text.contains(r.match_pattern.as_str()))
        .min_by(|a, b| CategoryRule::matching_order(a, b))
        .map(|r| r.target_category)
}
