use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use smartspend_core::{Category, CategorySource, SanitizedText};

use crate::backend::{ClassificationFailure, LabelScore, TextClassifier};

/// Result of a tier-2 lookup. `Unavailable` is a value, not an error: callers
/// fall back to [`Category::DEFAULT`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Labelled { category: Category, confidence: f32 },
    Unavailable(ClassificationFailure),
}

impl ClassifierOutcome {
    pub fn category(&self) -> Category {
        match self {
            ClassifierOutcome::Labelled { category, .. } => *category,
            ClassifierOutcome::Unavailable(_) => Category::DEFAULT,
        }
    }

    pub fn source(&self) -> CategorySource {
        match self {
            ClassifierOutcome::Labelled { .. } => CategorySource::Ai,
            ClassifierOutcome::Unavailable(_) => CategorySource::Default,
        }
    }
}

/// Wraps a backend with the per-call timeout and the closed label set.
#[derive(Clone)]
pub struct ExternalClassifier {
    backend: Arc<dyn TextClassifier>,
    timeout: Duration,
}

impl ExternalClassifier {
    pub fn new(backend: Arc<dyn TextClassifier>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn classify(&self, text: &SanitizedText) -> ClassifierOutcome {
        let labels = Category::labels();
        let scored = match tokio::time::timeout(self.timeout, self.backend.classify(text, &labels)).await {
            Ok(result) => result,
            Err(_) => Err(ClassificationFailure::Timeout(self.timeout)),
        };

        match scored.and_then(|scores| best_label(&scores)) {
            Ok((category, confidence)) => ClassifierOutcome::Labelled { category, confidence },
            Err(failure) => {
                tracing::warn!(%failure, text = %text, "classification unavailable, using default");
                ClassifierOutcome::Unavailable(failure)
            }
        }
    }
}

/// Highest score wins; on a tie the first listed label is kept.
fn best_label(scores: &[LabelScore]) -> Result<(Category, f32), ClassificationFailure> {
    let mut best: Option<&LabelScore> = None;
    for candidate in scores {
        match best {
            Some(b) if candidate.score <= b.score => {}
            _ if candidate.score.is_nan() => {}
            _ => best = Some(candidate),
        }
    }
    let best = best.ok_or_else(|| ClassificationFailure::Malformed("no labels returned".to_string()))?;
    let category = Category::from_str(&best.label)
        .map_err(|_| ClassificationFailure::UnknownLabel(best.label.clone()))?;
    Ok((category, best.score))
}
