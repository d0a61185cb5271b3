use async_trait::async_trait;
use smartspend_core::SanitizedText;
use std::time::Duration;
use thiserror::Error;

/// Why a tier-2 lookup produced no usable label. Never fatal to a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationFailure {
    #[error("classifier disabled: no API token configured")]
    Disabled,
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
    #[error("classifier request failed: {0}")]
    Transport(String),
    #[error("classifier returned HTTP {0}")]
    Status(u16),
    #[error("malformed classifier response: {0}")]
    Malformed(String),
    #[error("classifier returned unknown label '{0}'")]
    UnknownLabel(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self { label: label.into(), score }
    }
}

/// Abstraction over a zero-shot text classification service.
/// Implementations receive already-sanitized text and the candidate labels and
/// return per-label scores in any order.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &SanitizedText,
        labels: &[&'static str],
    ) -> Result<Vec<LabelScore>, ClassificationFailure>;
}
