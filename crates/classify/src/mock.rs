use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use smartspend_core::SanitizedText;

use crate::backend::{ClassificationFailure, LabelScore, TextClassifier};

/// In-process classifier for tests and for running without network access.
///
/// Answers from a per-substring script first, then from the default answer.
/// Scripts are tried in the order they were added and the first match wins.
/// Every call's text is recorded, as is the peak number of calls in flight.
#[derive(Clone)]
pub struct MockClassifier {
    default: Result<Vec<LabelScore>, ClassificationFailure>,
    scripted: Vec<(String, Result<Vec<LabelScore>, ClassificationFailure>)>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockClassifier {
    pub fn scores(scores: Vec<LabelScore>) -> Self {
        Self {
            default: Ok(scores),
            scripted: Vec::new(),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn label(label: &str, score: f32) -> Self {
        Self::scores(vec![LabelScore::new(label, score)])
    }

    pub fn failing(failure: ClassificationFailure) -> Self {
        Self {
            default: Err(failure),
            ..Self::scores(Vec::new())
        }
    }

    /// Answer with `label` whenever the text contains `needle` (case-insensitive).
    pub fn when(mut self, needle: &str, label: &str, score: f32) -> Self {
        self.scripted
            .push((needle.to_lowercase(), Ok(vec![LabelScore::new(label, score)])));
        self
    }

    pub fn fail_when(mut self, needle: &str, failure: ClassificationFailure) -> Self {
        self.scripted.push((needle.to_lowercase(), Err(failure)));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the recorded request texts.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    /// Most calls that were ever running at the same time, across clones.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextClassifier for MockClassifier {
    async fn classify(
        &self,
        text: &SanitizedText,
        _labels: &[&'static str],
    ) -> Result<Vec<LabelScore>, ClassificationFailure> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(text.as_str().to_string());
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let lowered = text.as_str().to_lowercase();
        self.scripted
            .iter()
            .find(|(needle, _)| lowered.contains(needle.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartspend_core::sanitize;

    #[tokio::test]
    async fn scripted_answers_take_precedence() {
        let mock = MockClassifier::label("Dining", 0.6)
            .when("shell", "Transport", 0.9)
            .fail_when("broken", ClassificationFailure::Status(500));
        let labels = smartspend_core::Category::labels();

        let shell = mock.classify(&sanitize("SHELL OIL 42"), &labels).await.unwrap();
        assert_eq!(shell[0].label, "Transport");

        let other = mock.classify(&sanitize("Corner Cafe"), &labels).await.unwrap();
        assert_eq!(other[0].label, "Dining");

        assert!(mock.classify(&sanitize("broken thing"), &labels).await.is_err());
        assert_eq!(mock.calls().lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn earliest_matching_script_wins() {
        let labels = smartspend_core::Category::labels();
        let mock = MockClassifier::label("Dining", 0.6)
            .when("uber", "Transport", 0.9)
            .when("uber eats", "Dining", 0.9);
        for _ in 0..5 {
            let scores = mock.classify(&sanitize("UBER EATS 1234"), &labels).await.unwrap();
            assert_eq!(scores[0].label, "Transport");
        }

        let reversed = MockClassifier::label("Shopping", 0.6)
            .when("uber eats", "Dining", 0.9)
            .when("uber", "Transport", 0.9);
        let scores = reversed.classify(&sanitize("UBER EATS 1234"), &labels).await.unwrap();
        assert_eq!(scores[0].label, "Dining");
    }

    #[tokio::test]
    async fn peak_tracks_overlapping_calls() {
        let labels = smartspend_core::Category::labels();
        let mock = MockClassifier::label("Dining", 0.6).with_delay(Duration::from_millis(20));
        let text = sanitize("Cafe");
        let (a, b, c) = tokio::join!(
            mock.classify(&text, &labels),
            mock.classify(&text, &labels),
            mock.classify(&text, &labels),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(mock.peak_in_flight(), 3);

        mock.classify(&text, &labels).await.unwrap();
        assert_eq!(mock.peak_in_flight(), 3);
    }
}
