//! HTTP backend for a hosted zero-shot classification model
//! (inference-API style: `{inputs, parameters: {candidate_labels}}`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smartspend_core::SanitizedText;

use crate::backend::{ClassificationFailure, LabelScore, TextClassifier};

pub const DEFAULT_ENDPOINT: &str =
    "https://router.huggingface.co/hf-inference/models/valhalla/distilbart-mnli-12-1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroShotConfig {
    pub endpoint: String,
    /// Bearer token. Empty disables the backend.
    pub token: String,
    pub timeout_ms: u64,
}

impl Default for ZeroShotConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: String::new(),
            timeout_ms: 10_000,
        }
    }
}

impl ZeroShotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_enabled(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

#[derive(Serialize)]
struct Request<'a> {
    inputs: &'a str,
    parameters: Parameters<'a>,
}

#[derive(Serialize)]
struct Parameters<'a> {
    candidate_labels: &'a [&'static str],
}

#[derive(Deserialize)]
struct ZeroShotBody {
    labels: Vec<String>,
    scores: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    One(ZeroShotBody),
    Many(Vec<ZeroShotBody>),
}

pub struct ZeroShotClassifier {
    client: reqwest::Client,
    config: ZeroShotConfig,
}

impl ZeroShotClassifier {
    pub fn new(config: ZeroShotConfig) -> Result<Self, ClassificationFailure> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClassificationFailure::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextClassifier for ZeroShotClassifier {
    async fn classify(
        &self,
        text: &SanitizedText,
        labels: &[&'static str],
    ) -> Result<Vec<LabelScore>, ClassificationFailure> {
        if !self.config.is_enabled() {
            return Err(ClassificationFailure::Disabled);
        }

        let request = Request {
            inputs: text.as_str(),
            parameters: Parameters { candidate_labels: labels },
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.token.trim())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassificationFailure::Timeout(self.config.timeout())
                } else {
                    ClassificationFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassificationFailure::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClassificationFailure::Transport(e.to_string()))?;
        parse_response(&body)
    }
}

/// Accepts either a single `{labels, scores}` object or a one-element list of it.
pub fn parse_response(body: &str) -> Result<Vec<LabelScore>, ClassificationFailure> {
    let parsed: ZeroShotResponse = serde_json::from_str(body)
        .map_err(|e| ClassificationFailure::Malformed(e.to_string()))?;
    let body = match parsed {
        ZeroShotResponse::One(body) => body,
        ZeroShotResponse::Many(list) => list
            .into_iter()
            .next()
            .ok_or_else(|| ClassificationFailure::Malformed("empty result list".to_string()))?,
    };
    if body.labels.is_empty() {
        return Err(ClassificationFailure::Malformed("no labels returned".to_string()));
    }
    if body.labels.len() != body.scores.len() {
        return Err(ClassificationFailure::Malformed(format!(
            "{} labels but {} scores",
            body.labels.len(),
            body.scores.len()
        )));
    }
    Ok(body
        .labels
        .into_iter()
        .zip(body.scores)
        .map(|(label, score)| LabelScore { label, score })
        .collect())
}
