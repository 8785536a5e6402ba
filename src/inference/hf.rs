//! Hosted Hugging Face inference backends.
//!
//! Both backends POST `{inputs, parameters}` to `{api_base}/{model}`. The
//! HTTP client is built on first use so that constructing the pipeline does
//! no network setup.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use super::{Classification, Classifier, InferenceConfig, Summarizer};
use crate::error::InferenceError;

/// Shared HTTP plumbing for one hosted model.
struct HfEndpoint {
    backend: &'static str,
    url: String,
    token: Option<SecretString>,
    timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl HfEndpoint {
    fn new(backend: &'static str, config: &InferenceConfig, model: &str) -> Self {
        Self {
            backend,
            url: format!("{}/{}", config.api_base.trim_end_matches('/'), model),
            token: config.api_token.clone(),
            timeout: config.timeout,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, InferenceError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| InferenceError::RequestFailed {
                        backend: self.backend.into(),
                        reason: format!("Failed to build HTTP client: {e}"),
                    })
            })
            .await
    }

    async fn post<R: DeserializeOwned>(
        &self,
        payload: serde_json::Value,
    ) -> Result<R, InferenceError> {
        let client = self.client().await?;
        let mut request = client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed {
                backend: self.backend.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(InferenceError::AuthFailed {
                backend: self.backend.into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::RequestFailed {
                backend: self.backend.into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| InferenceError::RequestFailed {
                backend: self.backend.into(),
                reason: e.to_string(),
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// ── Zero-shot classification ────────────────────────────────────────

/// Zero-shot classifier (e.g. `facebook/bart-large-mnli`).
pub struct HfClassifier {
    endpoint: HfEndpoint,
}

impl HfClassifier {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            endpoint: HfEndpoint::new("hf-zero-shot", config, &config.classifier_model),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    /// Legacy shape: parallel arrays sorted by descending score.
    Ranked { labels: Vec<String>, scores: Vec<f32> },
    /// Router shape: list of label/score pairs.
    Pairs(Vec<LabelScore>),
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

impl ZeroShotResponse {
    fn top(self) -> Option<Classification> {
        match self {
            Self::Ranked { labels, scores } => labels
                .into_iter()
                .zip(scores)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(label, score)| Classification { label, score }),
            Self::Pairs(pairs) => pairs
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .map(|p| Classification {
                    label: p.label,
                    score: p.score,
                }),
        }
    }
}

#[async_trait]
impl Classifier for HfClassifier {
    fn name(&self) -> &str {
        self.endpoint.backend
    }

    async fn classify(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<Classification, InferenceError> {
        let payload = serde_json::json!({
            "inputs": text,
            "parameters": { "candidate_labels": labels },
        });
        let resp: ZeroShotResponse = self.endpoint.post(payload).await?;
        resp.top().ok_or_else(|| InferenceError::InvalidResponse {
            backend: self.endpoint.backend.into(),
            reason: "no labels in response".into(),
        })
    }
}

// ── Summarization ───────────────────────────────────────────────────

/// Abstractive summarizer (e.g. `sshleifer/distilbart-cnn-12-6`).
pub struct HfSummarizer {
    endpoint: HfEndpoint,
}

impl HfSummarizer {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            endpoint: HfEndpoint::new("hf-summarization", config, &config.summarizer_model),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryText {
    summary_text: String,
}

#[async_trait]
impl Summarizer for HfSummarizer {
    fn name(&self) -> &str {
        self.endpoint.backend
    }

    async fn summarize(
        &self,
        text: &str,
        max_len: usize,
        min_len: usize,
    ) -> Result<String, InferenceError> {
        let payload = serde_json::json!({
            "inputs": text,
            "parameters": {
                "max_length": max_len,
                "min_length": min_len,
                "num_beams": 4,
                "do_sample": false,
            },
        });
        let resp: Vec<SummaryText> = self.endpoint.post(payload).await?;
        first_summary(self.endpoint.backend, resp)
    }
}

/// First non-blank generated summary, trimmed.
fn first_summary(backend: &str, resp: Vec<SummaryText>) -> Result<String, InferenceError> {
    let invalid = |reason: &str| InferenceError::InvalidResponse {
        backend: backend.into(),
        reason: reason.into(),
    };
    let summary = resp
        .into_iter()
        .next()
        .ok_or_else(|| invalid("empty summarization response"))?;
    let text = summary.summary_text.trim();
    if text.is_empty() {
        return Err(invalid("blank summary_text"));
    }
    Ok(text.to_string())
}
