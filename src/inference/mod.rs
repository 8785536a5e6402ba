//! Inference adapters for topic classification and summarization.
//!
//! Backends sit behind the `Classifier` and `Summarizer` traits. The
//! `Inference` capability object wraps them with the short-text
//! short-circuits and the summarizer's local recovery, and is built once at
//! startup and passed by reference into the orchestrator.

pub mod hf;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::InferenceError;
use crate::pipeline::types::Category;

pub use hf::{HfClassifier, HfSummarizer};

/// Placeholder summary when the body is too short.
pub const SUMMARY_TOO_SHORT: &str = "Content too short to summarize.";

/// Placeholder summary when the summarizer backend fails.
pub const SUMMARY_FAILED: &str = "Could not generate summary.";

/// Top label and its confidence from a zero-shot classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

/// Zero-shot topic classifier backend.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Pick the best of `labels` for `text`.
    async fn classify(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<Classification, InferenceError>;
}

/// Abstractive summarizer backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Summarize `text` into roughly `min_len..=max_len` tokens.
    async fn summarize(
        &self,
        text: &str,
        max_len: usize,
        min_len: usize,
    ) -> Result<String, InferenceError>;
}

/// Connection settings for the hosted inference backends.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub api_base: String,
    pub api_token: Option<secrecy::SecretString>,
    pub classifier_model: String,
    pub summarizer_model: String,
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api-inference.huggingface.co/models".to_string(),
            api_token: None,
            classifier_model: "facebook/bart-large-mnli".to_string(),
            summarizer_model: "sshleifer/distilbart-cnn-12-6".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Classification and summarization capability shared by every batch.
#[derive(Clone)]
pub struct Inference {
    classifier: Arc<dyn Classifier>,
    summarizer: Arc<dyn Summarizer>,
    min_classify_chars: usize,
    min_summarize_chars: usize,
    summarize_input_chars: usize,
    summary_max_len: usize,
    summary_min_len: usize,
}

impl Inference {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        summarizer: Arc<dyn Summarizer>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            classifier,
            summarizer,
            min_classify_chars: config.min_classify_chars,
            min_summarize_chars: config.min_summarize_chars,
            summarize_input_chars: config.summarize_input_chars,
            summary_max_len: config.summary_max_len,
            summary_min_len: config.summary_min_len,
        }
    }

    /// Build the hosted (Hugging Face) backends from config.
    pub fn hosted(inference: &InferenceConfig, pipeline: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(HfClassifier::new(inference)),
            Arc::new(HfSummarizer::new(inference)),
            pipeline,
        )
    }

    /// Classify `text` over the fixed category set.
    ///
    /// Text under the minimum length maps to `NoReadableText` with zero
    /// confidence without calling the backend. Backend failures propagate.
    pub async fn classify(&self, text: &str) -> Result<(Category, f32), InferenceError> {
        if text.trim().chars().count() < self.min_classify_chars {
            return Ok((Category::NoReadableText, 0.0));
        }

        let labels = Category::candidate_labels();
        let result = self.classifier.classify(text, &labels).await?;
        let category = Category::ALL
            .iter()
            .find(|c| c.as_str() == result.label)
            .copied()
            .ok_or_else(|| InferenceError::UnknownLabel(result.label.clone()))?;

        debug!(
            backend = self.classifier.name(),
            category = %category,
            score = result.score,
            "Classified"
        );
        Ok((category, result.score))
    }

    /// Summarize `text`. Never fails: short text and backend errors both
    /// produce fixed placeholders.
    pub async fn summarize(&self, text: &str) -> String {
        if text.trim().chars().count() < self.min_summarize_chars {
            return SUMMARY_TOO_SHORT.to_string();
        }

        let input: String = text.chars().take(self.summarize_input_chars).collect();
        match self
            .summarizer
            .summarize(&input, self.summary_max_len, self.summary_min_len)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    backend = self.summarizer.name(),
                    error = %e,
                    "Summarization failed, using placeholder"
                );
                SUMMARY_FAILED.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClassifier {
        label: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn classify(
            &self,
            _text: &str,
            labels: &[&str],
        ) -> Result<Classification, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(labels.len(), 11);
            Ok(Classification {
                label: self.label.to_string(),
                score: 0.87,
            })
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        fn name(&self) -> &str {
            "failing"
        }
        async fn classify(
            &self,
            _text: &str,
            _labels: &[&str],
        ) -> Result<Classification, InferenceError> {
            Err(InferenceError::RequestFailed {
                backend: "failing".into(),
                reason: "model loading".into(),
            })
        }
    }

    /// Records the inputs it was called with.
    #[derive(Default)]
    struct RecordingSummarizer {
        inputs: Mutex<Vec<(String, usize, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl Summarizer for RecordingSummarizer {
        fn name(&self) -> &str {
            "recording"
        }
        async fn summarize(
            &self,
            text: &str,
            max_len: usize,
            min_len: usize,
        ) -> Result<String, InferenceError> {
            self.inputs
                .lock()
                .unwrap()
                .push((text.to_string(), max_len, min_len));
            if self.fail {
                return Err(InferenceError::InvalidResponse {
                    backend: "recording".into(),
                    reason: "boom".into(),
                });
            }
            Ok("a short summary".to_string())
        }
    }

    fn inference(
        classifier: Arc<dyn Classifier>,
        summarizer: Arc<RecordingSummarizer>,
    ) -> Inference {
        Inference::new(classifier, summarizer, &PipelineConfig::default())
    }

    fn fixed(label: &'static str) -> Arc<FixedClassifier> {
        Arc::new(FixedClassifier {
            label,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn classify_short_text_skips_backend() {
        let classifier = fixed("Finance & Fees");
        let inf = inference(classifier.clone(), Arc::default());
        let (category, score) = inf.classify("   hi there   ").await.unwrap();
        assert_eq!(category, Category::NoReadableText);
        assert_eq!(score, 0.0);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn classify_maps_backend_label() {
        let classifier = fixed("Finance & Fees");
        let inf = inference(classifier.clone(), Arc::default());
        let (category, score) = inf
            .classify("Your semester fee is due next week.")
            .await
            .unwrap();
        assert_eq!(category, Category::FinanceFees);
        assert!((score - 0.87).abs() < f32::EPSILON);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classify_rejects_label_outside_set() {
        let inf = inference(fixed("No Readable Text"), Arc::default());
        let err = inf.classify("A long enough message body").await.unwrap_err();
        assert!(matches!(err, InferenceError::UnknownLabel(_)));
    }

    #[tokio::test]
    async fn classify_propagates_backend_failure() {
        let inf = inference(Arc::new(FailingClassifier), Arc::default());
        let err = inf.classify("A long enough message body").await.unwrap_err();
        assert!(matches!(err, InferenceError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn summarize_short_text_skips_backend() {
        let summarizer = Arc::new(RecordingSummarizer::default());
        let inf = inference(fixed("Finance & Fees"), summarizer.clone());
        let body = "x".repeat(30);
        assert_eq!(inf.summarize(&body).await, SUMMARY_TOO_SHORT);
        assert!(summarizer.inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn summarize_truncates_input_and_passes_limits() {
        let summarizer = Arc::new(RecordingSummarizer::default());
        let inf = inference(fixed("Finance & Fees"), summarizer.clone());
        let body = "word ".repeat(500);
        assert_eq!(inf.summarize(&body).await, "a short summary");

        let calls = summarizer.inputs.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (input, max_len, min_len) = &calls[0];
        assert_eq!(input.chars().count(), 1024);
        assert_eq!((*max_len, *min_len), (60, 15));
    }

    #[tokio::test]
    async fn summarize_recovers_from_backend_failure() {
        let summarizer = Arc::new(RecordingSummarizer {
            fail: true,
            ..Default::default()
        });
        let inf = inference(fixed("Finance & Fees"), summarizer);
        let body = "This announcement is long enough to be summarized by the model.";
        assert_eq!(inf.summarize(body).await, SUMMARY_FAILED);
    }
}
