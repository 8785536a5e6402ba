//! Stub connector and inference backends shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use mail_organizer::config::PipelineConfig;
use mail_organizer::connector::{MailConnector, MailSession};
use mail_organizer::error::{ConnectorError, InferenceError};
use mail_organizer::inference::{Classification, Classifier, Inference, Summarizer};
use mail_organizer::pipeline::{FetchFilter, Orchestrator, RawMessage};
use mail_organizer::rules::RuleSet;
use mail_organizer::store::LibSqlRecordStore;

/// Stub zero-shot classifier (no real API calls). Fails on any body that
/// contains `FAIL_MARKER`.
#[derive(Default)]
pub struct StubClassifier {
    pub calls: AtomicUsize,
}

pub const FAIL_MARKER: &str = "#classifier-down#";

#[async_trait]
impl Classifier for StubClassifier {
    fn name(&self) -> &str {
        "stub"
    }
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains(FAIL_MARKER) {
            return Err(InferenceError::RequestFailed {
                backend: "stub".into(),
                reason: "503 model loading".into(),
            });
        }
        let lower = text.to_lowercase();
        let label = labels
            .iter()
            .find(|l| {
                l.split(" & ")
                    .any(|word| lower.contains(&word.to_lowercase()))
            })
            .copied()
            .unwrap_or("General Announcements");
        Ok(Classification {
            label: label.to_string(),
            score: 0.75,
        })
    }
}

/// Stub summarizer that counts calls.
#[derive(Default)]
pub struct StubSummarizer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for StubSummarizer {
    fn name(&self) -> &str {
        "stub"
    }
    async fn summarize(&self, text: &str, _max: usize, _min: usize) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Summary of {} chars", text.chars().count()))
    }
}

/// Mailbox contents and failure switches for the stub connector.
#[derive(Default)]
pub struct StubMailbox {
    pub messages: Mutex<Vec<RawMessage>>,
    pub labels: Mutex<Vec<(String, String)>>,
    pub fail_auth: bool,
    pub fail_fetch: bool,
    pub reject_labels: bool,
}

#[derive(Clone, Default)]
pub struct StubConnector {
    pub mailbox: Arc<StubMailbox>,
}

#[async_trait]
impl MailConnector for StubConnector {
    fn name(&self) -> &str {
        "stub"
    }
    async fn authenticate(&self) -> Result<Box<dyn MailSession>, ConnectorError> {
        if self.mailbox.fail_auth {
            return Err(ConnectorError::AuthFailed {
                user: "student@uni.edu".into(),
            });
        }
        Ok(Box::new(StubSession {
            mailbox: Arc::clone(&self.mailbox),
        }))
    }
}

struct StubSession {
    mailbox: Arc<StubMailbox>,
}

#[async_trait]
impl MailSession for StubSession {
    async fn fetch_messages(&self, filter: &FetchFilter) -> Result<Vec<RawMessage>, ConnectorError> {
        if self.mailbox.fail_fetch {
            return Err(ConnectorError::Protocol {
                command: "UID SEARCH".into(),
                reason: "connection reset".into(),
            });
        }
        let messages = self.mailbox.messages.lock().unwrap();
        Ok(messages.iter().take(filter.max_results).cloned().collect())
    }

    async fn apply_label(&self, id: &str, label: &str) -> Result<bool, ConnectorError> {
        self.mailbox
            .labels
            .lock()
            .unwrap()
            .push((id.to_string(), label.to_string()));
        Ok(!self.mailbox.reject_labels)
    }
}

pub fn message(id: &str, subject: &str, body: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        sender: "Dean's Office <dean@uni.edu>".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
    }
}

/// Everything a test needs to drive and inspect a pipeline.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub classifier: Arc<StubClassifier>,
    pub summarizer: Arc<StubSummarizer>,
}

pub async fn harness() -> Harness {
    let config = PipelineConfig::default();
    let classifier = Arc::new(StubClassifier::default());
    let summarizer = Arc::new(StubSummarizer::default());
    let inference = Inference::new(classifier.clone(), summarizer.clone(), &config);
    let store = Arc::new(LibSqlRecordStore::new_memory().await.unwrap());
    let orchestrator =
        Orchestrator::new(store, inference, &RuleSet::default(), &config).unwrap();
    Harness {
        orchestrator: Arc::new(orchestrator),
        classifier,
        summarizer,
    }
}
