//! Enrichment orchestrator: dedup, enrich, label and persist each message.
//!
//! Flow for one batch:
//! 1. Read stored ids once and drop candidates already stored (dedup gate)
//! 2. Skip bodies with no readable content
//! 3. classify → summarize → draft reply → security scan → newsletter check
//! 4. Apply the category label (best-effort)
//! 5. `insert_if_absent`
//!
//! Messages are processed one at a time. A stage failure skips that message
//! only; it stays absent from the store and is retried on the next run.
//! Connector and store failures abort the batch.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::connector::{MailConnector, MailSession};
use crate::error::{ConfigError, Result, StageError};
use crate::inference::Inference;
use crate::pipeline::types::{
    BatchProgress, BatchReport, EnrichedRecord, FetchFilter, ProgressStatus, RawMessage, Stage,
};
use crate::reply::draft_reply;
use crate::rules::{NewsletterDetector, RuleSet, SecurityScanner};
use crate::store::RecordStore;

/// Runs batches of raw messages through the enrichment stages.
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    inference: Inference,
    scanner: SecurityScanner,
    newsletter: NewsletterDetector,
    min_body_chars: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        inference: Inference,
        rules: &RuleSet,
        config: &PipelineConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            store,
            inference,
            scanner: SecurityScanner::new(rules)?,
            newsletter: NewsletterDetector::new(rules)?,
            min_body_chars: config.min_body_chars,
        })
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Authenticate, fetch with `filter`, and process the result.
    ///
    /// Authentication and fetch errors are returned before anything is
    /// processed.
    pub async fn run_batch<F>(
        &self,
        connector: &dyn MailConnector,
        filter: &FetchFilter,
        progress: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(&BatchProgress<'_>) + Send,
    {
        info!(
            connector = connector.name(),
            max_results = filter.max_results,
            since = ?filter.since,
            unread_only = filter.unread_only,
            "Starting batch"
        );

        let session = connector.authenticate().await?;
        let result = match session.fetch_messages(filter).await {
            Ok(messages) => self.process_batch(session.as_ref(), &messages, progress).await,
            Err(e) => Err(e.into()),
        };
        session.close().await;
        result
    }

    /// Process already-fetched candidates against `session`.
    pub async fn process_batch<F>(
        &self,
        session: &dyn MailSession,
        candidates: &[RawMessage],
        mut progress: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(&BatchProgress<'_>) + Send,
    {
        let mut report = BatchReport::default();

        let mut seen: HashSet<String> = self.store.stored_ids().await?;
        let mut fresh = Vec::with_capacity(candidates.len());
        for msg in candidates {
            // `insert` also catches ids repeated within this batch.
            if seen.insert(msg.id.clone()) {
                fresh.push(msg);
            } else {
                debug!(id = %msg.id, "Already stored, skipping");
                report.skipped_existing += 1;
            }
        }

        report.attempted = fresh.len();
        let total = fresh.len();

        for (i, msg) in fresh.into_iter().enumerate() {
            let status = self.process_one(session, msg, &mut report).await?;
            progress(&BatchProgress {
                index: i + 1,
                total,
                subject: &msg.subject,
                status,
            });
        }

        info!(
            attempted = report.attempted,
            newly_saved = report.newly_saved,
            skipped_existing = report.skipped_existing,
            skipped_unreadable = report.skipped_unreadable,
            failed = report.failed,
            label_failures = report.label_failures,
            "Batch complete"
        );
        Ok(report)
    }

    async fn process_one(
        &self,
        session: &dyn MailSession,
        msg: &RawMessage,
        report: &mut BatchReport,
    ) -> Result<ProgressStatus> {
        if msg.body.trim().chars().count() < self.min_body_chars {
            debug!(id = %msg.id, "No readable body, skipping");
            report.skipped_unreadable += 1;
            return Ok(ProgressStatus::SkippedUnreadable);
        }

        let record = match self.enrich(msg).await {
            Ok(record) => record,
            Err(e) => {
                error!(id = %msg.id, stage = %e.stage, error = %e.source, "Stage failed, skipping message");
                report.failed += 1;
                return Ok(ProgressStatus::Failed(e.stage));
            }
        };

        let label = record.category.as_str();
        match session.apply_label(&msg.id, label).await {
            Ok(true) => debug!(id = %msg.id, label, "Label applied"),
            Ok(false) => {
                warn!(id = %msg.id, label, "Label not applied");
                report.label_failures += 1;
            }
            Err(e) => {
                warn!(id = %msg.id, label, error = %e, "Label application failed");
                report.label_failures += 1;
            }
        }

        if self.store.insert_if_absent(&record).await? {
            info!(id = %msg.id, category = %record.category, "Saved");
            report.newly_saved += 1;
            Ok(ProgressStatus::Saved)
        } else {
            debug!(id = %msg.id, "Stored concurrently, not saved again");
            Ok(ProgressStatus::AlreadyStored)
        }
    }

    /// Run every stage, in order, against one message.
    async fn enrich(&self, msg: &RawMessage) -> std::result::Result<EnrichedRecord, StageError> {
        let (category, score) = self
            .inference
            .classify(&msg.body)
            .await
            .map_err(|e| StageError::new(Stage::Classify, e))?;
        debug!(id = %msg.id, category = %category, score, "Classified");

        let summary = self.inference.summarize(&msg.body).await;
        let suggested_reply = draft_reply(category.as_str(), &msg.sender, &msg.body);
        let verdict = self.scanner.scan(&msg.subject, &msg.body, &msg.sender);
        let is_newsletter = self
            .newsletter
            .is_newsletter(&msg.sender, &msg.subject, &msg.body);

        Ok(EnrichedRecord {
            id: msg.id.clone(),
            sender: msg.sender.clone(),
            subject: msg.subject.clone(),
            body: msg.body.clone(),
            timestamp: msg.timestamp,
            category,
            summary,
            suggested_reply,
            is_phishing: !verdict.is_safe,
            security_reason: verdict.reason,
            is_newsletter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::error::{ConnectorError, InferenceError};
    use crate::inference::{Classification, Classifier, SUMMARY_TOO_SHORT, Summarizer};
    use crate::pipeline::types::Category;
    use crate::store::LibSqlRecordStore;

    /// Classifies by keyword; fails on bodies containing "explode".
    struct KeywordClassifier;

    #[async_trait]
    impl Classifier for KeywordClassifier {
        fn name(&self) -> &str {
            "keyword"
        }
        async fn classify(
            &self,
            text: &str,
            _labels: &[&str],
        ) -> std::result::Result<Classification, InferenceError> {
            if text.contains("explode") {
                return Err(InferenceError::RequestFailed {
                    backend: "keyword".into(),
                    reason: "backend crashed".into(),
                });
            }
            let label = if text.contains("fee") {
                "Finance & Fees"
            } else {
                "General Announcements"
            };
            Ok(Classification {
                label: label.into(),
                score: 0.9,
            })
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        fn name(&self) -> &str {
            "echo"
        }
        async fn summarize(
            &self,
            text: &str,
            _max_len: usize,
            _min_len: usize,
        ) -> std::result::Result<String, InferenceError> {
            Ok(text.chars().take(20).collect())
        }
    }

    /// Records label calls; optionally errors on every call.
    #[derive(Default)]
    struct RecordingSession {
        labels: Mutex<Vec<(String, String)>>,
        fail_labels: bool,
    }

    #[async_trait]
    impl MailSession for RecordingSession {
        async fn fetch_messages(
            &self,
            _filter: &FetchFilter,
        ) -> std::result::Result<Vec<RawMessage>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn apply_label(
            &self,
            id: &str,
            label: &str,
        ) -> std::result::Result<bool, ConnectorError> {
            self.labels
                .lock()
                .unwrap()
                .push((id.to_string(), label.to_string()));
            if self.fail_labels {
                return Err(ConnectorError::LabelFailed {
                    id: id.into(),
                    label: label.into(),
                    reason: "quota".into(),
                });
            }
            Ok(true)
        }
    }

    async fn orchestrator() -> Orchestrator {
        let config = PipelineConfig::default();
        let store = Arc::new(LibSqlRecordStore::new_memory().await.unwrap());
        let inference = Inference::new(
            Arc::new(KeywordClassifier),
            Arc::new(EchoSummarizer),
            &config,
        );
        Orchestrator::new(store, inference, &RuleSet::default(), &config).unwrap()
    }

    fn msg(id: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.into(),
            sender: "Registrar <registrar@uni.edu>".into(),
            subject: format!("Subject {id}"),
            body: body.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn enriches_and_persists() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();
        let body = "The semester fee is due Friday. Please unsubscribe if unwanted.";

        let report = orch
            .process_batch(&session, &[msg("1", body)], |_| {})
            .await
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.newly_saved, 1);

        let records = orch.store().list_all().await.unwrap();
        let r = &records[0];
        assert_eq!(r.category, Category::FinanceFees);
        assert_eq!(r.summary, "The semester fee is ");
        assert!(r.suggested_reply.starts_with("Hi Registrar,"));
        assert!(!r.is_phishing);
        assert_eq!(r.security_reason, "Safe");
        assert!(r.is_newsletter);

        let labels = session.labels.lock().unwrap();
        assert_eq!(labels.as_slice(), &[("1".to_string(), "Finance & Fees".to_string())]);
    }

    #[tokio::test]
    async fn short_body_skipped_without_label_or_record() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();

        let report = orch
            .process_batch(&session, &[msg("1", "  hi!  ")], |_| {})
            .await
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.skipped_unreadable, 1);
        assert_eq!(report.newly_saved, 0);
        assert!(session.labels.lock().unwrap().is_empty());
        assert_eq!(orch.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn medium_body_gets_short_summary_placeholder() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();
        let body = "Club meeting moved to 5pm today";
        assert_eq!(body.len(), 31);

        orch.process_batch(&session, &[msg("1", body)], |_| {})
            .await
            .unwrap();
        let records = orch.store().list_all().await.unwrap();
        assert_eq!(records[0].summary, SUMMARY_TOO_SHORT);
    }

    #[tokio::test]
    async fn stage_failure_isolated_to_message() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();
        let batch = [
            msg("bad", "This message will explode the classifier."),
            msg("good", "Reminder: hostel fee payment closes soon."),
        ];

        let mut statuses = Vec::new();
        let report = orch
            .process_batch(&session, &batch, |p| statuses.push((p.index, p.total, p.status)))
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.newly_saved, 1);
        assert_eq!(
            statuses,
            vec![
                (1, 2, ProgressStatus::Failed(Stage::Classify)),
                (2, 2, ProgressStatus::Saved),
            ]
        );
        let ids = orch.store().stored_ids().await.unwrap();
        assert!(ids.contains("good") && !ids.contains("bad"));
    }

    #[tokio::test]
    async fn label_failure_still_persists() {
        let orch = orchestrator().await;
        let session = RecordingSession {
            fail_labels: true,
            ..Default::default()
        };

        let report = orch
            .process_batch(&session, &[msg("1", "General notice for all students.")], |_| {})
            .await
            .unwrap();
        assert_eq!(report.label_failures, 1);
        assert_eq!(report.newly_saved, 1);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();
        let batch = [
            msg("1", "General notice for all students."),
            msg("2", "Library fee waiver applications are open."),
        ];

        let first = orch.process_batch(&session, &batch, |_| {}).await.unwrap();
        assert_eq!(first.newly_saved, 2);
        let before = orch.store().list_all().await.unwrap();

        let second = orch.process_batch(&session, &batch, |_| {}).await.unwrap();
        assert_eq!(second.newly_saved, 0);
        assert_eq!(second.attempted, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(orch.store().list_all().await.unwrap(), before);
        // No label calls for already-stored messages.
        assert_eq!(session.labels.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_ids_within_one_batch_processed_once() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();
        let batch = [
            msg("dup", "General notice for all students."),
            msg("dup", "General notice for all students."),
        ];

        let report = orch.process_batch(&session, &batch, |_| {}).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.newly_saved, 1);
    }

    #[tokio::test]
    async fn phishing_message_flagged() {
        let orch = orchestrator().await;
        let session = RecordingSession::default();
        let mut m = msg("p", "Click here to unlock your account right now");
        m.subject = "URGENT: Verify Password".into();

        orch.process_batch(&session, &[m], |_| {}).await.unwrap();
        let r = &orch.store().list_all().await.unwrap()[0];
        assert!(r.is_phishing);
        assert!(r.security_reason.starts_with("Detected suspicious keyword: '"));
    }

    struct DownSummarizer;

    #[async_trait]
    impl Summarizer for DownSummarizer {
        fn name(&self) -> &str {
            "down"
        }
        async fn summarize(
            &self,
            _text: &str,
            _max_len: usize,
            _min_len: usize,
        ) -> std::result::Result<String, InferenceError> {
            Err(InferenceError::InvalidResponse {
                backend: "down".into(),
                reason: "blank summary_text".into(),
            })
        }
    }

    #[tokio::test]
    async fn summarizer_failure_still_saves_message() {
        let config = PipelineConfig::default();
        let store = Arc::new(LibSqlRecordStore::new_memory().await.unwrap());
        let inference = Inference::new(Arc::new(KeywordClassifier), Arc::new(DownSummarizer), &config);
        let orch = Orchestrator::new(store, inference, &RuleSet::default(), &config).unwrap();
        let session = RecordingSession::default();
        let batch = [msg(
            "s",
            "The library will stay open until midnight for the whole exam period.",
        )];

        let mut statuses = Vec::new();
        orch.process_batch(&session, &batch, |p| statuses.push(p.status))
            .await
            .unwrap();

        assert_eq!(statuses, vec![ProgressStatus::Saved]);
        let r = &orch.store().list_all().await.unwrap()[0];
        assert_eq!(r.summary, crate::inference::SUMMARY_FAILED);
    }
}
