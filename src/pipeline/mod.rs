//! Enrichment pipeline.
//!
//! Every batch flows through:
//! 1. `MailSession::fetch_messages()` (connector I/O)
//! 2. The dedup gate against stored ids
//! 3. `Orchestrator` stages: classify, summarize, draft reply, security
//!    scan, newsletter check
//! 4. Best-effort label application, then `RecordStore::insert_if_absent()`

pub mod orchestrator;
pub mod stats;
pub mod types;

pub use orchestrator::Orchestrator;
pub use stats::{InboxStats, filter_records};
pub use types::{
    BatchProgress, BatchReport, Category, EnrichedRecord, FetchFilter, FetchWindow,
    ProgressStatus, RawMessage, Stage,
};
