//! `RecordStore`: async interface over persisted enriched records.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::EnrichedRecord;

/// Durable keyed storage of enriched records.
///
/// The id column is the uniqueness authority: `insert_if_absent` must
/// decide "already present" atomically at the storage layer, so concurrent
/// writers never produce duplicates and a second insert never overwrites
/// the first.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert `record` unless a record with the same id exists.
    /// Returns `true` iff a new row was written.
    async fn insert_if_absent(&self, record: &EnrichedRecord) -> Result<bool, DatabaseError>;

    /// Every stored record, newest first.
    async fn list_all(&self) -> Result<Vec<EnrichedRecord>, DatabaseError>;

    /// Ids of every stored record.
    async fn stored_ids(&self) -> Result<HashSet<String>, DatabaseError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, DatabaseError>;
}
