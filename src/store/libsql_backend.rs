//! libSQL backend for `RecordStore`.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! RFC 3339; rows written by older releases may hold other formats or NULLs,
//! which are read back with fixed defaults.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::{Category, EnrichedRecord};
use crate::store::migrations;
use crate::store::traits::RecordStore;

/// Summary shown for rows stored without one.
pub const DEFAULT_SUMMARY: &str = "No summary available";

const SELECT_COLUMNS: &str = "id, sender, subject, body, category, timestamp, summary, \
     suggested_reply, is_phishing, security_reason, is_newsletter";

/// libSQL record store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlRecordStore {
    _db: libsql::Database,
    conn: Connection,
}

impl LibSqlRecordStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn from_database(db: libsql::Database) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self { _db: db, conn })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse a stored timestamp. Accepts RFC 3339 (our write format), SQLite
/// `datetime()` output, RFC 2822 and epoch milliseconds. Anything else,
/// including empty strings, maps to the Unix epoch.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.with_timezone(&Utc);
    }
    if let Some(dt) = s
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    {
        return dt;
    }
    DateTime::<Utc>::UNIX_EPOCH
}

/// Read a nullable text column; NULL and empty both become `None`.
fn opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok().filter(|s| !s.is_empty())
}

fn row_to_record(row: &libsql::Row) -> Result<EnrichedRecord, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("emails.id: {e}")))?;

    let category_str = opt_text(row, 4).unwrap_or_default();
    let category = Category::from_label(&category_str).unwrap_or_else(|| {
        warn!(id = %id, category = %category_str, "Unknown stored category");
        Category::NoReadableText
    });

    Ok(EnrichedRecord {
        sender: opt_text(row, 1).unwrap_or_default(),
        subject: opt_text(row, 2).unwrap_or_default(),
        body: opt_text(row, 3).unwrap_or_default(),
        category,
        timestamp: parse_timestamp(&opt_text(row, 5).unwrap_or_default()),
        summary: opt_text(row, 6).unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        suggested_reply: opt_text(row, 7).unwrap_or_default(),
        is_phishing: row.get::<i64>(8).unwrap_or(0) != 0,
        security_reason: opt_text(row, 9).unwrap_or_default(),
        is_newsletter: row.get::<i64>(10).unwrap_or(0) != 0,
        id,
    })
}

// ── RecordStore ─────────────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_if_absent(&self, record: &EnrichedRecord) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "INSERT INTO emails (id, sender, subject, body, category, timestamp, summary,
                    suggested_reply, is_phishing, security_reason, is_newsletter)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    record.id.as_str(),
                    record.sender.as_str(),
                    record.subject.as_str(),
                    record.body.as_str(),
                    record.category.as_str(),
                    record.timestamp.to_rfc3339(),
                    record.summary.as_str(),
                    record.suggested_reply.as_str(),
                    i64::from(record.is_phishing),
                    record.security_reason.as_str(),
                    i64::from(record.is_newsletter),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_if_absent: {e}")))?;

        let inserted = affected == 1;
        debug!(id = %record.id, inserted, "Record insert");
        Ok(inserted)
    }

    async fn list_all(&self) -> Result<Vec<EnrichedRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM emails ORDER BY timestamp DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_all: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_all: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        // Legacy rows may hold non-RFC 3339 timestamps, so the SQL order is
        // only approximate.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn stored_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT id FROM emails", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("stored_ids: {e}")))?;

        let mut ids = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("stored_ids: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("emails.id: {e}")))?;
            ids.insert(id);
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM emails", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0).max(0) as usize),
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_db() -> LibSqlRecordStore {
        LibSqlRecordStore::new_memory().await.unwrap()
    }

    fn make_record(id: &str, minute: u32) -> EnrichedRecord {
        EnrichedRecord {
            id: id.to_string(),
            sender: "Registrar <registrar@uni.edu>".into(),
            subject: format!("Notice {id}"),
            body: "Fee payment window closes Friday.".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 9, minute, 0).unwrap(),
            category: Category::FinanceFees,
            summary: "Fees due Friday.".into(),
            suggested_reply: "Hi Registrar,\n\nNoted.".into(),
            is_phishing: false,
            security_reason: "Safe".into(),
            is_newsletter: true,
        }
    }

    #[tokio::test]
    async fn insert_then_list() {
        let db = test_db().await;
        let record = make_record("1:10", 0);
        assert!(db.insert_if_absent(&record).await.unwrap());

        let all = db.list_all().await.unwrap();
        assert_eq!(all, vec![record]);
    }

    #[tokio::test]
    async fn second_insert_is_rejected_and_does_not_overwrite() {
        let db = test_db().await;
        let first = make_record("1:10", 0);
        assert!(db.insert_if_absent(&first).await.unwrap());

        let mut second = first.clone();
        second.summary = "Different".into();
        second.category = Category::SpamPromotions;
        assert!(!db.insert_if_absent(&second).await.unwrap());

        let all = db.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].summary, "Fees due Friday.");
        assert_eq!(all[0].category, Category::FinanceFees);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let db = test_db().await;
        db.insert_if_absent(&make_record("a", 5)).await.unwrap();
        db.insert_if_absent(&make_record("b", 30)).await.unwrap();
        db.insert_if_absent(&make_record("c", 15)).await.unwrap();

        let ids: Vec<String> = db.list_all().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn stored_ids_and_count() {
        let db = test_db().await;
        assert!(db.stored_ids().await.unwrap().is_empty());
        assert_eq!(db.count().await.unwrap(), 0);

        db.insert_if_absent(&make_record("x", 0)).await.unwrap();
        db.insert_if_absent(&make_record("y", 1)).await.unwrap();

        let ids = db.stored_ids().await.unwrap();
        assert!(ids.contains("x") && ids.contains("y"));
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn legacy_row_reads_with_defaults() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO emails (id, sender, subject, body, category, timestamp)
                 VALUES ('old', 'a@x.com', 'Hi', 'Body', 'Club Activities', '2025-11-02 08:00:00')",
                (),
            )
            .await
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO emails (id, category, summary, is_phishing, is_newsletter)
                 VALUES ('odd', 'Gossip', '', NULL, NULL)",
                (),
            )
            .await
            .unwrap();

        let all = db.list_all().await.unwrap();
        let old = all.iter().find(|r| r.id == "old").unwrap();
        assert_eq!(old.summary, DEFAULT_SUMMARY);
        assert_eq!(old.suggested_reply, "");
        assert_eq!(old.security_reason, "");
        assert!(!old.is_phishing && !old.is_newsletter);
        assert_eq!(old.category, Category::ClubActivities);
        assert_eq!(old.timestamp.to_rfc3339(), "2025-11-02T08:00:00+00:00");

        let odd = all.iter().find(|r| r.id == "odd").unwrap();
        assert_eq!(odd.category, Category::NoReadableText);
        assert_eq!(odd.summary, DEFAULT_SUMMARY);
        assert_eq!(odd.timestamp, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(odd.sender, "");
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(
            parse_timestamp("2026-03-10T09:30:00+02:00").to_rfc3339(),
            "2026-03-10T07:30:00+00:00"
        );
        assert_eq!(
            parse_timestamp("Tue, 10 Mar 2026 09:30:00 +0000").to_rfc3339(),
            "2026-03-10T09:30:00+00:00"
        );
        assert_eq!(
            parse_timestamp("1773135000000").to_rfc3339(),
            "2026-03-10T09:30:00+00:00"
        );
        assert_eq!(parse_timestamp(""), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emails.db");

        {
            let db = LibSqlRecordStore::new_local(&path).await.unwrap();
            db.insert_if_absent(&make_record("keep", 0)).await.unwrap();
        }

        let db = LibSqlRecordStore::new_local(&path).await.unwrap();
        assert_eq!(db.count().await.unwrap(), 1);
        assert!(!db.insert_if_absent(&make_record("keep", 0)).await.unwrap());
    }
}
