//! Persistence layer: libSQL-backed storage for enriched records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlRecordStore;
pub use traits::RecordStore;
