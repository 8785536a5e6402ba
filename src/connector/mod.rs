//! Mail connector: authenticated access to a mailbox.
//!
//! A `MailConnector` opens a `MailSession`; the session lists candidate
//! messages and applies category labels. Any session error other than a
//! label failure aborts the batch.

pub mod imap;

use async_trait::async_trait;

use crate::error::ConnectorError;
use crate::pipeline::types::{FetchFilter, RawMessage};

pub use imap::{EmailConfig, ImapConnector};

/// Opens authenticated sessions against a mail provider.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Authenticate and return a live session.
    async fn authenticate(&self) -> Result<Box<dyn MailSession>, ConnectorError>;
}

/// An authenticated mailbox session.
#[async_trait]
pub trait MailSession: Send + Sync {
    /// List candidate messages matching `filter`, newest first, with bodies
    /// already decoded to plain text.
    async fn fetch_messages(&self, filter: &FetchFilter) -> Result<Vec<RawMessage>, ConnectorError>;

    /// Attach `label` to message `id`, creating the label if the mailbox
    /// has none with that name (case-insensitive). Returns `Ok(false)` when
    /// the provider declined without a transport error.
    async fn apply_label(&self, id: &str, label: &str) -> Result<bool, ConnectorError>;

    /// End the session.
    async fn close(&self) {}
}
