//! Error types for the mail organizer.

use crate::pipeline::types::Stage;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail connector error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse rule set: {0}")]
    RuleSet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mail connector errors. Any of these aborts the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("Protocol error during {command}: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Failed to apply label {label} to message {id}: {reason}")]
    LabelFailed {
        id: String,
        label: String,
        reason: String,
    },

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inference backend errors.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Backend {backend} request failed: {reason}")]
    RequestFailed { backend: String, reason: String },

    #[error("Invalid response from {backend}: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("Classifier returned a label outside the category set: {0}")]
    UnknownLabel(String),

    #[error("Authentication failed for backend {backend}")]
    AuthFailed { backend: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failed stage for a single message. The batch skips the message and
/// moves on; the message stays absent from the store and is retried on the
/// next run.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: InferenceError,
}

impl StageError {
    pub fn new(stage: Stage, source: InferenceError) -> Self {
        Self { stage, source }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
