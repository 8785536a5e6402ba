//! Configuration types, loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::connector::EmailConfig;
use crate::error::ConfigError;
use crate::inference::InferenceConfig;

/// Thresholds and generation limits for the enrichment stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bodies shorter than this (after trimming) are skipped entirely.
    pub min_body_chars: usize,
    /// Text shorter than this maps to "No Readable Text" without a backend call.
    pub min_classify_chars: usize,
    /// Text shorter than this gets the "too short" summary placeholder.
    pub min_summarize_chars: usize,
    /// Summarizer input is cut to this many characters.
    pub summarize_input_chars: usize,
    pub summary_max_len: usize,
    pub summary_min_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_body_chars: 10,
            min_classify_chars: 10,
            min_summarize_chars: 50,
            summarize_input_chars: 1024,
            summary_max_len: 60,
            summary_min_len: 15,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` when `EMAIL_IMAP_HOST` is unset; batch runs are then unavailable.
    pub email: Option<EmailConfig>,
    pub inference: InferenceConfig,
    pub pipeline: PipelineConfig,
    pub db_path: PathBuf,
    pub rules_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = InferenceConfig::default();
        let inference = InferenceConfig {
            api_base: env_or("HF_API_BASE", defaults.api_base),
            api_token: std::env::var("HF_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            classifier_model: env_or("CLASSIFIER_MODEL", defaults.classifier_model),
            summarizer_model: env_or("SUMMARIZER_MODEL", defaults.summarizer_model),
            timeout: Duration::from_secs(env_parse("INFERENCE_TIMEOUT_SECS", 60u64)?),
        };

        Ok(Self {
            email: EmailConfig::from_env(),
            inference,
            pipeline: PipelineConfig::default(),
            db_path: std::env::var("MAIL_ORGANIZER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/emails.db")),
            rules_path: std::env::var("MAIL_ORGANIZER_RULES_PATH").ok().map(PathBuf::from),
            log_dir: std::env::var("MAIL_ORGANIZER_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

/// Parse `key` if set; an unparseable value is an error rather than a
/// silent fallback.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
