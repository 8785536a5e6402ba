//! Phishing scan over subject and body.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{KeywordRule, RuleSet, compile};
use crate::error::ConfigError;

/// Result of a security scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub is_safe: bool,
    /// `"Safe"` or the phrase that triggered the verdict.
    pub reason: String,
}

impl SecurityVerdict {
    fn safe() -> Self {
        Self {
            is_safe: true,
            reason: "Safe".to_string(),
        }
    }
}

/// Ordered phishing-phrase scanner. Stateless once built.
#[derive(Debug, Clone)]
pub struct SecurityScanner {
    phrases: Vec<KeywordRule>,
}

impl SecurityScanner {
    pub fn new(rules: &RuleSet) -> Result<Self, ConfigError> {
        Ok(Self {
            phrases: compile(&rules.phishing_phrases)?,
        })
    }

    /// Scan a message. The first configured phrase found in the body or the
    /// subject wins.
    ///
    /// The sender is not scored: generic `admin`/`no-reply` senders are too
    /// common in legitimate mail.
    pub fn scan(&self, subject: &str, body: &str, _sender: &str) -> SecurityVerdict {
        for rule in &self.phrases {
            if rule.matches(body) || rule.matches(subject) {
                debug!(phrase = %rule.phrase, "Phishing phrase matched");
                return SecurityVerdict {
                    is_safe: false,
                    reason: format!("Detected suspicious keyword: '{}'", rule.phrase),
                };
            }
        }
        SecurityVerdict::safe()
    }
}
