//! Keyword rule engines. Deterministic text classifiers, no inference.
//!
//! - `SecurityScanner` flags phishing phrasing in subject/body
//! - `NewsletterDetector` flags bulk mail by footer phrases or sender patterns
//!
//! Phrase lists live in a versioned `RuleSet` so they can be loaded from a
//! JSON file and extended without touching engine logic.

pub mod newsletter;
pub mod security;

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use newsletter::NewsletterDetector;
pub use security::{SecurityScanner, SecurityVerdict};

/// Current version of the built-in rule set.
pub const DEFAULT_RULESET_VERSION: u32 = 1;

/// Versioned phrase lists for both rule engines.
///
/// List order matters for the phishing phrases: the first match is the one
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    pub phishing_phrases: Vec<String>,
    pub newsletter_phrases: Vec<String>,
    pub newsletter_senders: Vec<String>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            version: DEFAULT_RULESET_VERSION,
            phishing_phrases: to_strings(&[
                "verify your account",
                "verify password",
                "urgent action required",
                "account suspended",
                "click here to unlock",
                "unauthorized access",
                "lottery winner",
                "congratulations you won",
                "bank account locked",
                "update your details",
                // Matches the misspelling used in scam mails.
                "immedate response",
            ]),
            newsletter_phrases: to_strings(&[
                "unsubscribe",
                "view in browser",
                "update your preferences",
                "privacy policy",
                "terms of use",
                "opt out",
                "newsletter",
                "weekly digest",
                "daily digest",
            ]),
            newsletter_senders: to_strings(&["newsletter", "noreply", "digest"]),
        }
    }
}

impl RuleSet {
    /// Parse a rule set from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let rules: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::RuleSet(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Load a rule set from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let rules = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            version = rules.version,
            "Loaded rule set"
        );
        Ok(rules)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = self
            .phishing_phrases
            .iter()
            .chain(&self.newsletter_phrases)
            .chain(&self.newsletter_senders);
        for phrase in all {
            if phrase.trim().is_empty() {
                return Err(ConfigError::RuleSet(format!(
                    "rule set v{} contains an empty phrase",
                    self.version
                )));
            }
        }
        Ok(())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A literal phrase matched case-insensitively anywhere in a field.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    /// The phrase as configured, lower-cased.
    pub phrase: String,
    regex: Regex,
}

impl KeywordRule {
    pub fn new(phrase: &str) -> Result<Self, ConfigError> {
        let phrase = phrase.to_lowercase();
        let regex = Regex::new(&format!("(?i){}", regex::escape(&phrase)))
            .map_err(|e| ConfigError::RuleSet(format!("bad phrase {phrase:?}: {e}")))?;
        Ok(Self { phrase, regex })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Compile a phrase list, preserving order.
pub(crate) fn compile(phrases: &[String]) -> Result<Vec<KeywordRule>, ConfigError> {
    phrases.iter().map(|p| KeywordRule::new(p)).collect()
}
