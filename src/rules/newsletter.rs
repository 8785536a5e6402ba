//! Newsletter / bulk-mail detection.

use super::{KeywordRule, RuleSet, compile};
use crate::error::ConfigError;

/// Flags bulk mail by body footer phrases or sender patterns.
#[derive(Debug, Clone)]
pub struct NewsletterDetector {
    body_phrases: Vec<KeywordRule>,
    sender_patterns: Vec<KeywordRule>,
}

impl NewsletterDetector {
    pub fn new(rules: &RuleSet) -> Result<Self, ConfigError> {
        Ok(Self {
            body_phrases: compile(&rules.newsletter_phrases)?,
            sender_patterns: compile(&rules.newsletter_senders)?,
        })
    }

    /// True if the body contains any newsletter phrase or the sender
    /// contains any newsletter pattern. The subject is not consulted.
    pub fn is_newsletter(&self, sender: &str, _subject: &str, body: &str) -> bool {
        self.body_phrases.iter().any(|r| r.matches(body))
            || self.sender_patterns.iter().any(|r| r.matches(sender))
    }
}
