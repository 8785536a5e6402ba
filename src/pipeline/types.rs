//! Shared types for the enrichment pipeline.

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Category ────────────────────────────────────────────────────────

/// Topic category assigned to every stored record.
///
/// The first eleven variants are the classifier's candidate labels.
/// `NoReadableText` is the sentinel for text too short to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Category {
    ClassesLectures,
    ExamsAcademics,
    AssignmentsDeadlines,
    PlacementsInternships,
    ClubActivities,
    EventsWorkshops,
    CompetitionsHackathons,
    AdministrativeNotices,
    FinanceFees,
    GeneralAnnouncements,
    SpamPromotions,
    NoReadableText,
}

impl Category {
    /// Candidate labels handed to the zero-shot classifier, in order.
    pub const ALL: [Category; 11] = [
        Category::ClassesLectures,
        Category::ExamsAcademics,
        Category::AssignmentsDeadlines,
        Category::PlacementsInternships,
        Category::ClubActivities,
        Category::EventsWorkshops,
        Category::CompetitionsHackathons,
        Category::AdministrativeNotices,
        Category::FinanceFees,
        Category::GeneralAnnouncements,
        Category::SpamPromotions,
    ];

    /// Display label, also used as the mailbox label name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassesLectures => "Classes & Lectures",
            Self::ExamsAcademics => "Exams & Academics",
            Self::AssignmentsDeadlines => "Assignments & Deadlines",
            Self::PlacementsInternships => "Placements & Internships",
            Self::ClubActivities => "Club Activities",
            Self::EventsWorkshops => "Events & Workshops",
            Self::CompetitionsHackathons => "Competitions & Hackathons",
            Self::AdministrativeNotices => "Administrative Notices",
            Self::FinanceFees => "Finance & Fees",
            Self::GeneralAnnouncements => "General Announcements",
            Self::SpamPromotions => "Spam / Promotions",
            Self::NoReadableText => "No Readable Text",
        }
    }

    /// Exact-match lookup of a label string.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .chain(std::iter::once(&Self::NoReadableText))
            .find(|c| c.as_str() == label)
            .copied()
    }

    /// Labels of the classifier candidates, in order.
    pub fn candidate_labels() -> Vec<&'static str> {
        Self::ALL.iter().map(Category::as_str).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_label(&s).ok_or_else(|| format!("unknown category: {s}"))
    }
}

// ── Stage ───────────────────────────────────────────────────────────

/// A per-message step that can fail the message. Summarization recovers
/// with a placeholder and the rule stages are pure, so only classification
/// appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Messages and records ────────────────────────────────────────────

/// A message as returned by the mail connector. Never mutated after fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Provider-unique id.
    pub id: String,
    pub sender: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// A fully enriched, persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub summary: String,
    pub suggested_reply: String,
    pub is_phishing: bool,
    pub security_reason: String,
    pub is_newsletter: bool,
}

// ── Fetch filter ────────────────────────────────────────────────────

/// How far back a batch fetch reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchWindow {
    #[default]
    Today,
    OneDayAgo,
    TwoDaysAgo,
    SevenDaysAgo,
    All,
}

impl FetchWindow {
    /// Earliest date included by this window, or `None` for everything.
    pub fn since(&self, today: NaiveDate) -> Option<NaiveDate> {
        let days = match self {
            Self::Today => 0,
            Self::OneDayAgo => 1,
            Self::TwoDaysAgo => 2,
            Self::SevenDaysAgo => 7,
            Self::All => return None,
        };
        today.checked_sub_days(Days::new(days))
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Some(Self::Today),
            "1d" | "one_day_ago" => Some(Self::OneDayAgo),
            "2d" | "two_days_ago" => Some(Self::TwoDaysAgo),
            "7d" | "seven_days_ago" => Some(Self::SevenDaysAgo),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Connector-side filter for a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFilter {
    pub max_results: usize,
    pub since: Option<NaiveDate>,
    pub unread_only: bool,
}

impl Default for FetchFilter {
    fn default() -> Self {
        Self {
            max_results: 50,
            since: None,
            unread_only: false,
        }
    }
}

impl FetchFilter {
    pub fn for_window(window: FetchWindow, today: NaiveDate) -> Self {
        Self {
            since: window.since(today),
            ..Self::default()
        }
    }
}

// ── Batch reporting ─────────────────────────────────────────────────

/// Outcome counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Candidates that passed the dedup gate.
    pub attempted: usize,
    /// Records newly inserted by this run.
    pub newly_saved: usize,
    /// Candidates dropped by the dedup gate.
    pub skipped_existing: usize,
    /// Candidates skipped for an empty or too-short body.
    pub skipped_unreadable: usize,
    /// Messages aborted by a stage failure.
    pub failed: usize,
    /// Best-effort label applications that did not succeed.
    pub label_failures: usize,
}

/// What happened to the message at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Saved,
    AlreadyStored,
    SkippedUnreadable,
    Failed(Stage),
}

/// Per-message progress, reported after each message for UI feedback.
#[derive(Debug, Clone)]
pub struct BatchProgress<'a> {
    /// 1-based position within the deduplicated batch.
    pub index: usize,
    pub total: usize,
    pub subject: &'a str,
    pub status: ProgressStatus,
}
