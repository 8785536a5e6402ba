//! Read-side aggregates and filters over stored records.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::pipeline::types::{Category, EnrichedRecord};

/// Count of records in one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Dashboard aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxStats {
    pub total: usize,
    /// Distinct categories present.
    pub categories_used: usize,
    /// Most frequent category; ties go to the earlier label.
    pub top_category: Option<Category>,
    /// One entry per classifier label, in label order, zeros included.
    pub per_category: Vec<CategoryCount>,
    pub phishing: usize,
    pub newsletters: usize,
}

impl InboxStats {
    pub fn from_records(records: &[EnrichedRecord]) -> Self {
        let mut counts: HashMap<Category, usize> = HashMap::new();
        for r in records {
            *counts.entry(r.category).or_default() += 1;
        }

        let mut top: Option<(Category, usize)> = None;
        for category in Category::ALL
            .iter()
            .chain(std::iter::once(&Category::NoReadableText))
        {
            let n = counts.get(category).copied().unwrap_or(0);
            if n > 0 && top.is_none_or(|(_, best)| n > best) {
                top = Some((*category, n));
            }
        }

        Self {
            total: records.len(),
            categories_used: counts.len(),
            top_category: top.map(|(c, _)| c),
            per_category: Category::ALL
                .iter()
                .map(|c| CategoryCount {
                    category: *c,
                    count: counts.get(c).copied().unwrap_or(0),
                })
                .collect(),
            phishing: records.iter().filter(|r| r.is_phishing).count(),
            newsletters: records.iter().filter(|r| r.is_newsletter).count(),
        }
    }
}

/// Records in `category` (any when `None`) dated on or after `since`
/// (any when `None`). Input order is preserved.
pub fn filter_records(
    records: &[EnrichedRecord],
    category: Option<Category>,
    since: Option<NaiveDate>,
) -> Vec<&EnrichedRecord> {
    records
        .iter()
        .filter(|r| category.is_none_or(|c| r.category == c))
        .filter(|r| since.is_none_or(|d| r.timestamp.date_naive() >= d))
        .collect()
}
