//! Mail Organizer: email enrichment and dedup pipeline.

pub mod api;
pub mod config;
pub mod connector;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod reply;
pub mod rules;
pub mod store;
