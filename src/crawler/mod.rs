//! Crawler module: runs the harvest
//!
//! This module contains the core run logic, including:
//! - Per-domain politeness limits
//! - The fetch facade shared by traversals and downloads
//! - The candidate pipeline from ledger reservation to committed record
//! - Overall run coordination and the run summary

mod coordinator;
mod fetcher;
mod pipeline;
mod politeness;
mod run_log;

pub use coordinator::Harvester;
pub use fetcher::Fetcher;
pub use pipeline::{AuthorityContext, Outcome, Pipeline};
pub use politeness::{DomainLimiter, DomainPermit};
pub use run_log::{RunLog, RunSummary};
