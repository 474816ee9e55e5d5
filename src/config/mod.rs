//! Configuration module for Agency Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use agency_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Authorities: {}", config.authorities.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthorityConfig, Config, CrawlerConfig, HeadMetaRules, LinkCrawlConfig, ListingConfig,
    OutputConfig, PaginationConfig, RetryConfig, SelectorRules, SourceRules, UserAgentConfig,
};

pub(crate) use types::default_document_types;

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
