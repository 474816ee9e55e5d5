//! Agency Harvester: a crawl-and-deduplicate engine for public agency documents
//!
//! This crate discovers candidate document locations on government-agency websites
//! (paginated listings, XML sitemaps, syndication feeds, recursive link-following),
//! extracts normalized metadata, downloads artifacts, and guarantees that no document
//! is downloaded or recorded more than once across runs.

pub mod config;
pub mod crawler;
pub mod download;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod output;
pub mod record;
pub mod storage;
pub mod traverse;
pub mod url;

use thiserror::Error;

/// Main error type for harvest operations
///
/// Only configuration and storage failures are fatal for a run. Per-URL problems are
/// logged and recorded by the crawler and never surface as a `HarvestError`.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Artifact storage failed: {0}")]
    Download(#[from] download::DownloadError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Strategy task failed: {0}")]
    Task(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("No seeds configured for authority '{0}'")]
    EmptySeeds(String),

    #[error("Authority '{0}' has listing or feed sources but no source rules")]
    MissingRules(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Harvester, RunSummary};
pub use ledger::DedupLedger;
pub use record::{DocumentRecord, DownloadedArtifact};
pub use url::{extract_domain, normalize_url};
