use crate::config::types::{
    AuthorityConfig, Config, CrawlerConfig, ListingConfig, OutputConfig, PaginationConfig,
    RetryConfig, SourceRules, UserAgentConfig,
};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;

    if config.authorities.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[authority]] must be configured".to_string(),
        ));
    }

    let mut names = std::collections::HashSet::new();
    for authority in &config.authorities {
        if !names.insert(authority.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate authority name '{}'",
                authority.name
            )));
        }
        validate_authority(authority)?;
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_per_domain < 1 || config.max_concurrent_per_domain > 16 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_per_domain must be between 1 and 16, got {}",
            config.max_concurrent_per_domain
        )));
    }

    if config.render_sessions < 1 || config.render_sessions > 8 {
        return Err(ConfigError::Validation(format!(
            "render_sessions must be between 1 and 8, got {}",
            config.render_sessions
        )));
    }

    if config.max_listing_pages < 1 {
        return Err(ConfigError::Validation(
            "max_listing_pages must be >= 1".to_string(),
        ));
    }

    if config.max_idle_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_idle_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay < config.base_delay {
        return Err(ConfigError::Validation(format!(
            "retry max_delay ({}ms) must not be below base_delay ({}ms)",
            config.max_delay, config.base_delay
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("database_path", &config.database_path),
        ("download_dir", &config.download_dir),
        ("export_path", &config.export_path),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
        }
    }

    Ok(())
}

fn validate_authority(authority: &AuthorityConfig) -> Result<(), ConfigError> {
    if authority.name.is_empty()
        || !authority
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "authority name '{}' must be non-empty and contain only alphanumerics, '-' or '_'",
            authority.name
        )));
    }

    validate_domain_pattern(&authority.domain)?;

    if authority.seed_count() == 0 {
        return Err(ConfigError::EmptySeeds(authority.name.clone()));
    }

    if (!authority.listing.is_empty() || !authority.feeds.is_empty()) && authority.rules.is_none()
    {
        return Err(ConfigError::MissingRules(authority.name.clone()));
    }

    if authority.document_types.is_empty() {
        return Err(ConfigError::Validation(format!(
            "authority '{}' must accept at least one document type",
            authority.name
        )));
    }

    for seed in authority.sitemaps.iter().chain(authority.feeds.iter()) {
        validate_seed_url(seed)?;
    }

    for listing in &authority.listing {
        validate_listing(listing)?;
    }

    if let Some(crawl) = &authority.crawl {
        for seed in &crawl.seeds {
            validate_seed_url(seed)?;
        }
        if let Some(pattern) = &crawl.exclude {
            validate_regex(pattern)?;
        }
    }

    match &authority.rules {
        Some(SourceRules::Selectors(rules)) => {
            validate_selector(&rules.title)?;
            for selector in &rules.description {
                validate_selector(selector)?;
            }
            if let Some(date) = &rules.date {
                validate_selector(date)?;
            }
        }
        Some(SourceRules::HeadMeta(_)) | None => {}
    }

    Ok(())
}

fn validate_listing(listing: &ListingConfig) -> Result<(), ConfigError> {
    validate_seed_url(&listing.url)?;
    validate_selector(&listing.entry)?;
    validate_selector(&listing.link)?;
    if let Some(date) = &listing.date {
        validate_selector(date)?;
    }

    match &listing.pagination {
        PaginationConfig::Template { template } => {
            if !template.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "pagination template '{}' must contain a {{page}} placeholder",
                    template
                )));
            }
        }
        PaginationConfig::NextLink { selector } => validate_selector(selector)?,
    }

    Ok(())
}

/// Validates a seed URL: absolute, http or https
fn validate_seed_url(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}

fn validate_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Validates a domain pattern (supports a leading `*.` wildcard)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' has a misplaced '.' or '-'",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'agency.se')",
            domain
        )));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), ConfigError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        }
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "Invalid contact_email: '{}'",
            email
        )));
    }

    Ok(())
}
