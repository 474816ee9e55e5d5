use serde::Deserialize;

/// Main configuration structure for Agency Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "authority")]
    pub authorities: Vec<AuthorityConfig>,
}

impl Config {
    /// Total number of seed locations across every authority and strategy
    pub fn seed_count(&self) -> usize {
        self.authorities.iter().map(AuthorityConfig::seed_count).sum()
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of in-flight requests against one domain
    #[serde(default = "default_concurrency")]
    pub max_concurrent_per_domain: u32,

    /// Minimum time between two requests to the same domain (milliseconds)
    #[serde(default)]
    pub minimum_time_between_requests: u64,

    /// Number of pooled rendering sessions
    #[serde(default = "default_render_sessions")]
    pub render_sessions: u32,

    /// Default link-following depth for the recursive crawler
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Page-count ceiling for paginated listings
    #[serde(default = "default_max_listing_pages")]
    pub max_listing_pages: u32,

    /// Consecutive page advances without new entries before a listing is considered exhausted
    #[serde(default = "default_max_idle_attempts")]
    pub max_idle_attempts: u32,
}

/// Bounded exponential backoff settings shared by traversal and downloads
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total attempts per request, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_base_delay")]
    pub base_delay: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the identifying header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Root directory for downloaded artifacts
    pub download_dir: String,

    /// Path of the tabular (CSV) metadata export
    pub export_path: String,
}

/// One crawl source (a government agency website)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthorityConfig {
    /// Short name, used as the top-level download directory
    pub name: String,

    /// Domain pattern (e.g., "agency.se" or "*.agency.se")
    pub domain: String,

    /// File extensions treated as downloadable documents
    #[serde(default = "default_document_types")]
    pub document_types: Vec<String>,

    /// Download document links found on record pages
    #[serde(default = "default_true")]
    pub download_attachments: bool,

    /// Store the rendered HTML of record pages as artifacts
    #[serde(default)]
    pub archive_pages: bool,

    /// Only yield document URLs (by extension) from sitemaps
    #[serde(default = "default_true")]
    pub sitemap_documents_only: bool,

    #[serde(default)]
    pub sitemaps: Vec<String>,

    #[serde(default)]
    pub feeds: Vec<String>,

    #[serde(default)]
    pub listing: Vec<ListingConfig>,

    pub crawl: Option<LinkCrawlConfig>,

    pub rules: Option<SourceRules>,
}

impl AuthorityConfig {
    /// Number of configured entry points for this authority
    pub fn seed_count(&self) -> usize {
        self.sitemaps.len()
            + self.feeds.len()
            + self.listing.len()
            + self.crawl.as_ref().map(|c| c.seeds.len()).unwrap_or(0)
    }
}

/// Per-authority metadata extraction rules, one variant per page structure
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceRules {
    /// CSS selectors and text labels
    Selectors(SelectorRules),

    /// `<meta>` tags in the document head (OpenGraph / Dublin Core)
    HeadMeta(HeadMetaRules),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectorRules {
    #[serde(default = "default_title_selector")]
    pub title: String,

    /// Label preceding the series id (e.g., "Serienummer")
    pub series_label: Option<String>,

    /// Label preceding the internal reference id (e.g., "Diarienummer")
    pub reference_label: Option<String>,

    /// Description selectors, tried in order
    #[serde(default = "default_description_selectors")]
    pub description: Vec<String>,

    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeadMetaRules {
    /// Meta name/property holding the series id
    pub series_meta: Option<String>,

    /// Meta name/property holding the reference id
    pub reference_meta: Option<String>,
}

/// A paginated listing of publications
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListingConfig {
    /// First listing page
    pub url: String,

    /// Selector for one listing entry container
    pub entry: String,

    /// Selector for the entry's link, relative to the container
    #[serde(default = "default_link_selector")]
    pub link: String,

    /// Selector for the entry's date, relative to the container
    pub date: Option<String>,

    /// Accepted values of the second path segment of entry links
    #[serde(default)]
    pub categories: Vec<String>,

    /// Text that must appear in an h1-h3 for the page to count as a listing page
    pub marker: Option<String>,

    pub pagination: PaginationConfig,
}

/// How the walker advances to the next listing page
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PaginationConfig {
    /// URL template with `{url}` and `{page}` placeholders
    Template { template: String },

    /// Follow the href of the first element matching `selector`
    NextLink { selector: String },
}

/// Recursive link-following configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkCrawlConfig {
    pub seeds: Vec<String>,

    /// Path prefix that followed HTML pages must share
    pub scope: Option<String>,

    pub max_depth: Option<u32>,

    /// Regex matched against the URL path; matching links are ignored
    pub exclude: Option<String>,
}

fn default_concurrency() -> u32 {
    2
}

fn default_render_sessions() -> u32 {
    2
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_listing_pages() -> u32 {
    200
}

fn default_max_idle_attempts() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_title_selector() -> String {
    "h1".to_string()
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

fn default_description_selectors() -> Vec<String> {
    vec!["p".to_string()]
}

pub(crate) fn default_document_types() -> Vec<String> {
    ["pdf", "xlsx", "xls", "csv", "doc", "docx", "ods", "odt", "zip"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
