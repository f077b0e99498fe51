use serde::Deserialize;

/// Main configuration structure for edgar-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub edgar: EdgarConfig,
}

/// Download behaviour configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Maximum number of fetches in flight at once
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Minimum time between two requests to the archive (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts made with the primary identity before giving up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff between attempts (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Digest used for ledger content hashes
    #[serde(rename = "hash-algorithm", default)]
    pub hash_algorithm: HashAlgorithm,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

/// Content hash algorithm recorded in the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Md5,
}

/// Client identification sent with every request
///
/// EDGAR rejects clients that do not name a reachable contact.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    pub name: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,

    /// Alternate identity tried once after the primary one is exhausted
    #[serde(default)]
    pub backup: Option<String>,
}

impl UserAgentConfig {
    /// Formats the primary identity header value
    ///
    /// Format: `Name contact@example.com`
    pub fn header_value(&self) -> String {
        format!("{} {}", self.name, self.contact_email)
    }
}

/// Local persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory for downloaded filings
    #[serde(rename = "download-dir")]
    pub download_dir: String,

    /// Path to the append-only ledger
    #[serde(rename = "ledger-path")]
    pub ledger_path: String,

    /// Path to the pending resource list
    #[serde(rename = "pending-path")]
    pub pending_path: String,
}

/// Remote archive layout
#[derive(Debug, Clone, Deserialize)]
pub struct EdgarConfig {
    /// Base URL every resource identifier is relative to
    #[serde(rename = "archive-base-url", default = "default_archive_base_url")]
    pub archive_base_url: String,

    /// Number of header lines preceding data in a quarterly index
    #[serde(rename = "index-header-lines", default = "default_index_header_lines")]
    pub index_header_lines: usize,

    /// Form types to keep from index runs (empty keeps all)
    #[serde(default)]
    pub forms: Vec<String>,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            archive_base_url: default_archive_base_url(),
            index_header_lines: default_index_header_lines(),
            forms: Vec::new(),
        }
    }
}

fn default_max_concurrency() -> u32 {
    4
}

fn default_request_delay_ms() -> u64 {
    200
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_archive_base_url() -> String {
    "https://www.sec.gov/Archives/".to_string()
}

fn default_index_header_lines() -> usize {
    11
}
