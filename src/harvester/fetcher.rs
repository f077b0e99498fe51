//! HTTP fetcher implementation
//!
//! This module handles every request made to the archive, including:
//! - Building HTTP clients with the required identification header
//! - Retry with exponential backoff for failed attempts
//! - A one-shot retry under a backup identity
//! - Error classification into timeout / status / connection failures

use crate::config::{Config, HarvestConfig, HashAlgorithm, UserAgentConfig};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Why a fetch failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The request did not complete within the timeout
    Timeout,

    /// The server answered with a non-success status
    HttpStatus(u16),

    /// The connection could not be made or broke mid-transfer
    Connection(String),
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The body was received in full
    Success {
        /// Response body
        bytes: Vec<u8>,
        /// Hex digest of `bytes`
        content_hash: String,
        /// HTTP status code
        status: u16,
    },

    /// Every attempt failed
    Failure {
        /// Classification of the last error seen
        kind: FetchErrorKind,
        /// Number of requests actually sent
        attempts: u32,
    },
}

impl FetchResult {
    /// Returns true for `Success`
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Source of remote bytes
///
/// The orchestrator and resolvers only talk to the network through this
/// trait.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches `url`, retrying as configured
    async fn fetch(&self, url: &Url) -> FetchResult;
}

/// Attempt and backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made with the primary identity
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles after each further one
    pub base_delay: Duration,

    /// Timeout applied to each attempt
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Builds the policy from the harvest section of the config
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Delay to wait after the zero-based `attempt` failed
    ///
    /// `base_delay * 2^attempt`, saturating at `Duration::MAX`
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HarvestConfig::default())
    }
}

/// Builds an HTTP client with proper configuration
///
/// The identification header is mandatory for EDGAR; requests without one
/// are refused.
///
/// # Example
///
/// ```no_run
/// use edgar_harvest::config::UserAgentConfig;
/// use edgar_harvest::harvester::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     name: "EdgarHarvest".to_string(),
///     contact_email: "admin@example.com".to_string(),
///     backup: None,
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// The rate-limited fetch primitive
///
/// One GET per attempt. Non-2xx statuses and transport errors are retried
/// with exponential backoff; when a backup identity is configured it gets
/// exactly one further attempt once the primary attempts are spent. The
/// fetcher never touches the disk and never sleeps between *different*
/// requests: spacing is the caller's job.
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    backup_agent: Option<HeaderValue>,
    hash_algorithm: HashAlgorithm,
}

impl Fetcher {
    /// Creates a fetcher from explicit settings
    pub fn new(
        user_agent: &UserAgentConfig,
        policy: RetryPolicy,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self, HarvestError> {
        let client = build_http_client(user_agent, policy.timeout)?;

        let backup_agent = match &user_agent.backup {
            Some(backup) => Some(HeaderValue::from_str(backup).map_err(|e| {
                ConfigError::Validation(format!("backup identity {:?}: {}", backup, e))
            })?),
            None => None,
        };

        Ok(Self {
            client,
            policy,
            backup_agent,
            hash_algorithm,
        })
    }

    /// Creates a fetcher from the full configuration
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        Self::new(
            &config.user_agent,
            RetryPolicy::from_config(&config.harvest),
            config.harvest.hash_algorithm,
        )
    }

    /// Returns the retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends a single GET, optionally overriding the identity header
    async fn attempt(
        &self,
        url: &Url,
        agent: Option<&HeaderValue>,
    ) -> Result<(u16, Vec<u8>), FetchErrorKind> {
        let mut request = self.client.get(url.clone());
        if let Some(agent) = agent {
            request = request.header(USER_AGENT, agent.clone());
        }

        let response = request.send().await.map_err(classify_error)?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchErrorKind::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify_error)?;
        Ok((status.as_u16(), body.to_vec()))
    }

    fn success(&self, status: u16, bytes: Vec<u8>) -> FetchResult {
        let content_hash = self.hash_algorithm.digest(&bytes);
        FetchResult::Success {
            bytes,
            content_hash,
            status,
        }
    }
}

#[async_trait]
impl Fetch for Fetcher {
    async fn fetch(&self, url: &Url) -> FetchResult {
        let mut last_error = FetchErrorKind::Connection("no attempt made".to_string());
        let mut attempts = 0;

        for attempt in 0..self.policy.max_attempts {
            attempts += 1;

            match self.attempt(url, None).await {
                Ok((status, bytes)) => return self.success(status, bytes),
                Err(kind) => {
                    tracing::debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        url,
                        kind
                    );
                    last_error = kind;
                }
            }

            let is_last = attempt + 1 == self.policy.max_attempts;
            if !is_last || self.backup_agent.is_some() {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        if let Some(backup) = &self.backup_agent {
            attempts += 1;
            tracing::info!("Retrying {} once with backup identity", url);

            match self.attempt(url, Some(backup)).await {
                Ok((status, bytes)) => return self.success(status, bytes),
                Err(kind) => last_error = kind,
            }
        }

        tracing::warn!("Giving up on {} after {} attempts: {}", url, attempts, last_error);

        FetchResult::Failure {
            kind: last_error,
            attempts,
        }
    }
}

/// Maps a transport error onto the failure taxonomy
fn classify_error(e: reqwest::Error) -> FetchErrorKind {
    if e.is_timeout() {
        FetchErrorKind::Timeout
    } else if e.is_connect() {
        FetchErrorKind::Connection("connection refused".to_string())
    } else {
        FetchErrorKind::Connection(e.to_string())
    }
}
