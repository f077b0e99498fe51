use crate::config::types::{Config, EdgarConfig, HarvestConfig, OutputConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_edgar_config(&config.edgar)?;
    Ok(())
}

/// Validates download behaviour
///
/// The concurrency ceiling is a politeness cap for a public service, so it
/// stays small regardless of the machine the harvester runs on.
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 16 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 16, got {}",
            config.max_concurrency
        )));
    }

    if config.request_delay_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms must be >= 100ms, got {}ms",
            config.request_delay_ms
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_base_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms must be <= 60000ms, got {}ms",
            config.backoff_base_ms
        )));
    }

    Ok(())
}

/// Validates client identification
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Validation("name cannot be empty".to_string()));
    }

    if config.name.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(format!(
            "name contains control characters: {:?}",
            config.name
        )));
    }

    validate_email(&config.contact_email)?;

    if let Some(backup) = &config.backup {
        if backup.trim().is_empty() || backup.chars().any(|c| c.is_control()) {
            return Err(ConfigError::Validation(format!(
                "backup identity is not a valid header value: {:?}",
                backup
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.download_dir.is_empty() {
        return Err(ConfigError::Validation(
            "download_dir cannot be empty".to_string(),
        ));
    }

    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger_path cannot be empty".to_string(),
        ));
    }

    if config.pending_path.is_empty() {
        return Err(ConfigError::Validation(
            "pending_path cannot be empty".to_string(),
        ));
    }

    if config.ledger_path == config.pending_path {
        return Err(ConfigError::Validation(
            "ledger_path and pending_path must differ".to_string(),
        ));
    }

    Ok(())
}

/// Validates the remote archive layout
fn validate_edgar_config(config: &EdgarConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.archive_base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid archive_base_url '{}': {}",
            config.archive_base_url, e
        ))
    })?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "archive_base_url '{}' must use http or https",
            config.archive_base_url
        )));
    }

    // Resource ids are joined onto the base, which drops the last segment
    // unless the base ends in a slash
    if !url.path().ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "archive_base_url '{}' must end with '/'",
            config.archive_base_url
        )));
    }

    if config.forms.iter().any(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "forms cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
