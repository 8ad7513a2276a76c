use crate::config::types::{
    CompressionConfig, Config, CrawlConfig, RetryConfig, SourceConfig, StorageConfig,
};
use crate::crawler::normalize_millis;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_storage_config(&config.storage)?;
    validate_retry_config(&config.retry)?;
    validate_compression_config(&config.compression)?;
    validate_crawl_config(&config.crawl)?;
    Ok(())
}

/// Rewrites values into the canonical form the crawler compares against
pub fn normalize(config: &mut Config) -> Result<(), ConfigError> {
    config.crawl.start_timestamp = normalize_millis(&config.crawl.start_timestamp)
        .ok_or_else(|| invalid_timestamp(&config.crawl.start_timestamp))?;
    config.source.base_url = config.source.base_url.trim_end_matches('/').to_string();
    Ok(())
}

/// Validates the feed location
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.resource.is_empty() {
        return Err(ConfigError::Validation(
            "resource cannot be empty".to_string(),
        ));
    }

    if config.resource.contains('/') {
        return Err(ConfigError::Validation(format!(
            "resource must be a single path segment, got '{}'",
            config.resource
        )));
    }

    if !config.sub_path.is_empty() && !config.sub_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "sub-path must start with '/', got '{}'",
            config.sub_path
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage layout
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.staging_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "staging-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry settings
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

/// Validates compression settings
fn validate_compression_config(config: &CompressionConfig) -> Result<(), ConfigError> {
    if config.level > 9 {
        return Err(ConfigError::Validation(format!(
            "compression level must be between 0 and 9, got {}",
            config.level
        )));
    }

    Ok(())
}

/// Validates the starting point
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if normalize_millis(&config.start_timestamp).is_none() {
        return Err(invalid_timestamp(&config.start_timestamp));
    }

    Ok(())
}

fn invalid_timestamp(value: &str) -> ConfigError {
    ConfigError::Validation(format!(
        "start-timestamp must be an ISO-8601 timestamp, got '{}'",
        value
    ))
}
