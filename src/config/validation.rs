use crate::config::types::{Config, CrawlerConfig, OutputConfig, RegistryConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_registry_config(&config.registry)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the registry site configuration
fn validate_registry_config(config: &RegistryConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.region_code.is_empty() {
        return Err(ConfigError::Validation(
            "region_code cannot be empty".to_string(),
        ));
    }

    if !config.region_code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(format!(
            "region_code must be ASCII alphanumeric, got '{}'",
            config.region_code
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates crawl pacing configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_delay_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms must be >= 100ms, got {}ms",
            config.request_delay_ms
        )));
    }

    if config.max_retry_passes > 5 {
        return Err(ConfigError::Validation(format!(
            "max_retry_passes must be between 0 and 5, got {}",
            config.max_retry_passes
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DEFAULT_USER_AGENT;

    fn registry(base_url: &str, region_code: &str) -> RegistryConfig {
        RegistryConfig {
            base_url: base_url.to_string(),
            region_code: region_code.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_validate_registry() {
        assert!(validate_registry_config(&registry("http://www.cszjxx.net", "cs")).is_ok());
        assert!(validate_registry_config(&registry("https://registry.example.com", "cs")).is_ok());

        assert!(validate_registry_config(&registry("not a url", "cs")).is_err());
        assert!(validate_registry_config(&registry("ftp://example.com", "cs")).is_err());
        assert!(validate_registry_config(&registry("http://example.com", "")).is_err());
        assert!(validate_registry_config(&registry("http://example.com", "c s")).is_err());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let mut config = registry("http://example.com", "cs");
        config.request_timeout_secs = 0;
        assert!(validate_registry_config(&config).is_err());
        config.request_timeout_secs = 301;
        assert!(validate_registry_config(&config).is_err());
    }

    #[test]
    fn test_validate_crawler() {
        let mut config = CrawlerConfig {
            request_delay_ms: 1000,
            max_retry_passes: 1,
            retry_backoff_ms: None,
        };
        assert!(validate_crawler_config(&config).is_ok());

        config.max_retry_passes = 0;
        assert!(validate_crawler_config(&config).is_ok());

        config.max_retry_passes = 6;
        assert!(validate_crawler_config(&config).is_err());

        config.max_retry_passes = 1;
        config.request_delay_ms = 50;
        assert!(validate_crawler_config(&config).is_err());
    }
}
