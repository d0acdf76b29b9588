use crate::config::types::{Config, DirectoryConfig, EngineConfig, FileConfig, WebConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_keywords(&config.keywords)?;
    validate_directory_config(&config.directory)?;
    validate_file_config(&config.file)?;
    validate_web_config(&config.web)?;
    validate_engine_config(&config.engine)?;
    Ok(())
}

/// Validates the keyword list
///
/// Keywords are compared against whitespace-delimited tokens, so a keyword
/// that contains whitespace could never match.
fn validate_keywords(keywords: &[String]) -> Result<(), ConfigError> {
    if keywords.is_empty() {
        return Err(ConfigError::Validation(
            "at least one keyword is required".to_string(),
        ));
    }

    for keyword in keywords {
        if keyword.is_empty() {
            return Err(ConfigError::Validation(
                "keywords cannot be empty".to_string(),
            ));
        }

        if keyword.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "keyword '{}' must not contain whitespace",
                keyword
            )));
        }
    }

    Ok(())
}

fn validate_directory_config(config: &DirectoryConfig) -> Result<(), ConfigError> {
    if config.corpus_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "corpus_prefix cannot be empty".to_string(),
        ));
    }

    if config.sleep_time == 0 {
        return Err(ConfigError::Validation(
            "directory sleep_time must be > 0ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_file_config(config: &FileConfig) -> Result<(), ConfigError> {
    if config.scanning_size_limit == 0 {
        return Err(ConfigError::Validation(
            "scanning_size_limit must be > 0 bytes".to_string(),
        ));
    }

    Ok(())
}

fn validate_web_config(config: &WebConfig) -> Result<(), ConfigError> {
    if config.url_refresh_time == 0 {
        return Err(ConfigError::Validation(
            "url_refresh_time must be > 0ms".to_string(),
        ));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be > 0ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates engine sizing
///
/// `workers = 0` is accepted: it leaves every pool disabled.
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "queue_capacity must be >= 1, got {}",
            config.queue_capacity
        )));
    }

    if config.job_timeout == 0 {
        return Err(ConfigError::Validation(
            "job_timeout must be > 0ms".to_string(),
        ));
    }

    Ok(())
}
