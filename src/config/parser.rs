use crate::config::types::{
    default_job_timeout, default_queue_capacity, default_request_timeout, default_workers,
    Config, DirectoryConfig, EngineConfig, FileConfig, WebConfig,
};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Loads and parses a configuration file from the given path
///
/// The format is picked from the file extension: `.toml` files are parsed as
/// TOML, `.properties` and `.prop` files as flat `key = value` properties.
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use corpus_tally::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Keywords: {:?}", config.keywords);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    let config = match extension {
        "toml" => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        "properties" | "prop" => {
            let content = std::fs::read_to_string(path)?;
            parse_properties(&content)?
        }
        other => {
            return Err(ConfigError::UnsupportedFormat(format!(
                "'{}' ({})",
                other,
                path.display()
            )))
        }
    };

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that runs can be matched to the configuration they used.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Parses a properties document into a configuration
///
/// Keys follow the flat naming of properties files:
///
/// | key | field |
/// |-----|-------|
/// | `keywords` | comma-separated keyword list |
/// | `file_corpus_prefix` | `directory.corpus_prefix` |
/// | `dir_crawler_sleep_time` | `directory.sleep_time` |
/// | `file_scanning_size_limit` | `file.scanning_size_limit` |
/// | `hop_count` | `web.hop_count` |
/// | `url_refresh_time` | `web.url_refresh_time` |
/// | `request_timeout` | `web.request_timeout` (optional) |
/// | `queue_capacity`, `workers`, `job_timeout` | `engine.*` (optional) |
pub fn parse_properties(content: &str) -> Result<Config, ConfigError> {
    let properties = read_properties(content);

    let keywords = required(&properties, "keywords")?
        .split(',')
        .map(|keyword| keyword.trim().to_string())
        .filter(|keyword| !keyword.is_empty())
        .collect();

    Ok(Config {
        keywords,
        directory: DirectoryConfig {
            corpus_prefix: required(&properties, "file_corpus_prefix")?.to_string(),
            sleep_time: required_number(&properties, "dir_crawler_sleep_time")?,
        },
        file: FileConfig {
            scanning_size_limit: required_number(&properties, "file_scanning_size_limit")?,
        },
        web: WebConfig {
            hop_count: required_number(&properties, "hop_count")?,
            url_refresh_time: required_number(&properties, "url_refresh_time")?,
            request_timeout: optional_number(&properties, "request_timeout")?
                .unwrap_or_else(default_request_timeout),
        },
        engine: EngineConfig {
            queue_capacity: optional_number(&properties, "queue_capacity")?
                .unwrap_or_else(default_queue_capacity),
            workers: optional_number(&properties, "workers")?.unwrap_or_else(default_workers),
            job_timeout: optional_number(&properties, "job_timeout")?
                .unwrap_or_else(default_job_timeout),
        },
    })
}

/// Splits properties lines into a key/value map
///
/// Blank lines, lines without `=` and `#`/`!` comments are ignored. Keys and
/// values are trimmed; the first `=` separates them.
fn read_properties(content: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                properties.insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    properties
}

fn required<'a>(properties: &'a HashMap<String, String>, key: &str) -> Result<&'a str, ConfigError> {
    properties
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

fn required_number<T>(properties: &HashMap<String, String>, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_number(properties, key)?.ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

fn optional_number<T>(
    properties: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    properties
        .get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}
