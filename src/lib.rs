//! Corpus-Tally: a concurrent keyword-counting corpus indexer
//!
//! This crate discovers content in local directory trees and on web pages,
//! counts a fixed set of keywords in every discovered unit and aggregates the
//! counts per corpus. Summaries can be queried while a corpus is still being
//! crawled or blocked on until it completes.

pub mod app;
pub mod config;
pub mod crawler;
pub mod dispatcher;
pub mod pool;
pub mod result;
pub mod runner;
pub mod shell;

use std::time::Duration;

use dispatcher::JobKind;
use thiserror::Error;

/// Main error type for Corpus-Tally operations
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corpus '{corpus}' not found in {kind} summaries")]
    NotFound { kind: JobKind, corpus: String },

    #[error("No summary table for {0} jobs")]
    UnknownKind(JobKind),

    #[error("Summary for corpus '{corpus}' expired")]
    Expired { corpus: String },

    #[error("Job timed out after {after:?}")]
    Timeout { after: Duration, started: bool },

    #[error("Worker pool '{0}' is closed")]
    PoolClosed(&'static str),

    #[error("Worker pool '{0}' has no workers")]
    PoolDisabled(&'static str),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TallyError {
    /// Returns true when a pool submission's work did not run to completion
    /// and will not report on its own
    ///
    /// A run that started and then outlived its deadline is excluded: it keeps
    /// going in the background and reports when done.
    pub fn is_unfinished_run(&self) -> bool {
        matches!(
            self,
            Self::PoolDisabled(_)
                | Self::PoolClosed(_)
                | Self::Worker(_)
                | Self::Timeout { started: false, .. }
        )
    }

    /// Returns true for lookups that found nothing usable (absent or expired)
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Expired { .. } | Self::UnknownKind(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing config key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Corpus-Tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use app::App;
pub use config::Config;
pub use dispatcher::{Job, Router};
pub use result::{Aggregator, Counts};
