use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Corpus-Tally
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Keywords counted in every corpus, matched as exact whitespace-delimited tokens
    pub keywords: Vec<String>,

    pub directory: DirectoryConfig,

    pub file: FileConfig,

    pub web: WebConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Directory crawler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Name prefix that marks a directory as a corpus
    #[serde(rename = "corpus-prefix")]
    pub corpus_prefix: String,

    /// Time between scans of the registered roots (milliseconds)
    #[serde(rename = "sleep-time")]
    pub sleep_time: u64,
}

/// File crawler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Byte budget used to decide how many batches a directory is split into
    #[serde(rename = "scanning-size-limit")]
    pub scanning_size_limit: u64,
}

/// Web crawler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Link-following depth for pages added through the shell
    #[serde(rename = "hop-count")]
    pub hop_count: u32,

    /// How long a visited URL stays cached before it may be crawled again (milliseconds)
    #[serde(rename = "url-refresh-time")]
    pub url_refresh_time: u64,

    /// Per-request HTTP timeout (milliseconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Sizing of the shared engine: queues, pools and job deadlines
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of every job queue and of the aggregator's result channel
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent workers per pool; zero disables the pools
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deadline for a single pool submission (milliseconds)
    #[serde(rename = "job-timeout", default = "default_job_timeout")]
    pub job_timeout: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            job_timeout: default_job_timeout(),
        }
    }
}

impl DirectoryConfig {
    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time)
    }
}

impl WebConfig {
    pub fn url_refresh_time(&self) -> Duration {
        Duration::from_millis(self.url_refresh_time)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}

impl EngineConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout)
    }
}

pub(crate) fn default_request_timeout() -> u64 {
    30_000
}

pub(crate) fn default_queue_capacity() -> usize {
    50
}

pub(crate) fn default_workers() -> usize {
    200
}

pub(crate) fn default_job_timeout() -> u64 {
    60_000
}
