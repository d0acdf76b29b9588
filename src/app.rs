//! Application context
//!
//! Owns the shared router and aggregator, the three crawlers, and the
//! handles of their running loops.

use crate::config::Config;
use crate::crawler::{build_http_client, DirectoryCrawler, FileCrawler, KeywordTally, WebCrawler};
use crate::dispatcher::{JobKind, Router};
use crate::result::{Aggregator, Counts};
use crate::runner::Runner;
use crate::TallyError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct App {
    config: Arc<Config>,
    router: Arc<Router>,
    aggregator: Arc<Aggregator>,
    directories: Arc<DirectoryCrawler>,
    files: Arc<FileCrawler>,
    web: Arc<WebCrawler>,
    crawler_handles: Mutex<Vec<JoinHandle<()>>>,
    aggregator_handle: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    /// Wires every component from `config`; nothing runs until `start`
    pub fn new(config: Config) -> Result<Self, TallyError> {
        let engine = &config.engine;
        let tally = KeywordTally::new(&config.keywords);

        let router = Arc::new(Router::new(engine.queue_capacity));
        let aggregator = Arc::new(Aggregator::new(
            engine.queue_capacity,
            engine.workers,
            engine.job_timeout(),
        ));

        let directories = Arc::new(DirectoryCrawler::new(
            router.clone(),
            config.directory.corpus_prefix.clone(),
            config.directory.sleep_time(),
        ));

        let files = Arc::new(FileCrawler::new(
            router.clone(),
            aggregator.clone(),
            tally.clone(),
            config.file.scanning_size_limit,
            engine.workers,
            engine.job_timeout(),
        ));

        let client = build_http_client(config.web.request_timeout())?;
        let web = Arc::new(WebCrawler::new(
            router.clone(),
            aggregator.clone(),
            client,
            tally,
            config.web.hop_count,
            config.web.url_refresh_time(),
            engine.workers,
            engine.job_timeout(),
        ));

        Ok(Self {
            config: Arc::new(config),
            router,
            aggregator,
            directories,
            files,
            web,
            crawler_handles: Mutex::new(Vec::new()),
            aggregator_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Starts the aggregator and every crawler loop
    ///
    /// Calling `start` on a running app does nothing.
    pub async fn start(&self) {
        let mut aggregator_handle = self.aggregator_handle.lock().await;
        if aggregator_handle.is_some() {
            tracing::warn!("Already running");
            return;
        }
        *aggregator_handle = Some(self.aggregator.clone().start());

        let mut crawler_handles = self.crawler_handles.lock().await;
        crawler_handles.push(self.directories.clone().start());
        crawler_handles.push(self.files.clone().start());
        crawler_handles.push(self.web.clone().start());

        tracing::info!(
            "Started with {} keywords, {} workers per pool",
            self.config.keywords.len(),
            self.config.engine.workers
        );
    }

    /// Stops the crawlers, then the aggregator, waiting for each to drain
    ///
    /// A stopped app cannot be started again.
    pub async fn stop(&self) {
        self.directories.stop();
        self.files.stop();
        self.web.stop();
        for handle in self.crawler_handles.lock().await.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("Crawler loop ended abnormally: {}", e);
            }
        }

        self.aggregator.stop();
        if let Some(handle) = self.aggregator_handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Aggregator loop ended abnormally: {}", e);
            }
        }

        tracing::info!("Stopped");
    }

    /// Registers a directory root for watching
    pub async fn add_directory(&self, path: impl AsRef<Path>) -> Result<PathBuf, TallyError> {
        self.directories.add_directory_path(path).await
    }

    /// Starts crawling a web corpus; `false` if it is already tracked
    pub async fn add_web_page(&self, url: &str) -> Result<bool, TallyError> {
        self.web.add_web_page(url).await
    }

    pub async fn get_summary(&self, kind: JobKind, corpus: &str) -> Result<Counts, TallyError> {
        self.aggregator.get_summary(kind, corpus).await
    }

    pub async fn query_summary(
        &self,
        kind: JobKind,
        corpus: &str,
    ) -> Result<Option<Counts>, TallyError> {
        self.aggregator.query_summary(kind, corpus).await
    }

    pub async fn get_summaries(&self, kind: JobKind) -> Result<HashMap<String, Counts>, TallyError> {
        self.aggregator.get_summaries(kind).await
    }

    pub fn clear_summaries(&self, kind: JobKind) -> Result<(), TallyError> {
        self.aggregator.delete_summary(kind)
    }
}
