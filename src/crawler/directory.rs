//! Directory crawler
//!
//! Polls the registered roots and emits a directory job for every corpus
//! directory that is new or whose modification time changed since the last
//! scan.

use crate::dispatcher::{DirectoryPayload, Router};
use crate::runner::Runner;
use crate::TallyError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use walkdir::WalkDir;

/// A corpus directory seen during a scan
#[derive(Debug, Clone)]
struct FoundCorpus {
    name: String,
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Registered roots and the last modification time seen per corpus directory
#[derive(Default)]
struct WatchState {
    roots: Vec<PathBuf>,
    modified: HashMap<PathBuf, SystemTime>,
}

pub struct DirectoryCrawler {
    router: Arc<Router>,
    corpus_prefix: String,
    sleep_time: Duration,
    state: Mutex<WatchState>,
    force_tx: mpsc::UnboundedSender<PathBuf>,
    force_rx: Mutex<mpsc::UnboundedReceiver<PathBuf>>,
    shutdown: CancellationToken,
    span: tracing::Span,
}

impl DirectoryCrawler {
    pub fn new(router: Arc<Router>, corpus_prefix: impl Into<String>, sleep_time: Duration) -> Self {
        let (force_tx, force_rx) = mpsc::unbounded_channel();
        Self {
            router,
            corpus_prefix: corpus_prefix.into(),
            sleep_time,
            state: Mutex::new(WatchState::default()),
            force_tx,
            force_rx: Mutex::new(force_rx),
            shutdown: CancellationToken::new(),
            span: tracing::info_span!("directory_crawler"),
        }
    }

    /// Registers a root and schedules a forced scan of it
    ///
    /// Registering the same directory twice keeps one root but still schedules
    /// a new forced scan.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` - the path does not exist or is not a directory
    pub async fn add_directory_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, TallyError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| TallyError::InvalidInput(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_dir() {
            return Err(TallyError::InvalidInput(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let root = tokio::fs::canonicalize(path).await?;

        {
            let mut state = self.state.lock().await;
            if !state.roots.contains(&root) {
                state.roots.push(root.clone());
                tracing::info!("Watching {}", root.display());
            }
        }

        if self.force_tx.send(root.clone()).is_err() {
            tracing::warn!("Directory crawler is gone, {} not scanned", root.display());
        }
        Ok(root)
    }

    /// Registered roots, in registration order
    pub async fn roots(&self) -> Vec<PathBuf> {
        self.state.lock().await.roots.clone()
    }

    /// Scans every registered root once, emitting jobs for changed corpora
    ///
    /// Returns the number of jobs emitted.
    pub async fn crawl(&self) -> usize {
        let mut state = self.state.lock().await;
        let roots = state.roots.clone();

        let mut emitted = 0;
        for root in &roots {
            emitted += self.scan(&mut state, root).await;
        }
        if emitted > 0 {
            tracing::debug!("Scan emitted {} directory jobs", emitted);
        }
        emitted
    }

    /// Scans `root` ignoring the cache: every corpus under it is emitted
    pub async fn force_scan(&self, root: &Path) -> usize {
        let mut state = self.state.lock().await;
        state.modified.retain(|path, _| !path.starts_with(root));
        let emitted = self.scan(&mut state, root).await;
        tracing::info!("Forced scan of {} emitted {} directory jobs", root.display(), emitted);
        emitted
    }

    async fn scan(&self, state: &mut WatchState, root: &Path) -> usize {
        let found = {
            let walk_root = root.to_path_buf();
            let prefix = self.corpus_prefix.clone();
            match tokio::task::spawn_blocking(move || find_corpora(&walk_root, &prefix)).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!("Scanning {} failed: {}", root.display(), e);
                    return 0;
                }
            }
        };

        let mut emitted = 0;
        for corpus in found {
            let changed = match state.modified.insert(corpus.path.clone(), corpus.modified) {
                None => true,
                Some(previous) => previous != corpus.modified,
            };
            if !changed {
                continue;
            }

            tracing::debug!("Corpus {} changed ({} bytes)", corpus.name, corpus.size);
            let job = DirectoryPayload {
                corpus_name: corpus.name,
                path: corpus.path.clone(),
                size: corpus.size,
            };
            if !self.router.push_or_cancel(job.into(), &self.shutdown).await {
                // forget it so the next scan emits it again
                state.modified.remove(&corpus.path);
                break;
            }
            emitted += 1;
        }
        emitted
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("Directory crawler started (every {:?})", self.sleep_time);
        // New roots are scanned through the force channel, so the first tick can wait a period
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.sleep_time, self.sleep_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut force_rx = self.force_rx.lock().await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(root) = force_rx.recv() => {
                    self.force_scan(&root).await;
                }
                _ = ticker.tick() => {
                    self.crawl().await;
                }
            }
        }

        tracing::info!("Directory crawler stopped");
    }
}

impl Runner for DirectoryCrawler {
    fn start(self: Arc<Self>) -> JoinHandle<()> {
        let span = self.span.clone();
        tokio::spawn(self.run().instrument(span))
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }
}

fn has_prefix(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(prefix))
}

/// Lists the corpus directories directly under `root`, or `root` itself if it is one
fn find_corpora(root: &Path, prefix: &str) -> Vec<FoundCorpus> {
    if has_prefix(root, prefix) {
        return describe(root).into_iter().collect();
    }

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir() && has_prefix(entry.path(), prefix))
        .filter_map(|entry| describe(entry.path()))
        .collect()
}

fn describe(path: &Path) -> Option<FoundCorpus> {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
            tracing::warn!("Cannot stat {}: {}", path.display(), e);
            return None;
        }
    };

    Some(FoundCorpus {
        name: path.file_name()?.to_string_lossy().into_owned(),
        path: path.to_path_buf(),
        modified,
        size: directory_size(path),
    })
}

/// Total byte size of the regular files below `path`
fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
