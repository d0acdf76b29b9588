//! Per-kind summary tables and the merge loop feeding them

use crate::dispatcher::JobKind;
use crate::pool::WorkerPool;
use crate::result::{Counts, PartResults, Summary};
use crate::runner::Runner;
use crate::TallyError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

type SummaryTable = Arc<DashMap<String, Arc<Summary>>>;

/// Summary tables keyed by job kind
///
/// Only kinds that produce results (`File` and `Web`) have a table.
struct SummaryTables {
    tables: DashMap<JobKind, SummaryTable>,
}

impl SummaryTables {
    fn new() -> Self {
        let tables = DashMap::new();
        tables.insert(JobKind::File, SummaryTable::default());
        tables.insert(JobKind::Web, SummaryTable::default());
        Self { tables }
    }

    fn table(&self, kind: JobKind) -> Result<SummaryTable, TallyError> {
        self.tables
            .get(&kind)
            .map(|table| table.clone())
            .ok_or(TallyError::UnknownKind(kind))
    }

    fn summary(&self, kind: JobKind, corpus: &str) -> Result<Arc<Summary>, TallyError> {
        self.table(kind)?
            .get(corpus)
            .map(|summary| summary.clone())
            .ok_or_else(|| TallyError::NotFound {
                kind,
                corpus: corpus.to_string(),
            })
    }

    fn reset(&self, kind: JobKind) -> Result<(), TallyError> {
        match self.tables.get_mut(&kind) {
            Some(mut table) => {
                *table = SummaryTable::default();
                Ok(())
            }
            None => Err(TallyError::UnknownKind(kind)),
        }
    }

    async fn merge(&self, results: PartResults) -> Result<(), TallyError> {
        let summary = self.summary(results.kind, &results.corpus_name)?;
        summary.merge(&results.counts).await;
        tracing::trace!(
            "Merged part into {} corpus {} ({} parts left)",
            results.kind,
            results.corpus_name,
            summary.remaining_parts()
        );
        Ok(())
    }
}

/// Tracks completion and keyword counts of every corpus
///
/// Merges are fire-and-forget: `update_summary` queues the part on a bounded
/// channel and the run loop hands it to the aggregator's worker pool.
pub struct Aggregator {
    tables: Arc<SummaryTables>,
    results_tx: mpsc::Sender<PartResults>,
    results_rx: Mutex<mpsc::Receiver<PartResults>>,
    pool: Arc<WorkerPool<PartResults, Result<(), TallyError>>>,
    job_timeout: Duration,
    shutdown: CancellationToken,
    span: tracing::Span,
}

impl Aggregator {
    /// Creates an aggregator
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - Capacity of the pending-results channel
    /// * `workers` - Concurrent merges
    /// * `job_timeout` - Deadline for a single merge submission
    pub fn new(buffer_size: usize, workers: usize, job_timeout: Duration) -> Self {
        let tables = Arc::new(SummaryTables::new());
        let (results_tx, results_rx) = mpsc::channel(buffer_size.max(1));

        let pool = {
            let tables = tables.clone();
            WorkerPool::new("aggregator", workers, move |results: PartResults| {
                let tables = tables.clone();
                async move { tables.merge(results).await }
            })
        };

        Self {
            tables,
            results_tx,
            results_rx: Mutex::new(results_rx),
            pool: Arc::new(pool),
            job_timeout,
            shutdown: CancellationToken::new(),
            span: tracing::info_span!("aggregator"),
        }
    }

    /// Creates a summary for `corpus` unless a live one already exists
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A new summary was created (replacing any stale one)
    /// * `Ok(false)` - A live summary exists; nothing changed
    /// * `Err(UnknownKind)` - `kind` has no summary table
    pub fn initialize_summary(
        &self,
        kind: JobKind,
        corpus: &str,
        expected_parts: usize,
        ttl: Option<DateTime<Utc>>,
    ) -> Result<bool, TallyError> {
        let table = self.tables.table(kind)?;
        let now = Utc::now();
        let expected = i64::try_from(expected_parts).unwrap_or(i64::MAX);

        let created = match table.entry(corpus.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    false
                } else {
                    entry.insert(Arc::new(Summary::new(expected, ttl)));
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Summary::new(expected, ttl)));
                true
            }
        };

        if created {
            tracing::info!(
                "Created {} corpus {} expecting {} parts",
                kind,
                corpus,
                expected_parts
            );
        } else {
            tracing::debug!("{} corpus {} is still live, not re-initialized", kind, corpus);
        }

        Ok(created)
    }

    /// Queues one finished part for merging
    ///
    /// Waits while the results channel is full. Parts sent after `stop` are dropped.
    pub async fn update_summary(&self, results: PartResults) {
        let kind = results.kind;
        let corpus = results.corpus_name.clone();
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                tracing::debug!("Aggregator stopped, dropping part for {} corpus {}", kind, corpus);
            }
            sent = self.results_tx.send(results) => {
                if let Err(e) = sent {
                    tracing::error!("Results channel closed, dropping part: {:?}", e.0);
                }
            }
        }
    }

    /// Registers one more pending part for `corpus`
    pub fn increment_result_count(&self, kind: JobKind, corpus: &str) -> Result<(), TallyError> {
        let summary = self.tables.summary(kind, corpus)?;
        summary.add_part();
        tracing::trace!(
            "{} corpus {} now expects {} more parts",
            kind,
            corpus,
            summary.remaining_parts()
        );
        Ok(())
    }

    /// Returns a summary that is present and not expired
    fn fresh_summary(&self, kind: JobKind, corpus: &str) -> Result<Arc<Summary>, TallyError> {
        let summary = self.tables.summary(kind, corpus)?;
        if summary.is_expired(Utc::now()) {
            return Err(TallyError::Expired {
                corpus: corpus.to_string(),
            });
        }
        Ok(summary)
    }

    /// Waits for `corpus` to complete and returns its counts
    pub async fn get_summary(&self, kind: JobKind, corpus: &str) -> Result<Counts, TallyError> {
        let summary = self.fresh_summary(kind, corpus)?;
        Ok(summary.wait_results().await)
    }

    /// Returns the counts of `corpus` if it already completed
    ///
    /// `Ok(None)` means the corpus exists but is still in progress.
    pub async fn query_summary(
        &self,
        kind: JobKind,
        corpus: &str,
    ) -> Result<Option<Counts>, TallyError> {
        let summary = self.fresh_summary(kind, corpus)?;
        Ok(summary.query_results().await)
    }

    /// Waits for every unexpired corpus of `kind` and returns all their counts
    ///
    /// Each corpus is awaited on its own task so slow corpora do not serialize
    /// the others.
    pub async fn get_summaries(
        &self,
        kind: JobKind,
    ) -> Result<HashMap<String, Counts>, TallyError> {
        let table = self.tables.table(kind)?;
        let now = Utc::now();

        let mut reads = JoinSet::new();
        for entry in table.iter() {
            if entry.value().is_expired(now) {
                continue;
            }
            let corpus = entry.key().clone();
            let summary = entry.value().clone();
            reads.spawn(async move { (corpus, summary.wait_results().await) });
        }

        let mut summaries = HashMap::new();
        while let Some(read) = reads.join_next().await {
            match read {
                Ok((corpus, counts)) => {
                    summaries.insert(corpus, counts);
                }
                Err(e) => tracing::error!("Summary read task failed: {}", e),
            }
        }

        Ok(summaries)
    }

    /// Drops every summary of `kind`
    pub fn delete_summary(&self, kind: JobKind) -> Result<(), TallyError> {
        self.tables.reset(kind)?;
        tracing::info!("Cleared {} summaries", kind);
        Ok(())
    }

    /// Names of the corpora currently tracked for `kind`
    pub fn corpus_names(&self, kind: JobKind) -> Result<Vec<String>, TallyError> {
        let table = self.tables.table(kind)?;
        let mut names: Vec<String> = table.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("Aggregator started");
        let mut results_rx = self.results_rx.lock().await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = results_rx.recv() => {
                    let Some(results) = received else { break };
                    let pool = self.pool.clone();
                    let tables = self.tables.clone();
                    let timeout = self.job_timeout;
                    tokio::spawn(
                        async move {
                            let e = match pool.submit(results.clone(), timeout).await {
                                Ok(Ok(())) => return,
                                Ok(Err(e)) => {
                                    tracing::warn!("Dropped part: {}", e);
                                    return;
                                }
                                Err(e) => e,
                            };
                            if !e.is_unfinished_run() {
                                tracing::warn!("Merging part is late: {}", e);
                                return;
                            }

                            // a part the pool never merged is merged here so its corpus can complete
                            tracing::debug!("Merging part inline: {}", e);
                            if let Err(e) = tables.merge(results).await {
                                tracing::warn!("Dropped part: {}", e);
                            }
                        }
                        .in_current_span(),
                    );
                }
            }
        }

        self.pool.close().await;
        tracing::info!("Aggregator stopped");
    }
}

impl Runner for Aggregator {
    fn start(self: Arc<Self>) -> JoinHandle<()> {
        let span = self.span.clone();
        tokio::spawn(self.run().instrument(span))
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }
}
