//! File crawler
//!
//! Turns each directory job into size-budgeted batches of files and counts
//! keywords per batch on the crawler's worker pool. One batch is one part of
//! the directory's corpus.

use crate::crawler::KeywordTally;
use crate::dispatcher::{DirectoryPayload, FilePayload, Job, JobKind, JobStream, Router};
use crate::pool::WorkerPool;
use crate::result::{Aggregator, PartResults};
use crate::runner::Runner;
use crate::TallyError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use walkdir::WalkDir;

/// Files of one corpus counted together
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub corpus_name: String,
    pub files: Vec<FilePayload>,
}

pub struct FileCrawler {
    router: Arc<Router>,
    aggregator: Arc<Aggregator>,
    tally: KeywordTally,
    scanning_size_limit: u64,
    pool: Arc<WorkerPool<FileBatch, ()>>,
    job_timeout: Duration,
    shutdown: CancellationToken,
    span: tracing::Span,
}

impl FileCrawler {
    pub fn new(
        router: Arc<Router>,
        aggregator: Arc<Aggregator>,
        tally: KeywordTally,
        scanning_size_limit: u64,
        workers: usize,
        job_timeout: Duration,
    ) -> Self {
        let pool = {
            let aggregator = aggregator.clone();
            let tally = tally.clone();
            WorkerPool::new("file", workers, move |batch: FileBatch| {
                let aggregator = aggregator.clone();
                let tally = tally.clone();
                async move { count_batch(&tally, &aggregator, batch).await }
            })
        };

        Self {
            router,
            aggregator,
            tally,
            scanning_size_limit,
            pool: Arc::new(pool),
            job_timeout,
            shutdown: CancellationToken::new(),
            span: tracing::info_span!("file_crawler"),
        }
    }

    /// Enumerates, batches and submits one directory corpus
    ///
    /// Returns the number of batches submitted, or zero when the corpus is
    /// still being counted from an earlier job.
    pub async fn process_directory(&self, directory: DirectoryPayload) -> Result<usize, TallyError> {
        let files = {
            let directory = directory.clone();
            tokio::task::spawn_blocking(move || enumerate_files(&directory))
                .await
                .map_err(|e| TallyError::Worker(format!("enumerating files: {}", e)))?
        };
        let file_count = files.len();
        let batches = plan_batches(files, directory.size, self.scanning_size_limit);

        let created = self.aggregator.initialize_summary(
            JobKind::File,
            &directory.corpus_name,
            batches.len(),
            None,
        )?;
        if !created {
            tracing::info!(
                "Corpus {} is still being counted, skipping",
                directory.corpus_name
            );
            return Ok(0);
        }

        tracing::info!(
            "Counting corpus {}: {} files in {} batches",
            directory.corpus_name,
            file_count,
            batches.len()
        );

        let submitted = batches.len();
        for files in batches {
            let batch = FileBatch {
                corpus_name: directory.corpus_name.clone(),
                files,
            };
            let pool = self.pool.clone();
            let aggregator = self.aggregator.clone();
            let empty = self.tally.zeroed();
            let timeout = self.job_timeout;
            tokio::spawn(
                async move {
                    let corpus = batch.corpus_name.clone();
                    let Err(e) = pool.submit(batch, timeout).await else {
                        return;
                    };
                    match e {
                        TallyError::PoolDisabled(_) => {
                            tracing::debug!("File pool disabled, batch of {} not counted", corpus);
                        }
                        ref e => tracing::warn!("Batch of {} failed: {}", corpus, e),
                    }
                    // the batch still settles its part, with nothing counted
                    if e.is_unfinished_run() {
                        aggregator
                            .update_summary(PartResults {
                                kind: JobKind::File,
                                corpus_name: corpus,
                                counts: empty,
                            })
                            .await;
                    }
                }
                .in_current_span(),
            );
        }

        Ok(submitted)
    }

    fn dispatch(self: &Arc<Self>, job: Job) {
        let directory = match job {
            Job::Directory(directory) => directory,
            other => unreachable!("directory stream yielded a {} job", other.kind()),
        };

        let crawler = self.clone();
        tokio::spawn(
            async move {
                let corpus = directory.corpus_name.clone();
                if let Err(e) = crawler.process_directory(directory).await {
                    tracing::error!("Directory job for {} failed: {}", corpus, e);
                }
            }
            .in_current_span(),
        );
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("File crawler started");
        let stream: JobStream = self.router.stream(JobKind::Directory);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job = stream.recv() => match job {
                    Some(job) => self.dispatch(job),
                    None => break,
                },
            }
        }

        self.pool.close().await;
        tracing::info!("File crawler stopped");
    }
}

impl Runner for FileCrawler {
    fn start(self: Arc<Self>) -> JoinHandle<()> {
        let span = self.span.clone();
        tokio::spawn(self.run().instrument(span))
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Lists the regular files below a directory corpus, in file-name order
///
/// Entries that cannot be read are logged and skipped.
pub fn enumerate_files(directory: &DirectoryPayload) -> Vec<FilePayload> {
    WalkDir::new(&directory.path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping entry in {}: {}", directory.corpus_name, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                    return None;
                }
            };
            Some(FilePayload {
                corpus_name: directory.corpus_name.clone(),
                path: entry.into_path(),
                size,
            })
        })
        .collect()
}

/// Splits files into batches sized by the directory's byte budget
///
/// `ceil(total_size / size_limit)` batches are targeted (at least one), and
/// files are cut in order into chunks of `ceil(files / batches)`. Fewer
/// batches come out when there are fewer files than targeted batches. No
/// files gives one empty batch.
pub fn plan_batches(
    files: Vec<FilePayload>,
    total_size: u64,
    size_limit: u64,
) -> Vec<Vec<FilePayload>> {
    if files.is_empty() {
        return vec![Vec::new()];
    }

    let target = total_size.div_ceil(size_limit.max(1)).max(1);
    let target = usize::try_from(target).unwrap_or(usize::MAX);
    let batch_size = files.len().div_ceil(target);

    let mut batches = Vec::with_capacity(files.len().div_ceil(batch_size));
    let mut files = files.into_iter().peekable();
    while files.peek().is_some() {
        batches.push(files.by_ref().take(batch_size).collect());
    }
    batches
}

/// Counts keywords across a batch and reports it as one part
async fn count_batch(tally: &KeywordTally, aggregator: &Aggregator, batch: FileBatch) {
    let mut counts = tally.zeroed();
    for file in &batch.files {
        match read_text(&file.path).await {
            Ok(text) => tally.count_into(&text, &mut counts),
            Err(e) => tracing::warn!("Skipping {}: {}", file.path.display(), e),
        }
    }

    aggregator
        .update_summary(PartResults {
            kind: JobKind::File,
            corpus_name: batch.corpus_name,
            counts,
        })
        .await;
}

async fn read_text(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
