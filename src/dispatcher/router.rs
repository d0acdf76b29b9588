//! Type-keyed job router
//!
//! Every job kind gets its own bounded FIFO queue, created the first time the
//! kind is pushed, streamed or popped. A full queue blocks its producers, which
//! is how a slow consumer throttles everything feeding it.

use crate::dispatcher::job::{Job, JobKind};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// One bounded queue; the receiver is shared so several readers can compete for jobs
#[derive(Clone)]
struct JobQueue {
    tx: mpsc::Sender<Job>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl JobQueue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// Receiving side of one job kind's queue
///
/// Cloning a stream gives another competing reader: each job is delivered to
/// exactly one of them.
#[derive(Clone)]
pub struct JobStream {
    kind: JobKind,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl JobStream {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Waits for the next job
    ///
    /// Returns `None` only once every sender is gone, which cannot happen while
    /// the owning router is alive.
    pub async fn recv(&self) -> Option<Job> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Takes a job if one is queued right now
    pub async fn try_recv(&self) -> Option<Job> {
        let mut rx = self.rx.lock().await;
        rx.try_recv().ok()
    }
}

/// Registry of job kind to bounded queue
pub struct Router {
    capacity: usize,
    queues: DashMap<JobKind, JobQueue>,
}

impl Router {
    /// Creates a router whose queues all hold at most `capacity` jobs
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: DashMap::new(),
        }
    }

    /// Returns the queue for `kind`, registering it on first use
    ///
    /// `entry` holds the shard lock while inserting, so concurrent first
    /// accesses all observe the same queue.
    fn queue(&self, kind: JobKind) -> JobQueue {
        self.queues
            .entry(kind)
            .or_insert_with(|| {
                tracing::info!("Registered job queue for {} jobs", kind);
                JobQueue::new(self.capacity)
            })
            .clone()
    }

    /// Enqueues a job, waiting while its queue is full
    pub async fn push(&self, job: Job) {
        let kind = job.kind();
        let queue = self.queue(kind);

        tracing::trace!("Pushing {} job for corpus {}", kind, job.corpus_name());
        if let Err(e) = queue.tx.send(job).await {
            // The router owns a receiver for every queue it hands out
            tracing::error!("Dropped {} job, queue closed: {:?}", kind, e.0);
        }
    }

    /// Enqueues a job unless `cancel` fires while waiting for space
    ///
    /// Returns whether the job was queued. Nothing is queued once `cancel` has
    /// fired, even if the queue has room.
    pub async fn push_or_cancel(&self, job: Job, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Push of {} job for {} cancelled", job.kind(), job.corpus_name());
                false
            }
            _ = self.push(job.clone()) => true,
        }
    }

    /// Returns a stream over the queue for `kind`
    pub fn stream(&self, kind: JobKind) -> JobStream {
        let queue = self.queue(kind);
        JobStream { kind, rx: queue.rx }
    }

    /// Waits for a single job of the given kind
    pub async fn pop(&self, kind: JobKind) -> Option<Job> {
        self.stream(kind).recv().await
    }

    /// Takes a job of the given kind without waiting
    pub async fn try_pop(&self, kind: JobKind) -> Option<Job> {
        self.stream(kind).try_recv().await
    }

    /// Number of jobs currently waiting in the queue for `kind`
    pub fn queued(&self, kind: JobKind) -> usize {
        self.queues
            .get(&kind)
            .map(|queue| self.capacity - queue.tx.capacity())
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::job::{DirectoryPayload, WebPayload};
    use std::path::PathBuf;
    use std::time::Duration;

    fn web_job(url: &str) -> Job {
        Job::Web(WebPayload {
            corpus_name: url.to_string(),
            url: url.to_string(),
            hop_count: 0,
        })
    }

    fn directory_job(name: &str) -> Job {
        Job::Directory(DirectoryPayload {
            corpus_name: name.to_string(),
            path: PathBuf::from("/tmp").join(name),
            size: 0,
        })
    }

    #[tokio::test]
    async fn test_push_then_pop_preserves_fifo() {
        let router = Router::new(10);

        router.push(web_job("https://a.example/")).await;
        router.push(web_job("https://b.example/")).await;

        assert_eq!(router.queued(JobKind::Web), 2);
        assert_eq!(router.pop(JobKind::Web).await, Some(web_job("https://a.example/")));
        assert_eq!(router.pop(JobKind::Web).await, Some(web_job("https://b.example/")));
        assert_eq!(router.queued(JobKind::Web), 0);
    }

    #[tokio::test]
    async fn test_kinds_are_routed_separately() {
        let router = Router::new(10);

        router.push(directory_job("corpus_a")).await;
        router.push(web_job("https://a.example/")).await;

        assert_eq!(router.try_pop(JobKind::File).await, None);
        assert_eq!(router.try_pop(JobKind::Directory).await, Some(directory_job("corpus_a")));
        assert_eq!(router.try_pop(JobKind::Directory).await, None);
        assert_eq!(router.try_pop(JobKind::Web).await, Some(web_job("https://a.example/")));
    }

    #[tokio::test]
    async fn test_stream_registered_before_push_sees_jobs() {
        let router = Router::new(10);
        let stream = router.stream(JobKind::Directory);

        router.push(directory_job("corpus_a")).await;

        assert_eq!(stream.recv().await, Some(directory_job("corpus_a")));
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer() {
        let router = Arc::new(Router::new(1));
        router.push(web_job("https://a.example/")).await;

        let blocked = {
            let router = router.clone();
            tokio::spawn(async move { router.push(web_job("https://b.example/")).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(router.pop(JobKind::Web).await, Some(web_job("https://a.example/")));
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("producer should resume once space frees up")
            .unwrap();
        assert_eq!(router.pop(JobKind::Web).await, Some(web_job("https://b.example/")));
    }

    #[tokio::test]
    async fn test_cancelled_push_gives_up_on_full_queue() {
        let router = Arc::new(Router::new(1));
        let cancel = CancellationToken::new();
        assert!(router.push_or_cancel(web_job("https://a.example/"), &cancel).await);

        let blocked = {
            let router = router.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                router.push_or_cancel(web_job("https://b.example/"), &cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!blocked.is_finished());

        cancel.cancel();
        let queued = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(!queued);

        assert_eq!(router.pop(JobKind::Web).await, Some(web_job("https://a.example/")));
        assert!(!router.push_or_cancel(web_job("https://c.example/"), &cancel).await);
        assert_eq!(router.queued(JobKind::Web), 0);
    }

    #[tokio::test]
    async fn test_competing_readers_receive_each_job_once() {
        let router = Arc::new(Router::new(64));
        for i in 0..40 {
            router.push(directory_job(&format!("corpus_{}", i))).await;
        }

        let mut readers = Vec::new();
        for _ in 0..4 {
            let stream = router.stream(JobKind::Directory);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = stream.try_recv().await {
                    seen.push(job.corpus_name().to_string());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for reader in readers {
            all.extend(reader.await.unwrap());
        }
        assert_eq!(all.len(), 40);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 40);
    }
}
