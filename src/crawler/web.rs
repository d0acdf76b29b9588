//! Web crawler
//!
//! A web corpus is a seed URL plus every page reached from it within the hop
//! budget. Each fetched page is one part of the corpus. Pages already tracked
//! in the web summary table and not yet expired are not fetched again, which
//! makes that table the crawler's URL cache.

use crate::crawler::{fetch_page, KeywordTally};
use crate::dispatcher::{Job, JobKind, JobStream, Router, WebPayload};
use crate::pool::WorkerPool;
use crate::result::{Aggregator, Counts, PartResults};
use crate::runner::Runner;
use crate::TallyError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

/// Fetches, expands and counts single pages
struct WebWorker {
    router: Arc<Router>,
    aggregator: Arc<Aggregator>,
    client: Client,
    tally: KeywordTally,
    url_refresh_time: Duration,
    shutdown: CancellationToken,
}

impl WebWorker {
    fn expiry(&self) -> DateTime<Utc> {
        expiry_after(self.url_refresh_time)
    }

    async fn visit(&self, page: WebPayload) {
        let counts = match fetch_page(&self.client, &page.url).await {
            Ok(fetched) => {
                if page.hop_count > 0 {
                    self.follow_links(&page, &fetched.links).await;
                }
                self.tally.count(&fetched.body)
            }
            Err(e) => {
                tracing::warn!("Fetching {} failed: {}", page.url, e);
                self.tally.zeroed()
            }
        };

        self.report(page, counts).await;
    }

    /// Queues every link not tracked yet, one hop closer to the budget's end
    ///
    /// Each queued link becomes a pending part of the page's corpus before the
    /// page itself reports, so the corpus cannot complete early. Once the
    /// crawler stops, no more links are followed and a link whose push was
    /// cancelled reports an empty part in place of its visit.
    async fn follow_links(&self, page: &WebPayload, links: &[String]) {
        let mut queued = 0;
        for link in links {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self
                .aggregator
                .initialize_summary(JobKind::Web, link, 1, Some(self.expiry()))
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::trace!("{} already tracked", link);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Cannot track {}: {}", link, e);
                    continue;
                }
            }

            if let Err(e) = self
                .aggregator
                .increment_result_count(JobKind::Web, &page.corpus_name)
            {
                tracing::warn!("Corpus {} vanished, not following {}: {}", page.corpus_name, link, e);
                continue;
            }

            let next = WebPayload {
                corpus_name: page.corpus_name.clone(),
                url: link.clone(),
                hop_count: page.hop_count - 1,
            };
            if !self
                .router
                .push_or_cancel(next.clone().into(), &self.shutdown)
                .await
            {
                self.report(next, self.tally.zeroed()).await;
                break;
            }
            queued += 1;
        }

        tracing::debug!(
            "{}: queued {} of {} links ({} hops left)",
            page.url,
            queued,
            links.len(),
            page.hop_count - 1
        );
    }

    /// Reports one page to its corpus, and to its own entry unless it is the seed
    async fn report(&self, page: WebPayload, counts: Counts) {
        if page.url != page.corpus_name {
            self.aggregator
                .update_summary(PartResults {
                    kind: JobKind::Web,
                    corpus_name: page.url,
                    counts: counts.clone(),
                })
                .await;
        }

        self.aggregator
            .update_summary(PartResults {
                kind: JobKind::Web,
                corpus_name: page.corpus_name,
                counts,
            })
            .await;
    }
}

pub struct WebCrawler {
    router: Arc<Router>,
    aggregator: Arc<Aggregator>,
    worker: Arc<WebWorker>,
    hop_count: u32,
    url_refresh_time: Duration,
    pool: Arc<WorkerPool<WebPayload, ()>>,
    job_timeout: Duration,
    shutdown: CancellationToken,
    span: tracing::Span,
}

impl WebCrawler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<Router>,
        aggregator: Arc<Aggregator>,
        client: Client,
        tally: KeywordTally,
        hop_count: u32,
        url_refresh_time: Duration,
        workers: usize,
        job_timeout: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let worker = Arc::new(WebWorker {
            router: router.clone(),
            aggregator: aggregator.clone(),
            client,
            tally,
            url_refresh_time,
            shutdown: shutdown.clone(),
        });
        let pool = {
            let worker = worker.clone();
            WorkerPool::new("web", workers, move |page: WebPayload| {
                let worker = worker.clone();
                async move { worker.visit(page).await }
            })
        };

        Self {
            router,
            aggregator,
            worker,
            hop_count,
            url_refresh_time,
            pool: Arc::new(pool),
            job_timeout,
            shutdown,
            span: tracing::info_span!("web_crawler"),
        }
    }

    /// Starts a web corpus rooted at `url`
    ///
    /// The URL is normalized and becomes the corpus name. Returns `false`
    /// without queueing anything when the URL is already tracked and live.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` - `url` is not an absolute http(s) URL
    pub async fn add_web_page(&self, url: &str) -> Result<bool, TallyError> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| TallyError::InvalidInput(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TallyError::InvalidInput(format!(
                "{}: only http and https are crawled",
                url
            )));
        }
        let corpus = parsed.to_string();

        let created = self.aggregator.initialize_summary(
            JobKind::Web,
            &corpus,
            1,
            Some(expiry_after(self.url_refresh_time)),
        )?;
        if !created {
            tracing::info!("{} is already being crawled", corpus);
            return Ok(false);
        }

        tracing::info!("Crawling {} ({} hops)", corpus, self.hop_count);
        self.router
            .push(
                WebPayload {
                    corpus_name: corpus.clone(),
                    url: corpus,
                    hop_count: self.hop_count,
                }
                .into(),
            )
            .await;
        Ok(true)
    }

    fn dispatch(&self, job: Job) {
        let page = match job {
            Job::Web(page) => page,
            other => unreachable!("web stream yielded a {} job", other.kind()),
        };

        let pool = self.pool.clone();
        let worker = self.worker.clone();
        let timeout = self.job_timeout;
        tokio::spawn(
            async move {
                let Err(e) = pool.submit(page.clone(), timeout).await else {
                    return;
                };
                match e {
                    TallyError::PoolDisabled(_) => {
                        tracing::debug!("Web pool disabled, {} not fetched", page.url);
                    }
                    ref e => tracing::warn!("Visiting {} failed: {}", page.url, e),
                }
                // a run that never finished reports an empty part in its place
                if e.is_unfinished_run() {
                    worker.report(page, worker.tally.zeroed()).await;
                }
            }
            .in_current_span(),
        );
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("Web crawler started");
        let stream: JobStream = self.router.stream(JobKind::Web);

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
        tracing::info!("Web crawler stopped");
    }
}

impl Runner for WebCrawler {
    fn start(self: Arc<Self>) -> JoinHandle<()> {
        let span = self.span.clone();
        tokio::spawn(self.run().instrument(span))
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }
}

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
    Utc::now() + ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::build_http_client;

    fn crawler(hop_count: u32) -> (Arc<Router>, Arc<Aggregator>, WebCrawler) {
        let router = Arc::new(Router::new(16));
        let aggregator = Arc::new(Aggregator::new(16, 4, Duration::from_secs(5)));
        let crawler = WebCrawler::new(
            router.clone(),
            aggregator.clone(),
            build_http_client(Duration::from_secs(5)).unwrap(),
            KeywordTally::new(&["alpha".to_string()]),
            hop_count,
            Duration::from_secs(60),
            4,
            Duration::from_secs(5),
        );
        (router, aggregator, crawler)
    }

    #[tokio::test]
    async fn test_add_web_page_queues_seed_once() {
        let (router, _aggregator, crawler) = crawler(2);

        assert!(crawler.add_web_page("https://example.com").await.unwrap());
        assert!(!crawler.add_web_page("https://example.com/").await.unwrap());

        let job = router.try_pop(JobKind::Web).await.unwrap();
        assert_eq!(
            job,
            Job::Web(WebPayload {
                corpus_name: "https://example.com/".to_string(),
                url: "https://example.com/".to_string(),
                hop_count: 2,
            })
        );
        assert_eq!(router.try_pop(JobKind::Web).await, None);
    }

    #[tokio::test]
    async fn test_add_web_page_rejects_bad_urls() {
        let (router, _aggregator, crawler) = crawler(1);

        for url in ["not a url", "/relative/path", "ftp://example.com/file"] {
            let result = crawler.add_web_page(url).await;
            assert!(
                matches!(result, Err(TallyError::InvalidInput(_))),
                "{} should be rejected",
                url
            );
        }
        assert_eq!(router.queued(JobKind::Web), 0);
    }

    #[tokio::test]
    async fn test_expired_seed_can_be_added_again() {
        let (router, aggregator, crawler) = crawler(0);
        aggregator
            .initialize_summary(
                JobKind::Web,
                "https://example.com/",
                1,
                Some(Utc::now() - chrono::Duration::seconds(1)),
            )
            .unwrap();

        assert!(crawler.add_web_page("https://example.com/").await.unwrap());
        assert_eq!(router.queued(JobKind::Web), 1);
    }

    #[tokio::test]
    async fn test_stop_mid_crawl_does_not_hang() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let links: String = (0..5)
            .map(|i| format!(r#"<a href="/page{}">{}</a> "#, i, i))
            .collect();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<p> alpha </p> {}", links))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let router = Arc::new(Router::new(1));
        let aggregator = Arc::new(Aggregator::new(16, 4, Duration::from_secs(5)));
        let crawler = Arc::new(WebCrawler::new(
            router.clone(),
            aggregator.clone(),
            build_http_client(Duration::from_secs(5)).unwrap(),
            KeywordTally::new(&["alpha".to_string()]),
            1,
            Duration::from_secs(60),
            4,
            Duration::from_secs(5),
        ));
        let aggregator_handle = aggregator.clone().start();
        let handle = crawler.clone().start();

        let seed = format!("{}/", server.uri());
        assert!(crawler.add_web_page(&seed).await.unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;
        crawler.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("crawler should stop while pages are in flight")
            .unwrap();

        // the seed finished its visit, and no link was left pending
        let counts = tokio::time::timeout(
            Duration::from_secs(5),
            aggregator.get_summary(JobKind::Web, &seed),
        )
        .await
        .expect("seed corpus should complete")
        .unwrap();
        assert_eq!(counts["alpha"], 1);

        aggregator.stop();
        aggregator_handle.await.unwrap();
    }

    #[test]
    fn test_expiry_is_in_the_future() {
        let before = Utc::now();
        assert!(expiry_after(Duration::from_secs(60)) > before);
        assert!(expiry_after(Duration::MAX) > before);
    }
}
