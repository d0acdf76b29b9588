use corpus_tally::config::{Config, DirectoryConfig, EngineConfig, FileConfig, WebConfig};
use corpus_tally::App;
use std::sync::Arc;

/// A configuration tuned for fast tests
pub fn test_config(keywords: &[&str], hop_count: u32) -> Config {
    Config {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        directory: DirectoryConfig {
            corpus_prefix: "corpus_".to_string(),
            sleep_time: 50,
        },
        file: FileConfig {
            scanning_size_limit: 16,
        },
        web: WebConfig {
            hop_count,
            url_refresh_time: 60_000,
            request_timeout: 5_000,
        },
        engine: EngineConfig {
            queue_capacity: 16,
            workers: 8,
            job_timeout: 5_000,
        },
    }
}

pub async fn started(config: Config) -> Arc<App> {
    let app = Arc::new(App::new(config).expect("app should build"));
    app.start().await;
    app
}
