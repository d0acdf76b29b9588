//! Crawlers feeding the aggregator
//!
//! - `DirectoryCrawler`: watches roots and emits directory jobs
//! - `FileCrawler`: counts keywords in directory corpora, batch by batch
//! - `WebCrawler`: fetches pages, follows links within a hop budget
//!
//! Every crawler runs its loop as a `Runner` and owns its worker pool.

mod directory;
mod fetcher;
mod file;
mod parser;
mod tally;
mod web;

pub use directory::DirectoryCrawler;
pub use fetcher::{build_http_client, fetch_page, FetchedPage};
pub use file::{enumerate_files, plan_batches, FileBatch, FileCrawler};
pub use parser::extract_links;
pub use tally::KeywordTally;
pub use web::WebCrawler;
