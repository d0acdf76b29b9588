//! HTTP fetching for the web crawler

use crate::crawler::parser::extract_links;
use crate::TallyError;
use reqwest::Client;
use std::time::Duration;

/// A page fetched with a 2xx status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Raw response body, which keywords are counted in
    pub body: String,
    /// Outbound links, resolved against the URL after redirects
    pub links: Vec<String>,
}

/// Builds the shared HTTP client
///
/// # Arguments
///
/// * `timeout` - Whole-request timeout
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches `url` and extracts its links
///
/// Redirects are followed by the client. robots.txt is not consulted.
///
/// # Errors
///
/// * `Http` - the request or reading the body failed
/// * `HttpStatus` - the server answered with a non-2xx status
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage, TallyError> {
    let response = client.get(url).send().await.map_err(|e| TallyError::Http {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TallyError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let final_url = response.url().clone();
    let body = response.text().await.map_err(|e| TallyError::Http {
        url: url.to_string(),
        source: e,
    })?;

    let links = extract_links(&body, &final_url);
    tracing::debug!(
        "Fetched {} ({}, {} links)",
        final_url,
        status.as_u16(),
        links.len()
    );

    Ok(FetchedPage { body, links })
}
