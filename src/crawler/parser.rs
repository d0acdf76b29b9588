//! HTML link extraction

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts the links worth following from an HTML page
///
/// Links are absolute http(s) URLs without fragments, in document order,
/// deduplicated.
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">`
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` hrefs
/// - Fragment-only hrefs
/// - Anything that is not http(s) after resolution
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The URL the page was served from, for relative links
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    let mut keep = |href: &str| {
        if let Some(link) = resolve_link(href, base_url) {
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    };

    if let Ok(anchors) = Selector::parse("a[href]") {
        for element in document.select(&anchors) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                keep(href);
            }
        }
    }

    if let Ok(canonical) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical) {
            if let Some(href) = element.value().attr("href") {
                keep(href);
            }
        }
    }

    links
}

/// Resolves an href against the page URL
///
/// Returns `None` for hrefs that should not be followed.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    const SKIPPED_SCHEMES: [&str; 4] = ["javascript:", "mailto:", "tel:", "data:"];
    let lowered = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);

    Some(absolute.to_string())
}
