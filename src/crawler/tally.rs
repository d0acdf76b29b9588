use crate::result::Counts;
use std::sync::Arc;

/// Counts a fixed keyword set in text
///
/// Matching is exact and case-sensitive on whitespace-delimited tokens, so
/// `alpha,` or `Alpha` do not count towards `alpha`.
#[derive(Debug, Clone)]
pub struct KeywordTally {
    keywords: Arc<[String]>,
}

impl KeywordTally {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().cloned().collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Every keyword mapped to zero
    pub fn zeroed(&self) -> Counts {
        self.keywords.iter().map(|k| (k.clone(), 0)).collect()
    }

    /// Adds the keyword occurrences in `text` to `counts`
    pub fn count_into(&self, text: &str, counts: &mut Counts) {
        for token in text.split_whitespace() {
            if let Some(count) = counts.get_mut(token) {
                *count += 1;
            } else if self.keywords.iter().any(|k| k == token) {
                counts.insert(token.to_string(), 1);
            }
        }
    }

    /// Counts the keywords in `text`, starting from zero
    pub fn count(&self, text: &str) -> Counts {
        let mut counts = self.zeroed();
        self.count_into(text, &mut counts);
        counts
    }
}
