//! Result aggregation
//!
//! - `Summary`: completion-tracked keyword counts for one corpus
//! - `Aggregator`: per-kind summary tables plus the merge loop

mod aggregator;
mod summary;

pub use aggregator::Aggregator;
pub use summary::Summary;

use crate::dispatcher::JobKind;
use std::collections::BTreeMap;

/// Keyword to occurrence count
pub type Counts = BTreeMap<String, i64>;

/// Counts produced by one finished part of a corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResults {
    pub kind: JobKind,
    pub corpus_name: String,
    pub counts: Counts,
}
