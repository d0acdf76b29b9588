use crate::result::Counts;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{watch, Mutex};

/// Completion-tracked keyword counts for one corpus
///
/// `remaining` counts the parts that still have to report. Every merge
/// decrements it; reaching zero flips the completion flag that blocking
/// readers wait on.
#[derive(Debug)]
pub struct Summary {
    remaining: AtomicI64,
    completed: watch::Sender<bool>,
    counts: Mutex<Counts>,
    ttl: Option<DateTime<Utc>>,
}

impl Summary {
    /// Creates a summary expecting `expected_parts` reports
    pub fn new(expected_parts: i64, ttl: Option<DateTime<Utc>>) -> Self {
        let (completed, _) = watch::channel(expected_parts <= 0);
        Self {
            remaining: AtomicI64::new(expected_parts),
            completed,
            counts: Mutex::new(Counts::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<DateTime<Utc>> {
        self.ttl
    }

    pub fn remaining_parts(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_parts() <= 0
    }

    /// True once the TTL is set and has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= now)
    }

    /// Whether re-initializing this corpus must be refused
    ///
    /// A summary with a TTL stays live until the TTL passes. One without a TTL
    /// stays live only while parts are still outstanding.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => ttl > now,
            None => !self.is_complete(),
        }
    }

    /// Adds one part's counts and marks that part as reported
    pub async fn merge(&self, part: &Counts) {
        {
            let mut counts = self.counts.lock().await;
            for (keyword, count) in part {
                *counts.entry(keyword.clone()).or_insert(0) += count;
            }
        }

        let left = self.remaining.fetch_sub(1, Ordering::AcqRel) - 1;
        if left == 0 {
            self.completed.send_replace(true);
        } else if left < 0 {
            tracing::warn!("Summary received more parts than expected ({} left)", left);
        }
    }

    /// Registers one more part that has to report before completion
    pub fn add_part(&self) {
        if self.remaining.fetch_add(1, Ordering::AcqRel) == 0 {
            self.completed.send_replace(false);
        }
    }

    /// Waits until every part reported, then returns the counts
    pub async fn wait_results(&self) -> Counts {
        let mut completed = self.completed.subscribe();
        // The sender lives as long as `self`, so this only returns on completion
        let _ = completed.wait_for(|done| *done).await;
        self.counts.lock().await.clone()
    }

    /// Returns the counts if every part reported, `None` otherwise
    pub async fn query_results(&self) -> Option<Counts> {
        if !self.is_complete() {
            return None;
        }
        Some(self.counts.lock().await.clone())
    }
}
