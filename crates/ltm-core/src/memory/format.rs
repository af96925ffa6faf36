//! ============================================================================
//! Result Formatter - Search hits to prompt-ready recall strings
//! ============================================================================
//! Recall drops the nearest hit, summaries keep it. Both passes keep only the
//! first occurrence of each comment and reduce timestamps to the day.
//! ============================================================================

use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::types::{RecallResult, ScoredRecord, DATE_FORMAT};

/// Leading hits recall throws away before formatting.
///
/// Recall searches for `ltm_limit + RECALL_DISCARDED_HITS` neighbours and
/// treats the nearest one as a self-match.
pub const RECALL_DISCARDED_HITS: usize = 1;

/// Deduplicates and formats search hits
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultFormatter {
    verbose: bool,
}

impl ResultFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Semantic recall: skip the top hit, at most `limit` distinct comments
    pub fn recall(&self, hits: &[ScoredRecord], limit: usize) -> Vec<RecallResult> {
        self.format(hits, RECALL_DISCARDED_HITS, Some(limit), |_| true)
    }

    /// Recency pass: every distinct comment dated within `window` before `now`
    pub fn summaries(
        &self,
        hits: &[ScoredRecord],
        now: NaiveDateTime,
        window: Duration,
    ) -> Vec<RecallResult> {
        self.format(hits, 0, None, |when| now - *when <= window)
    }

    fn format<F>(
        &self,
        hits: &[ScoredRecord],
        skip: usize,
        limit: Option<usize>,
        keep: F,
    ) -> Vec<RecallResult>
    where
        F: Fn(&NaiveDateTime) -> bool,
    {
        let mut results = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for hit in hits.iter().skip(skip) {
            if limit.is_some_and(|l| results.len() >= l) {
                break;
            }

            let comment = hit.doc.comment.as_str();
            if !seen.insert(comment) {
                if self.verbose {
                    debug!("Not adding duplicate memory: {}", comment);
                }
                continue;
            }

            let when = match hit.doc.parsed_datetime() {
                Ok(when) => when,
                Err(e) => {
                    warn!("Skipping memory {}: {}", hit.id, e);
                    continue;
                }
            };

            if !keep(&when) {
                continue;
            }

            if self.verbose {
                debug!("Adding memory {} (score {:.4})", hit.id, hit.score);
            }
            results.push(RecallResult {
                comment: comment.to_string(),
                date: when.format(DATE_FORMAT).to_string(),
            });
        }

        results
    }
}
