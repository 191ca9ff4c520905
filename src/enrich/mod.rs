//! Enrichment orchestrator — fans out the summarization and buzz-scoring
//! calls per message and joins them with default substitution on failure.

pub mod buzz;
pub mod summarizer;

pub use buzz::{BuzzScorer, WebBuzzScorer};
pub use summarizer::{OpenAiSummarizer, Summarizer};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::model::{DEFAULT_CATEGORY, ImportanceLevel, SocialScore, SummarizeResult, dedup_tags};

/// Default per-collaborator-call timeout.
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Joined enrichment output for one message. Always fully populated —
/// collaborator failures were already replaced with defaults.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub summary: String,
    pub key_points: Vec<String>,
    pub why_it_matters: String,
    pub category: String,
    pub tags: Vec<String>,
    pub importance_score: f64,
    pub importance_level: ImportanceLevel,
    pub social_score: SocialScore,
}

/// Runs both collaborator calls concurrently, each under its own timeout.
pub struct Enricher {
    summarizer: Arc<dyn Summarizer>,
    buzz: Arc<dyn BuzzScorer>,
    call_timeout: Duration,
}

impl Enricher {
    pub fn new(summarizer: Arc<dyn Summarizer>, buzz: Arc<dyn BuzzScorer>) -> Self {
        Self {
            summarizer,
            buzz,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Enrich one message. Never fails: a collaborator error or timeout is
    /// replaced by the documented defaults for that collaborator only.
    pub async fn enrich(&self, subject: &str, content: &str, model: &str) -> Enrichment {
        let summarize = tokio::time::timeout(
            self.call_timeout,
            self.summarizer.summarize(subject, content, model),
        );
        let score = tokio::time::timeout(self.call_timeout, self.buzz.score(subject));

        // Both calls run to completion (or timeout) before anything is
        // persisted downstream; partial in-flight results never escape.
        let (ai, social) = tokio::join!(summarize, score);

        let ai: Option<SummarizeResult> = match ai {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => {
                warn!(subject, error = %e, "Summarization failed — using defaults");
                None
            }
            Err(_) => {
                warn!(subject, timeout = ?self.call_timeout, "Summarization timed out");
                None
            }
        };

        let social_score = match social {
            Ok(Ok(score)) => score,
            Ok(Err(e)) => {
                warn!(subject, error = %e, "Buzz scoring failed — using defaults");
                SocialScore::default()
            }
            Err(_) => {
                warn!(subject, timeout = ?self.call_timeout, "Buzz scoring timed out");
                SocialScore::default()
            }
        };

        // SummarizeResult::default() carries the documented AI defaults:
        // empty text fields, category "Other", importance 50.
        let ai = ai.unwrap_or_default();
        let category = if ai.category.trim().is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            ai.category
        };

        Enrichment {
            summary: ai.summary,
            key_points: ai.key_points,
            why_it_matters: ai.why_it_matters,
            category,
            tags: dedup_tags(ai.tags),
            importance_score: ai.importance_score,
            importance_level: ImportanceLevel::from_score(ai.importance_score),
            social_score,
        }
    }
}
