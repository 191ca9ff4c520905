//! Sync pipeline: candidate listing → dedup → fetch → classify →
//! enrich → idempotent upsert.
//!
//! A single message failing at any stage is skipped; the batch always
//! runs to completion and reports how many issues were stored.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use chrono::{DateTime, Utc};

use crate::detector;
use crate::enrich::Enricher;
use crate::error::{MailboxError, SyncError};
use crate::mailbox::Mailbox;
use crate::model::{ImportanceLevel, Issue, Source};
use crate::store::Database;

/// Dependencies injected into a sync run.
#[derive(Clone)]
pub struct SyncDeps {
    pub db: Arc<dyn Database>,
    pub mailbox: Arc<dyn Mailbox>,
    pub enricher: Arc<Enricher>,
}

/// Knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Mailbox search query.
    pub query: String,
    /// How many candidate ids to list from the mailbox.
    pub list_max: u32,
    /// Per-run cap on messages actually processed (bounds external-API cost).
    pub max_per_run: usize,
    /// In-flight enrichment fan-out across messages.
    pub concurrency: usize,
    /// Summarizer model id.
    pub model: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            query: "in:inbox".to_string(),
            list_max: 100,
            max_per_run: 50,
            concurrency: 4,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Candidate ids listed from the mailbox (after in-batch dedup).
    pub candidates: usize,
    /// Candidates skipped because they were already stored.
    pub skipped_existing: usize,
    /// Issues successfully enriched and persisted this run.
    pub synced: usize,
}

/// Run one sync pass over the mailbox.
pub async fn run_sync(deps: &SyncDeps, opts: &SyncOptions) -> Result<SyncReport, SyncError> {
    let ids = deps
        .mailbox
        .list_candidate_ids(&opts.query, opts.list_max)
        .await?;

    // Duplicate candidate ids must be collapsed before dispatch so the
    // same key is never written twice concurrently.
    let mut seen = HashSet::new();
    let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    let candidates = ids.len();

    let existing = deps.db.existing_issue_ids(&ids).await?;
    let skipped_existing = existing.len();
    let new_ids: Vec<String> = ids
        .into_iter()
        .filter(|id| !existing.contains(id))
        .take(opts.max_per_run)
        .collect();

    // Manually tracked senders are accepted even when the header
    // heuristics reject the message.
    let tracked: HashSet<String> = deps
        .db
        .tracked_sender_emails()
        .await?
        .into_iter()
        .collect();

    info!(
        candidates,
        new = new_ids.len(),
        "Sync started"
    );

    let synced = futures::stream::iter(new_ids)
        .map(|id| {
            let deps = deps.clone();
            let tracked = &tracked;
            let opts = opts;
            async move { process_message(&deps, opts, tracked, &id).await }
        })
        .buffer_unordered(opts.concurrency.max(1))
        .filter(|ok| futures::future::ready(*ok))
        .count()
        .await;

    info!(synced, "Sync finished");

    Ok(SyncReport {
        candidates,
        skipped_existing,
        synced,
    })
}

/// Fetch cap for the quick preview listing.
pub const PREVIEW_FETCH_MAX: usize = 20;

/// One classified message in the inbox preview. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: DateTime<Utc>,
}

/// Quick newsletter preview of the inbox, with nothing stored.
///
/// Lists up to `list_max` candidate ids, fetches the first
/// [`PREVIEW_FETCH_MAX`] concurrently, and returns the ones the detector
/// accepts. A message that cannot be fetched is skipped.
pub async fn preview_newsletters(
    mailbox: &dyn Mailbox,
    query: &str,
    list_max: u32,
) -> Result<Vec<MessagePreview>, MailboxError> {
    let ids = mailbox.list_candidate_ids(query, list_max).await?;

    let fetches = ids
        .iter()
        .take(PREVIEW_FETCH_MAX)
        .map(|id| mailbox.fetch_message(id));

    let mut previews = Vec::new();
    for result in futures::future::join_all(fetches).await {
        let Ok(msg) = result else { continue };
        if !detector::is_newsletter(&msg) {
            continue;
        }
        previews.push(MessagePreview {
            id: msg.id,
            subject: msg.subject,
            from: msg.from,
            date: msg.date,
        });
    }
    Ok(previews)
}

/// Process one candidate message end to end.
///
/// Returns true when an issue was stored. All failures are local: a
/// message that cannot be fetched or persisted is skipped, never retried
/// here and never persisted as a placeholder.
async fn process_message(
    deps: &SyncDeps,
    opts: &SyncOptions,
    tracked: &HashSet<String>,
    id: &str,
) -> bool {
    let msg = match deps.mailbox.fetch_message(id).await {
        Ok(msg) => msg,
        Err(e) => {
            debug!(id, error = %e, "Skipping unfetchable message");
            return false;
        }
    };

    let sender_email = detector::sender_email(&msg.from);
    let manually_tracked = tracked.contains(&sender_email);

    if !detector::is_newsletter(&msg) && !manually_tracked {
        return false;
    }

    let source = Source::detected(
        &sender_email,
        &detector::sender_display_name(&msg.from),
        &detector::sender_domain(&msg.from),
    );
    if let Err(e) = deps.db.upsert_source_detected(&source).await {
        warn!(id, error = %e, "Failed to upsert source — skipping message");
        return false;
    }

    let enrichment = deps
        .enricher
        .enrich(&msg.subject, &msg.cleaned_text, &opts.model)
        .await;

    let issue = Issue {
        id: msg.id,
        source_id: source.id,
        subject: msg.subject,
        received_at: msg.date,
        raw_html: msg.raw_html,
        cleaned_text: msg.cleaned_text,
        summary: enrichment.summary,
        key_points: enrichment.key_points,
        why_it_matters: enrichment.why_it_matters,
        category: enrichment.category,
        tags: enrichment.tags,
        importance_score: enrichment.importance_score,
        importance_level: ImportanceLevel::from_score(enrichment.importance_score),
        social_score: enrichment.social_score,
        is_read: false,
        is_saved: false,
    };

    match deps.db.upsert_issue(&issue).await {
        Ok(()) => {
            debug!(id = %issue.id, level = issue.importance_level.as_str(), "Issue stored");
            true
        }
        Err(e) => {
            warn!(id = %issue.id, error = %e, "Failed to store issue");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{BuzzScorer, Summarizer};
    use crate::error::{EnrichError, MailboxError};
    use crate::mailbox::{RawMessage, SenderInfo};
    use crate::model::{SocialScore, SummarizeResult};
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    struct StubMailbox {
        ids: Vec<String>,
        messages: HashMap<String, RawMessage>,
    }

    #[async_trait]
    impl Mailbox for StubMailbox {
        async fn list_candidate_ids(
            &self,
            _query: &str,
            max_results: u32,
        ) -> Result<Vec<String>, MailboxError> {
            Ok(self.ids.iter().take(max_results as usize).cloned().collect())
        }

        async fn fetch_message(&self, id: &str) -> Result<RawMessage, MailboxError> {
            self.messages
                .get(id)
                .cloned()
                .ok_or_else(|| MailboxError::NotFound(id.to_string()))
        }

        async fn list_senders(&self, _max_results: u32) -> Result<Vec<SenderInfo>, MailboxError> {
            Ok(Vec::new())
        }
    }

    struct StubSummarizer(f64);

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(
            &self,
            subject: &str,
            _content: &str,
            _model: &str,
        ) -> Result<SummarizeResult, EnrichError> {
            Ok(SummarizeResult {
                summary: format!("summary of {subject}"),
                key_points: vec!["point".into()],
                why_it_matters: "it matters".into(),
                category: "AI".into(),
                tags: vec!["ai".into()],
                importance_score: self.0,
            })
        }
    }

    struct StubBuzz;

    #[async_trait]
    impl BuzzScorer for StubBuzz {
        async fn score(&self, _title: &str) -> Result<SocialScore, EnrichError> {
            Ok(SocialScore::new(2, 1))
        }
    }

    fn newsletter(id: &str, from: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            subject: format!("Issue {id}"),
            from: from.to_string(),
            date: Utc::now(),
            raw_html: String::new(),
            cleaned_text: "content".to_string(),
            headers: HashMap::from([("list-id".to_string(), "x".to_string())]),
        }
    }

    fn plain_mail(id: &str, from: &str) -> RawMessage {
        RawMessage {
            headers: HashMap::new(),
            ..newsletter(id, from)
        }
    }

    async fn deps_with(mailbox: StubMailbox, score: f64) -> SyncDeps {
        SyncDeps {
            db: Arc::new(LibSqlBackend::new_memory().await.unwrap()),
            mailbox: Arc::new(mailbox),
            enricher: Arc::new(Enricher::new(
                Arc::new(StubSummarizer(score)),
                Arc::new(StubBuzz),
            )),
        }
    }

    #[tokio::test]
    async fn sync_stores_newsletter_with_derived_level() {
        let mailbox = StubMailbox {
            ids: vec!["m1".into()],
            messages: HashMap::from([(
                "m1".into(),
                newsletter("m1", "Weekly AI <digest@substack.com>"),
            )]),
        };
        let deps = deps_with(mailbox, 85.0).await;

        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.synced, 1);

        let issues = deps.db.list_issues(10, 0).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].importance_level, ImportanceLevel::High);
        assert!(!issues[0].is_read);
        assert!(!issues[0].is_saved);

        let sources = deps.db.list_active_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].sender_email, "digest@substack.com");
        assert_eq!(sources[0].domain, "substack.com");
    }

    #[tokio::test]
    async fn sync_skips_already_stored_ids() {
        let mailbox = StubMailbox {
            ids: vec!["1".into(), "2".into(), "3".into()],
            messages: HashMap::from([
                ("1".into(), newsletter("1", "a@substack.com")),
                ("2".into(), newsletter("2", "a@substack.com")),
                ("3".into(), newsletter("3", "a@substack.com")),
            ]),
        };
        let deps = deps_with(mailbox, 50.0).await;

        // First pass stores everything
        run_sync(
            &deps,
            &SyncOptions {
                list_max: 100,
                ..SyncOptions::default()
            },
        )
        .await
        .unwrap();

        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.candidates, 3);
        assert_eq!(report.skipped_existing, 3);
        assert_eq!(report.synced, 0);
    }

    #[tokio::test]
    async fn sync_processes_only_new_ids() {
        let mailbox = StubMailbox {
            ids: vec!["1".into(), "2".into(), "3".into()],
            messages: HashMap::from([
                ("1".into(), newsletter("1", "a@substack.com")),
                ("2".into(), newsletter("2", "a@substack.com")),
                ("3".into(), newsletter("3", "a@substack.com")),
            ]),
        };
        let deps = deps_with(mailbox, 50.0).await;

        // Seed issue 2 directly
        let two = newsletter("2", "a@substack.com");
        let source = Source::detected("a@substack.com", "a", "substack.com");
        deps.db.upsert_source_detected(&source).await.unwrap();
        deps.db
            .upsert_issue(&Issue {
                id: two.id.clone(),
                source_id: source.id.clone(),
                subject: two.subject.clone(),
                received_at: two.date,
                raw_html: String::new(),
                cleaned_text: String::new(),
                summary: String::new(),
                key_points: vec![],
                why_it_matters: String::new(),
                category: "Other".into(),
                tags: vec![],
                importance_score: 50.0,
                importance_level: ImportanceLevel::Medium,
                social_score: SocialScore::default(),
                is_read: false,
                is_saved: false,
            })
            .await
            .unwrap();

        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.synced, 2);
        assert_eq!(report.skipped_existing, 1);
    }

    #[tokio::test]
    async fn duplicate_candidate_ids_collapse() {
        let mailbox = StubMailbox {
            ids: vec!["1".into(), "1".into(), "1".into()],
            messages: HashMap::from([("1".into(), newsletter("1", "a@substack.com"))]),
        };
        let deps = deps_with(mailbox, 50.0).await;

        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn non_newsletter_is_rejected_unless_tracked() {
        let mailbox = StubMailbox {
            ids: vec!["1".into()],
            messages: HashMap::from([("1".into(), plain_mail("1", "Friend <friend@gmail.com>"))]),
        };
        let deps = deps_with(mailbox, 50.0).await;

        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.synced, 0);

        // Track the sender manually, then the same message is accepted
        deps.db
            .upsert_source_manual(&Source::detected("friend@gmail.com", "Friend", "gmail.com"))
            .await
            .unwrap();
        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn unfetchable_message_is_skipped_not_fatal() {
        let mailbox = StubMailbox {
            ids: vec!["gone".into(), "ok".into()],
            messages: HashMap::from([("ok".into(), newsletter("ok", "a@substack.com"))]),
        };
        let deps = deps_with(mailbox, 50.0).await;

        let report = run_sync(&deps, &SyncOptions::default()).await.unwrap();
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn preview_returns_only_newsletters() {
        let mailbox = StubMailbox {
            ids: vec!["1".into(), "2".into(), "3".into()],
            messages: HashMap::from([
                ("1".into(), newsletter("1", "a@substack.com")),
                ("2".into(), plain_mail("2", "Friend <friend@gmail.com>")),
                ("3".into(), newsletter("3", "b@beehiiv.com")),
            ]),
        };

        let previews = preview_newsletters(&mailbox, "in:inbox", 50).await.unwrap();
        let ids: Vec<&str> = previews.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(previews[0].subject, "Issue 1");
    }

    #[tokio::test]
    async fn preview_caps_fetches_and_skips_unfetchable() {
        let mut messages: HashMap<String, RawMessage> = (0..30)
            .map(|i| {
                let id = i.to_string();
                (id.clone(), newsletter(&id, "a@substack.com"))
            })
            .collect();
        // One id inside the cap has no fetchable message
        messages.remove("3");
        let mailbox = StubMailbox {
            ids: (0..30).map(|i| i.to_string()).collect(),
            messages,
        };

        let previews = preview_newsletters(&mailbox, "in:inbox", 50).await.unwrap();
        assert_eq!(previews.len(), PREVIEW_FETCH_MAX - 1);
        assert!(!previews.iter().any(|p| p.id == "3"));
        assert!(!previews.iter().any(|p| p.id == "25"));
    }

    #[tokio::test]
    async fn per_run_cap_bounds_processing() {
        let messages: HashMap<String, RawMessage> = (0..5)
            .map(|i| {
                let id = i.to_string();
                (id.clone(), newsletter(&id, "a@substack.com"))
            })
            .collect();
        let mailbox = StubMailbox {
            ids: (0..5).map(|i| i.to_string()).collect(),
            messages,
        };
        let deps = deps_with(mailbox, 50.0).await;

        let opts = SyncOptions {
            max_per_run: 2,
            ..SyncOptions::default()
        };
        let report = run_sync(&deps, &opts).await.unwrap();
        assert_eq!(report.synced, 2);
    }
}
