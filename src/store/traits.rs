//! Unified `Database` trait — single async interface for all persistence.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DatabaseError;
use crate::model::{Issue, Source};

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: u64,
    pub read: u64,
    pub saved: u64,
    pub avg_importance: f64,
    pub active_sources: u64,
}

/// Backend-agnostic database trait covering sources and issues.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Sources ─────────────────────────────────────────────────────

    /// Upsert a source discovered by the detector during sync.
    ///
    /// On conflict only `sender_name`, `domain`, and `credibility_score`
    /// are refreshed — a user's `is_active`/`category` edits survive
    /// automatic re-detection.
    async fn upsert_source_detected(&self, source: &Source) -> Result<(), DatabaseError>;

    /// Upsert a source from an explicit user action (track/untrack).
    ///
    /// Unlike the detected variant, this applies `is_active` and
    /// `category` as given.
    async fn upsert_source_manual(&self, source: &Source) -> Result<(), DatabaseError>;

    /// Get a source by id.
    async fn get_source(&self, id: &str) -> Result<Option<Source>, DatabaseError>;

    /// List sources included in sync (active only).
    async fn list_active_sources(&self) -> Result<Vec<Source>, DatabaseError>;

    /// Lower-cased sender emails of all active sources.
    async fn tracked_sender_emails(&self) -> Result<Vec<String>, DatabaseError>;

    /// Flip a source's active flag (explicit user action).
    async fn set_source_active(&self, id: &str, is_active: bool) -> Result<(), DatabaseError>;

    /// Set a source's category (explicit user action).
    async fn set_source_category(&self, id: &str, category: &str) -> Result<(), DatabaseError>;

    // ── Issues ──────────────────────────────────────────────────────

    /// Insert or update an issue, keyed by its mailbox message id.
    ///
    /// A repeat upsert overwrites only the AI/scoring-derived fields;
    /// `is_read`/`is_saved` are user state and are left untouched.
    async fn upsert_issue(&self, issue: &Issue) -> Result<(), DatabaseError>;

    /// Which of the candidate ids are already stored.
    async fn existing_issue_ids(&self, ids: &[String]) -> Result<HashSet<String>, DatabaseError>;

    /// Get an issue by id.
    async fn get_issue(&self, id: &str) -> Result<Option<Issue>, DatabaseError>;

    /// List issues ordered by importance desc, then recency desc.
    async fn list_issues(&self, limit: u32, offset: u32) -> Result<Vec<Issue>, DatabaseError>;

    /// List saved issues, same ordering as `list_issues`.
    async fn list_saved_issues(&self) -> Result<Vec<Issue>, DatabaseError>;

    /// Issues containing the exact tag string, same ordering as `list_issues`.
    async fn list_issues_by_tag(&self, tag: &str) -> Result<Vec<Issue>, DatabaseError>;

    /// Mark an issue as read.
    async fn mark_read(&self, id: &str) -> Result<(), DatabaseError>;

    /// Flip an issue's saved flag.
    async fn toggle_saved(&self, id: &str) -> Result<(), DatabaseError>;

    /// Aggregate counts across the store.
    async fn stats(&self) -> Result<StoreStats, DatabaseError>;
}
