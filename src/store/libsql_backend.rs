//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All list/struct fields
//! (key_points, tags, social_score) are stored as JSON text columns and
//! (de)serialized through serde on every read and write.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::model::{ImportanceLevel, Issue, SocialScore, Source};
use crate::store::migrations;
use crate::store::traits::{Database, StoreStats};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

const ISSUE_COLUMNS: &str = "id, source_id, subject, received_at, raw_html, cleaned_text, \
     summary, key_points, why_it_matters, category, tags, \
     importance_score, importance_level, social_score, is_read, is_saved";

const SOURCE_COLUMNS: &str =
    "id, sender_email, sender_name, domain, category, credibility_score, is_active, created_at";

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_issues(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Issue>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut issues = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            issues.push(row_to_issue(&row)?);
        }
        Ok(issues)
    }

    async fn query_sources(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Source>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut sources = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            sources.push(row_to_source(&row)?);
        }
        Ok(sources)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql row to an Issue. Column order matches ISSUE_COLUMNS.
fn row_to_issue(row: &libsql::Row) -> Result<Issue, DatabaseError> {
    let map_err = |e: libsql::Error| DatabaseError::Query(e.to_string());

    let key_points_json: String = row.get(7).map_err(map_err)?;
    let tags_json: String = row.get(10).map_err(map_err)?;
    let social_json: String = row.get(13).map_err(map_err)?;

    let key_points: Vec<String> = serde_json::from_str(&key_points_json)
        .map_err(|e| DatabaseError::Serialization(format!("key_points: {e}")))?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| DatabaseError::Serialization(format!("tags: {e}")))?;
    let social_score: SocialScore = serde_json::from_str(&social_json)
        .map_err(|e| DatabaseError::Serialization(format!("social_score: {e}")))?;

    let received_str: String = row.get(3).map_err(map_err)?;
    let level_str: String = row.get(12).map_err(map_err)?;

    Ok(Issue {
        id: row.get(0).map_err(map_err)?,
        source_id: row.get(1).map_err(map_err)?,
        subject: row.get(2).map_err(map_err)?,
        received_at: parse_datetime(&received_str),
        raw_html: row.get(4).map_err(map_err)?,
        cleaned_text: row.get(5).map_err(map_err)?,
        summary: row.get(6).map_err(map_err)?,
        key_points,
        why_it_matters: row.get(8).map_err(map_err)?,
        category: row.get(9).map_err(map_err)?,
        tags,
        importance_score: row.get::<f64>(11).map_err(map_err)?,
        importance_level: level_str.parse().unwrap_or(ImportanceLevel::Medium),
        social_score,
        is_read: row.get::<i64>(14).map_err(map_err)? != 0,
        is_saved: row.get::<i64>(15).map_err(map_err)? != 0,
    })
}

/// Map a libsql row to a Source. Column order matches SOURCE_COLUMNS.
fn row_to_source(row: &libsql::Row) -> Result<Source, DatabaseError> {
    let map_err = |e: libsql::Error| DatabaseError::Query(e.to_string());

    let created_str: String = row.get(7).map_err(map_err)?;

    Ok(Source {
        id: row.get(0).map_err(map_err)?,
        sender_email: row.get(1).map_err(map_err)?,
        sender_name: row.get(2).map_err(map_err)?,
        domain: row.get(3).map_err(map_err)?,
        category: row.get(4).map_err(map_err)?,
        credibility_score: row.get::<f64>(5).map_err(map_err)?,
        is_active: row.get::<i64>(6).map_err(map_err)? != 0,
        created_at: parse_datetime(&created_str),
    })
}

fn to_json<T: serde::Serialize>(value: &T, field: &str) -> Result<String, DatabaseError> {
    serde_json::to_string(value)
        .map_err(|e| DatabaseError::Serialization(format!("{field}: {e}")))
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sources ─────────────────────────────────────────────────────

    async fn upsert_source_detected(&self, source: &Source) -> Result<(), DatabaseError> {
        // Heuristic re-detection must not revert a user's manual
        // is_active/category edits, so those columns are not in the
        // conflict update.
        self.conn()
            .execute(
                "INSERT INTO sources (id, sender_email, sender_name, domain, category, \
                         credibility_score, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     sender_name = excluded.sender_name,
                     domain = excluded.domain,
                     credibility_score = excluded.credibility_score",
                params![
                    source.id.as_str(),
                    source.sender_email.as_str(),
                    source.sender_name.as_str(),
                    source.domain.as_str(),
                    source.category.as_str(),
                    source.credibility_score,
                    source.is_active as i64,
                    source.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn upsert_source_manual(&self, source: &Source) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sources (id, sender_email, sender_name, domain, category, \
                         credibility_score, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     sender_name = excluded.sender_name,
                     domain = excluded.domain,
                     category = excluded.category,
                     credibility_score = excluded.credibility_score,
                     is_active = excluded.is_active",
                params![
                    source.id.as_str(),
                    source.sender_email.as_str(),
                    source.sender_name.as_str(),
                    source.domain.as_str(),
                    source.category.as_str(),
                    source.credibility_score,
                    source.is_active as i64,
                    source.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>, DatabaseError> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1");
        Ok(self.query_sources(&sql, params![id]).await?.into_iter().next())
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>, DatabaseError> {
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = 1 ORDER BY sender_name"
        );
        self.query_sources(&sql, ()).await
    }

    async fn tracked_sender_emails(&self) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT sender_email FROM sources WHERE is_active = 1", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut emails = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let email: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            emails.push(email.to_lowercase());
        }
        Ok(emails)
    }

    async fn set_source_active(&self, id: &str, is_active: bool) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sources SET is_active = ?1 WHERE id = ?2",
                params![is_active as i64, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "source".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    async fn set_source_category(&self, id: &str, category: &str) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sources SET category = ?1 WHERE id = ?2",
                params![category, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "source".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    // ── Issues ──────────────────────────────────────────────────────

    async fn upsert_issue(&self, issue: &Issue) -> Result<(), DatabaseError> {
        let key_points = to_json(&issue.key_points, "key_points")?;
        let tags = to_json(&issue.tags, "tags")?;
        let social_score = to_json(&issue.social_score, "social_score")?;

        // Atomic insert-or-update: re-sync refreshes derived fields only,
        // never the is_read/is_saved user state.
        self.conn()
            .execute(
                "INSERT INTO issues (id, source_id, subject, received_at, raw_html, \
                         cleaned_text, summary, key_points, why_it_matters, category, tags, \
                         importance_score, importance_level, social_score, is_read, is_saved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(id) DO UPDATE SET
                     summary = excluded.summary,
                     key_points = excluded.key_points,
                     why_it_matters = excluded.why_it_matters,
                     category = excluded.category,
                     tags = excluded.tags,
                     importance_score = excluded.importance_score,
                     importance_level = excluded.importance_level,
                     social_score = excluded.social_score",
                params![
                    issue.id.as_str(),
                    issue.source_id.as_str(),
                    issue.subject.as_str(),
                    issue.received_at.to_rfc3339(),
                    issue.raw_html.as_str(),
                    issue.cleaned_text.as_str(),
                    issue.summary.as_str(),
                    key_points,
                    issue.why_it_matters.as_str(),
                    issue.category.as_str(),
                    tags,
                    issue.importance_score,
                    issue.importance_level.as_str(),
                    social_score,
                    issue.is_read as i64,
                    issue.is_saved as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn existing_issue_ids(&self, ids: &[String]) -> Result<HashSet<String>, DatabaseError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let candidates: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut rows = self
            .conn()
            .query("SELECT id FROM issues", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut present = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if candidates.contains(id.as_str()) {
                present.insert(id);
            }
        }
        Ok(present)
    }

    async fn get_issue(&self, id: &str) -> Result<Option<Issue>, DatabaseError> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
        Ok(self.query_issues(&sql, params![id]).await?.into_iter().next())
    }

    async fn list_issues(&self, limit: u32, offset: u32) -> Result<Vec<Issue>, DatabaseError> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues \
             ORDER BY importance_score DESC, received_at DESC LIMIT ?1 OFFSET ?2"
        );
        self.query_issues(&sql, params![limit as i64, offset as i64])
            .await
    }

    async fn list_saved_issues(&self) -> Result<Vec<Issue>, DatabaseError> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE is_saved = 1 \
             ORDER BY importance_score DESC, received_at DESC"
        );
        self.query_issues(&sql, ()).await
    }

    async fn list_issues_by_tag(&self, tag: &str) -> Result<Vec<Issue>, DatabaseError> {
        let cols: String = ISSUE_COLUMNS
            .split(", ")
            .map(|c| format!("i.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT {cols} FROM issues i, json_each(i.tags) je \
             WHERE je.value = ?1 \
             ORDER BY i.importance_score DESC, i.received_at DESC"
        );
        self.query_issues(&sql, params![tag]).await
    }

    async fn mark_read(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("UPDATE issues SET is_read = 1 WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn toggle_saved(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE issues SET is_saved = CASE WHEN is_saved = 1 THEN 0 ELSE 1 END \
                 WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*), COALESCE(SUM(is_read), 0), COALESCE(SUM(is_saved), 0), \
                        ROUND(COALESCE(AVG(importance_score), 0), 1) \
                 FROM issues",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .ok_or_else(|| DatabaseError::Query("stats query returned no row".into()))?;

        let map_err = |e: libsql::Error| DatabaseError::Query(e.to_string());
        let total = row.get::<i64>(0).map_err(map_err)? as u64;
        let read = row.get::<i64>(1).map_err(map_err)? as u64;
        let saved = row.get::<i64>(2).map_err(map_err)? as u64;
        let avg_importance = row.get::<f64>(3).map_err(map_err)?;

        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM sources WHERE is_active = 1", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        let active_sources = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .ok_or_else(|| DatabaseError::Query("source count returned no row".into()))?
            .get::<i64>(0)
            .map_err(map_err)? as u64;

        Ok(StoreStats {
            total,
            read,
            saved,
            avg_importance,
            active_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SocialScore;
    use chrono::TimeZone;

    fn sample_issue(id: &str, score: f64) -> Issue {
        Issue {
            id: id.to_string(),
            source_id: "src_test".to_string(),
            subject: format!("Subject {id}"),
            received_at: Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap(),
            raw_html: "<p>body</p>".to_string(),
            cleaned_text: "body".to_string(),
            summary: "summary".to_string(),
            key_points: vec!["kp1".to_string(), "kp2".to_string()],
            why_it_matters: "matters".to_string(),
            category: "AI".to_string(),
            tags: vec!["ai".to_string(), "ml".to_string()],
            importance_score: score,
            importance_level: ImportanceLevel::from_score(score),
            social_score: SocialScore::new(3, 4),
            is_read: false,
            is_saved: false,
        }
    }

    fn sample_source(email: &str) -> Source {
        Source::detected(email, "Test Sender", "example.com")
    }

    async fn backend() -> LibSqlBackend {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_source_detected(&Source {
            id: "src_test".into(),
            ..sample_source("test@example.com")
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn issue_roundtrip_preserves_json_fields() {
        let db = backend().await;
        db.upsert_issue(&sample_issue("i1", 85.0)).await.unwrap();

        let got = db.get_issue("i1").await.unwrap().unwrap();
        assert_eq!(got.key_points, vec!["kp1", "kp2"]);
        assert_eq!(got.tags, vec!["ai", "ml"]);
        assert_eq!(got.social_score, SocialScore::new(3, 4));
        assert_eq!(got.importance_level, ImportanceLevel::High);
        assert_eq!(
            got.received_at,
            Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn issue_upsert_preserves_user_flags() {
        let db = backend().await;
        db.upsert_issue(&sample_issue("i1", 60.0)).await.unwrap();
        db.mark_read("i1").await.unwrap();
        db.toggle_saved("i1").await.unwrap();

        // Re-sync with new AI fields must not reset user state
        let mut updated = sample_issue("i1", 90.0);
        updated.summary = "new summary".to_string();
        updated.tags = vec!["fresh".to_string()];
        db.upsert_issue(&updated).await.unwrap();

        let got = db.get_issue("i1").await.unwrap().unwrap();
        assert!(got.is_read);
        assert!(got.is_saved);
        assert_eq!(got.summary, "new summary");
        assert_eq!(got.tags, vec!["fresh"]);
        assert_eq!(got.importance_score, 90.0);
        assert_eq!(got.importance_level, ImportanceLevel::High);
    }

    #[tokio::test]
    async fn toggle_saved_flips_both_ways() {
        let db = backend().await;
        db.upsert_issue(&sample_issue("i1", 50.0)).await.unwrap();

        db.toggle_saved("i1").await.unwrap();
        assert!(db.get_issue("i1").await.unwrap().unwrap().is_saved);
        db.toggle_saved("i1").await.unwrap();
        assert!(!db.get_issue("i1").await.unwrap().unwrap().is_saved);
    }

    #[tokio::test]
    async fn list_orders_by_importance_then_recency() {
        let db = backend().await;
        let mut older_high = sample_issue("a", 90.0);
        older_high.received_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut newer_high = sample_issue("b", 90.0);
        newer_high.received_at = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        let low = sample_issue("c", 20.0);

        db.upsert_issue(&older_high).await.unwrap();
        db.upsert_issue(&newer_high).await.unwrap();
        db.upsert_issue(&low).await.unwrap();

        let ids: Vec<String> = db
            .list_issues(10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn existing_issue_ids_returns_intersection() {
        let db = backend().await;
        db.upsert_issue(&sample_issue("2", 50.0)).await.unwrap();

        let present = db
            .existing_issue_ids(&["1".into(), "2".into(), "3".into()])
            .await
            .unwrap();
        assert_eq!(present.len(), 1);
        assert!(present.contains("2"));
    }

    #[tokio::test]
    async fn list_by_tag_matches_exact_string() {
        let db = backend().await;
        let mut a = sample_issue("a", 80.0);
        a.tags = vec!["rust".into(), "ai".into()];
        let mut b = sample_issue("b", 60.0);
        b.tags = vec!["ai".into()];
        let mut c = sample_issue("c", 90.0);
        c.tags = vec!["AI".into()]; // different case, must not match "ai"

        db.upsert_issue(&a).await.unwrap();
        db.upsert_issue(&b).await.unwrap();
        db.upsert_issue(&c).await.unwrap();

        let ids: Vec<String> = db
            .list_issues_by_tag("ai")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        // Unknown tag yields an empty result, not an error
        assert!(db.list_issues_by_tag("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn detected_upsert_preserves_user_edits() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let source = sample_source("weekly@substack.com");
        db.upsert_source_detected(&source).await.unwrap();

        // User disables the source and changes its category
        db.set_source_active(&source.id, false).await.unwrap();
        db.set_source_category(&source.id, "AI").await.unwrap();

        // Re-detection during sync refreshes display fields only
        let mut redetected = sample_source("weekly@substack.com");
        redetected.sender_name = "Fresh Name".to_string();
        db.upsert_source_detected(&redetected).await.unwrap();

        let got = db.get_source(&source.id).await.unwrap().unwrap();
        assert_eq!(got.sender_name, "Fresh Name");
        assert!(!got.is_active, "sync must not re-enable a disabled source");
        assert_eq!(got.category, "AI");
    }

    #[tokio::test]
    async fn manual_upsert_applies_active_and_category() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let source = sample_source("weekly@substack.com");
        db.upsert_source_detected(&source).await.unwrap();

        let mut untracked = sample_source("weekly@substack.com");
        untracked.is_active = false;
        db.upsert_source_manual(&untracked).await.unwrap();

        let got = db.get_source(&source.id).await.unwrap().unwrap();
        assert!(!got.is_active);
    }

    #[tokio::test]
    async fn tracked_emails_are_lowercased_and_active_only() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_source_detected(&sample_source("Weekly@Substack.com"))
            .await
            .unwrap();
        let inactive = {
            let mut s = sample_source("off@example.com");
            s.is_active = false;
            s
        };
        db.upsert_source_manual(&inactive).await.unwrap();

        let emails = db.tracked_sender_emails().await.unwrap();
        assert_eq!(emails, vec!["weekly@substack.com"]);
    }

    #[tokio::test]
    async fn stats_counts_rows() {
        let db = backend().await;
        db.upsert_issue(&sample_issue("a", 80.0)).await.unwrap();
        db.upsert_issue(&sample_issue("b", 40.0)).await.unwrap();
        db.mark_read("a").await.unwrap();
        db.toggle_saved("b").await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.read, 1);
        assert_eq!(stats.saved, 1);
        assert_eq!(stats.avg_importance, 60.0);
        assert_eq!(stats.active_sources, 1);
    }

    #[tokio::test]
    async fn set_active_on_missing_source_is_not_found() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let err = db.set_source_active("src_missing", true).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
