//! REST endpoints over the issue store, aggregation engine, and sync
//! pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::aggregate;
use crate::detector;
use crate::enrich::Enricher;
use crate::error::DatabaseError;
use crate::mailbox::Mailbox;
use crate::model::{Issue, Source};
use crate::store::Database;
use crate::sync::{self, SyncDeps, SyncOptions};

/// Shared state for all API routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub mailbox: Arc<dyn Mailbox>,
    pub enricher: Arc<Enricher>,
    pub sync_defaults: SyncOptions,
}

/// Map store errors onto HTTP responses.
fn db_error(e: DatabaseError) -> Response {
    match e {
        DatabaseError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("{entity} {id} not found")})),
        )
            .into_response(),
        e => {
            error!(error = %e, "Store operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct IssuesQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    /// Optional search text, matched case-insensitively against subject,
    /// summary, and tags.
    q: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Case-insensitive match against subject, summary, and tags.
fn matches_search(issue: &Issue, q: &str) -> bool {
    issue.subject.to_lowercase().contains(q)
        || issue.summary.to_lowercase().contains(q)
        || issue.tags.iter().any(|t| t.to_lowercase().contains(q))
}

/// Apply the search filter across the whole set, then paginate. Filtering
/// after LIMIT/OFFSET would only search within one page.
fn search_page(issues: Vec<Issue>, q: &str, limit: u32, offset: u32) -> Vec<Issue> {
    issues
        .into_iter()
        .filter(|i| matches_search(i, q))
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

/// GET /api/issues?limit&offset&q
async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<IssuesQuery>,
) -> Response {
    let q = query
        .q
        .as_deref()
        .map(str::to_lowercase)
        .filter(|q| !q.is_empty());

    let result = match &q {
        Some(_) => state.db.list_issues(u32::MAX, 0).await,
        None => state.db.list_issues(query.limit, query.offset).await,
    };

    match result {
        Ok(issues) => {
            let issues = match q {
                Some(q) => search_page(issues, &q, query.limit, query.offset),
                None => issues,
            };
            Json(json!({"issues": issues})).into_response()
        }
        Err(e) => db_error(e),
    }
}

/// GET /api/issues/{id}
async fn get_issue(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.db.get_issue(&id).await {
        Ok(Some(issue)) => Json(json!({"issue": issue})).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Not found"})),
        )
            .into_response(),
        Err(e) => db_error(e),
    }
}

/// POST /api/issues/{id}/read
async fn mark_read(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.db.mark_read(&id).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => db_error(e),
    }
}

/// GET /api/saved
async fn list_saved(State(state): State<AppState>) -> Response {
    match state.db.list_saved_issues().await {
        Ok(issues) => Json(json!({"issues": issues})).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Deserialize)]
struct ToggleSavedBody {
    id: String,
}

/// POST /api/saved — toggle an issue's saved flag.
async fn toggle_saved(
    State(state): State<AppState>,
    Json(body): Json<ToggleSavedBody>,
) -> Response {
    if body.id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing id"})),
        )
            .into_response();
    }
    match state.db.toggle_saved(&body.id).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => db_error(e),
    }
}

/// GET /api/sources
async fn list_sources(State(state): State<AppState>) -> Response {
    match state.db.list_active_sources().await {
        Ok(sources) => Json(json!({"sources": sources})).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchSourceBody {
    is_active: Option<bool>,
    category: Option<String>,
}

/// PATCH /api/sources/{id} — explicit user edit of category/active.
async fn patch_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchSourceBody>,
) -> Response {
    if let Some(is_active) = body.is_active
        && let Err(e) = state.db.set_source_active(&id, is_active).await
    {
        return db_error(e);
    }
    if let Some(category) = body.category
        && let Err(e) = state.db.set_source_category(&id, &category).await
    {
        return db_error(e);
    }
    Json(json!({"ok": true})).into_response()
}

/// GET /api/senders — recent inbox senders with their tracked flag.
async fn list_senders(State(state): State<AppState>) -> Response {
    let senders = match state.mailbox.list_senders(200).await {
        Ok(senders) => senders,
        Err(e) => {
            error!(error = %e, "Sender listing failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "mailbox unavailable"})),
            )
                .into_response();
        }
    };
    let tracked: HashSet<String> = match state.db.tracked_sender_emails().await {
        Ok(emails) => emails.into_iter().collect(),
        Err(e) => return db_error(e),
    };

    let senders: Vec<serde_json::Value> = senders
        .into_iter()
        .map(|s| {
            let is_tracked = tracked.contains(&s.email);
            let mut v = serde_json::to_value(&s).unwrap_or_default();
            v["isTracked"] = json!(is_tracked);
            v
        })
        .collect();

    Json(json!({"senders": senders})).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackSenderBody {
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    domain: String,
    is_tracked: bool,
}

/// POST /api/senders — manually track or untrack a sender.
async fn track_sender(
    State(state): State<AppState>,
    Json(body): Json<TrackSenderBody>,
) -> Response {
    if body.email.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing email"})),
        )
            .into_response();
    }

    let email = body.email.to_lowercase();
    let domain = if body.domain.is_empty() {
        detector::sender_domain(&email)
    } else {
        body.domain
    };
    let mut source = Source::detected(&email, &body.name, &domain);
    source.is_active = body.is_tracked;

    match state.db.upsert_source_manual(&source).await {
        Ok(()) => Json(json!({"ok": true, "sourceId": source.id})).into_response(),
        Err(e) => db_error(e),
    }
}

/// GET /api/emails — quick newsletter preview of the inbox, unpersisted.
async fn preview_emails(State(state): State<AppState>) -> Response {
    match sync::preview_newsletters(state.mailbox.as_ref(), &state.sync_defaults.query, 50).await {
        Ok(newsletters) => Json(json!({"newsletters": newsletters})).into_response(),
        Err(e) => {
            error!(error = %e, "Inbox preview failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "mailbox unavailable"})),
            )
                .into_response()
        }
    }
}

/// GET /api/digest
async fn get_digest(State(state): State<AppState>) -> Response {
    match state.db.list_issues(200, 0).await {
        Ok(issues) => Json(aggregate::build_digest(issues)).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Deserialize)]
struct TagsQuery {
    tag: Option<String>,
}

/// GET /api/tags — tag index, or issues for one tag when `?tag=` is given.
async fn get_tags(State(state): State<AppState>, Query(q): Query<TagsQuery>) -> Response {
    if let Some(tag) = q.tag {
        return match state.db.list_issues_by_tag(&tag).await {
            Ok(issues) => Json(json!({"issues": issues})).into_response(),
            Err(e) => db_error(e),
        };
    }
    match state.db.list_issues(u32::MAX, 0).await {
        Ok(issues) => Json(json!({"tags": aggregate::tag_index(issues.iter())})).into_response(),
        Err(e) => db_error(e),
    }
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> Response {
    match state.db.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Deserialize, Default)]
struct SyncBody {
    model: Option<String>,
}

/// POST /api/sync — run one sync pass now.
async fn run_sync(
    State(state): State<AppState>,
    body: Result<Json<SyncBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    // A missing or malformed body just means "use the defaults"
    let mut opts = state.sync_defaults.clone();
    if let Ok(Json(SyncBody { model: Some(model) })) = body {
        opts.model = model;
    }

    let deps = SyncDeps {
        db: Arc::clone(&state.db),
        mailbox: Arc::clone(&state.mailbox),
        enricher: Arc::clone(&state.enricher),
    };

    match sync::run_sync(&deps, &opts).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "Sync failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}


/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/issues", get(list_issues))
        .route("/api/issues/{id}", get(get_issue))
        .route("/api/issues/{id}/read", post(mark_read))
        .route("/api/saved", get(list_saved).post(toggle_saved))
        .route("/api/sources", get(list_sources))
        .route("/api/sources/{id}", patch(patch_source))
        .route("/api/senders", get(list_senders).post(track_sender))
        .route("/api/emails", get(preview_emails))
        .route("/api/digest", get(get_digest))
        .route("/api/tags", get(get_tags))
        .route("/api/stats", get(get_stats))
        .route("/api/sync", post(run_sync))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
