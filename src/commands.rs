use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::db::{self, TodoFilter, TodoOrder};
use crate::error::{AppError, AppResult};
use crate::tags::parse_filter_terms;
use crate::types::{
    CachedNode, CreateNodeRequest, FilterHistoryCreate, FilterHistoryEntry, MoveNodeRequest,
    NodeTree, RefreshSummary, RemoteNode, StatusUpdateRequest,
};
use crate::{sync, AppState, SyncStatus};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

// ─── Sync ──────────────────────────────────────────────────────────────────────

/// Full sync from the remote export. 429 when rate limited, 409 while
/// another refresh runs.
pub async fn refresh(State(state): State<Arc<AppState>>) -> AppResult<Json<RefreshSummary>> {
    Ok(Json(sync::run_refresh(&state).await?))
}

pub async fn sync_status(State(state): State<Arc<AppState>>) -> Json<SyncStatus> {
    Json(state.sync.lock().await.clone())
}

// ─── Cache reads ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NodesQuery {
    pub parent_id: Option<String>,
}

pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NodesQuery>,
) -> AppResult<Json<Vec<CachedNode>>> {
    let conn = state.open_db()?;
    let parent = query.parent_id.as_deref().filter(|p| !p.is_empty());
    Ok(Json(db::list_nodes(&conn, parent)?))
}

/// The cached WIP subtree, nested.
pub async fn wip_tree(State(state): State<Arc<AppState>>) -> AppResult<Json<NodeTree>> {
    let conn = state.open_db()?;
    let root = db::wip_root(&conn)?.ok_or(AppError::WipNotConfigured)?;
    let nodes = db::list_nodes(&conn, None)?;
    crate::tree::subtree(&nodes, &root.wip_node_id)
        .map(Json)
        .ok_or(AppError::WipNotConfigured)
}

#[derive(Debug, Deserialize)]
pub struct TodosQuery {
    pub filter_text: Option<String>,
    /// `show_completed=` (an unticked form field) counts as absent.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub show_completed: Option<bool>,
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Todo nodes under the WIP root, ordered by priority.
pub async fn list_todos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TodosQuery>,
) -> AppResult<Json<Vec<CachedNode>>> {
    let conn = state.open_db()?;
    let root = db::wip_root(&conn)?.ok_or(AppError::WipNotConfigured)?;
    let filter = TodoFilter {
        terms: parse_filter_terms(query.filter_text.as_deref().unwrap_or("")),
        include_completed: query.show_completed.unwrap_or(true),
        order: TodoOrder::Priority,
    };
    Ok(Json(db::list_todos(&conn, &root.wip_node_id, &filter)?))
}

// ─── Node mutations ────────────────────────────────────────────────────────────

pub async fn complete_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    sync::set_completed(&state, &id, true).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn uncomplete_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    sync::set_completed(&state, &id, false).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Move a node to another kanban column by rewriting its status tag.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> AppResult<Json<Value>> {
    let new_name = sync::update_status(&state, &id, request.status).await?;
    Ok(Json(json!({ "status": "ok", "new_name": new_name })))
}

pub async fn create_node(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNodeRequest>,
) -> AppResult<Json<Value>> {
    if request.parent_id.trim().is_empty() {
        return Err(AppError::BadRequest("parent_id is required".into()));
    }
    let created = sync::create_node(
        &state,
        &request.parent_id,
        &request.name,
        request.note.as_deref(),
        request.position,
    )
    .await?;
    Ok(Json(created))
}

pub async fn move_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<MoveNodeRequest>,
) -> AppResult<Json<Value>> {
    if request.parent_id.trim().is_empty() {
        return Err(AppError::BadRequest("parent_id is required".into()));
    }
    sync::move_node(&state, &id, &request.parent_id, request.position).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    sync::delete_node(&state, &id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

// ─── Remote passthrough ────────────────────────────────────────────────────────

/// Live children of a node, straight from the remote API.
pub async fn remote_children(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<RemoteNode>>> {
    Ok(Json(sync::list_children(&state, &id).await?))
}

pub async fn targets(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Value>>> {
    Ok(Json(sync::targets(&state).await?))
}

// ─── Filter history ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn filter_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<FilterHistoryEntry>>> {
    let conn = state.open_db()?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(db::recent_filters(&conn, limit)?))
}

pub async fn save_filter(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FilterHistoryCreate>,
) -> AppResult<Json<FilterHistoryEntry>> {
    let text = request.filter_text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("filter_text must not be empty".into()));
    }
    let conn = state.open_db()?;
    Ok(Json(db::add_filter(&conn, text, sync::now_ts())?))
}
