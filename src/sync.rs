//! Refresh orchestration and the point mutations that write through to the
//! remote API before touching the cache.

use std::sync::Arc;

use serde_json::Value;

use crate::client::{ClientError, WorkflowyClient};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::tags::{color_priority, extract_status_tag, update_status_tag};
use crate::tree::{build_lookup, compute_breadcrumb, find_wip_root, MAX_BREADCRUMB_DEPTH};
use crate::types::{CachedNode, Position, RefreshSummary, RemoteNode, StatusTag};
use crate::AppState;

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Derive every cache row from one export batch. Pure; never fails.
pub fn derive_cache_rows(nodes: &[RemoteNode], now: i64) -> (Vec<CachedNode>, Option<String>) {
    let lookup = build_lookup(nodes);
    let wip_node_id = find_wip_root(nodes).map(|n| n.id.clone());

    let rows = nodes
        .iter()
        .map(|n| CachedNode {
            id: n.id.clone(),
            parent_id: n.parent_id.clone(),
            name: n.name.clone(),
            note: n.note.clone(),
            priority: n.priority,
            layout_mode: n.layout_mode().map(str::to_string),
            completed_at: n.completed_at,
            created_at: n.created_at,
            modified_at: n.modified_at,
            cached_at: now,
            breadcrumb: compute_breadcrumb(&n.id, &lookup, MAX_BREADCRUMB_DEPTH),
            status_tag: extract_status_tag(n.name.as_deref()),
            color_priority: color_priority(n.name.as_deref()),
        })
        .collect();

    (rows, wip_node_id)
}

/// Full export → derive → transactional cache swap. At most one runs at a
/// time; a concurrent call gets [`AppError::RefreshInProgress`].
///
/// The work runs on its own task, so a caller that goes away mid-refresh
/// (client disconnect) doesn't leave the guard set.
pub async fn run_refresh(state: &Arc<AppState>) -> AppResult<RefreshSummary> {
    {
        let mut s = state.sync.lock().await;
        if s.is_refreshing {
            return Err(AppError::RefreshInProgress);
        }
        s.is_refreshing = true;
    }

    let task_state = Arc::clone(state);
    let handle = tokio::spawn(async move {
        let result = run_refresh_inner(&task_state).await;
        finish_refresh(&task_state, &result).await;
        result
    });

    match handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Refresh task failed: {e}");
            let failed = Err(AppError::Internal(anyhow::anyhow!("refresh task failed: {e}")));
            finish_refresh(state, &failed).await;
            failed
        }
    }
}

async fn finish_refresh(state: &AppState, result: &AppResult<RefreshSummary>) {
    let mut s = state.sync.lock().await;
    s.is_refreshing = false;
    match result {
        Ok(summary) => {
            s.last_refresh_at = Some(now_ts());
            s.last_summary = Some(summary.clone());
            s.last_error = None;
        }
        Err(e) => s.last_error = Some(e.to_string()),
    }
}

async fn run_refresh_inner(state: &AppState) -> AppResult<RefreshSummary> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    let nodes = match client.export_all_nodes().await {
        Ok(nodes) => nodes,
        Err(ClientError::RateLimited) => {
            tracing::warn!("Export rate limited; keeping the previous cache");
            return Err(AppError::RateLimited);
        }
        Err(e) => return Err(e.into()),
    };

    let now = now_ts();
    let (rows, wip_node_id) = derive_cache_rows(&nodes, now);
    if wip_node_id.is_none() {
        tracing::warn!("No node named WIP in export; previous WIP root kept");
    }

    let mut conn = state.open_db()?;
    db::replace_cache(&mut conn, &rows, wip_node_id.as_deref(), now)?;

    tracing::info!(
        "Refreshed cache with {} nodes (wip root: {:?})",
        rows.len(),
        wip_node_id
    );
    Ok(RefreshSummary {
        nodes_cached: rows.len(),
        wip_node_id,
    })
}

/// Mark complete or incomplete remotely, then mirror it in the cache.
/// Returns the cached node after the update, or None if it isn't cached.
pub async fn set_completed(
    state: &AppState,
    node_id: &str,
    completed: bool,
) -> AppResult<Option<CachedNode>> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    if completed {
        client.complete_node(node_id).await?;
    } else {
        client.uncomplete_node(node_id).await?;
    }

    let conn = state.open_db()?;
    let completed_at = completed.then(now_ts);
    if !db::set_completed(&conn, node_id, completed_at)? {
        tracing::debug!("Node {node_id} not cached; completion not mirrored");
        return Ok(None);
    }
    Ok(db::get_node(&conn, node_id)?)
}

/// Rewrite the node's status tag remotely and in the cache. Uncached nodes
/// are looked up remotely for their current name. Returns the new name.
pub async fn update_status(state: &AppState, node_id: &str, status: StatusTag) -> AppResult<String> {
    let client = WorkflowyClient::from_settings(&state.settings)?;

    let cached_name = {
        let conn = state.open_db()?;
        db::get_node(&conn, node_id)?.map(|n| n.name)
    };
    let current = match cached_name {
        Some(name) => name,
        None => match client.get_node(node_id).await {
            Ok(node) => node.name,
            Err(ClientError::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(format!("Node {node_id} not found")));
            }
            Err(e) => return Err(e.into()),
        },
    };

    let new_name = update_status_tag(current.as_deref(), status);
    client.update_node(node_id, Some(&new_name), None).await?;

    let conn = state.open_db()?;
    db::update_name(
        &conn,
        node_id,
        &new_name,
        extract_status_tag(Some(&new_name)).map(|t| t.as_str()),
        color_priority(Some(&new_name)),
    )?;
    Ok(new_name)
}

pub async fn create_node(
    state: &AppState,
    parent_id: &str,
    name: &str,
    note: Option<&str>,
    position: Position,
) -> AppResult<Value> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    Ok(client.create_node(parent_id, name, note, position).await?)
}

pub async fn move_node(
    state: &AppState,
    node_id: &str,
    parent_id: &str,
    position: Position,
) -> AppResult<()> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    client.move_node(node_id, parent_id, position).await?;
    Ok(())
}

/// Delete remotely, then drop the cached row if there is one.
pub async fn delete_node(state: &AppState, node_id: &str) -> AppResult<()> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    client.delete_node(node_id).await?;
    let conn = state.open_db()?;
    db::delete_node(&conn, node_id)?;
    Ok(())
}

pub async fn targets(state: &AppState) -> AppResult<Vec<Value>> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    Ok(client.get_targets().await?)
}

pub async fn list_children(state: &AppState, parent_id: &str) -> AppResult<Vec<RemoteNode>> {
    let client = WorkflowyClient::from_settings(&state.settings)?;
    Ok(client.list_children(parent_id).await?)
}
