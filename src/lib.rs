pub mod client;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod sync;
pub mod tags;
pub mod tree;
pub mod types;
pub mod views;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::types::RefreshSummary;

/// Refresh bookkeeping shared across requests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// True while a refresh is running. Prevents concurrent refreshes.
    pub is_refreshing: bool,
    /// Unix seconds of the last successful refresh in this process.
    pub last_refresh_at: Option<i64>,
    pub last_summary: Option<RefreshSummary>,
    /// Message of the last failed refresh, cleared on success.
    pub last_error: Option<String>,
}

/// All runtime state shared across handlers.
pub struct AppState {
    pub settings: Settings,
    pub sync: Mutex<SyncStatus>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            sync: Mutex::new(SyncStatus::default()),
        }
    }

    /// Fresh connection to the cache for the current request.
    pub fn open_db(&self) -> Result<rusqlite::Connection> {
        db::open_cache_db(&self.settings.database_path)
    }
}

/// Build the shared state and make sure the cache schema exists.
pub fn init_state(settings: Settings) -> Result<Arc<AppState>> {
    let state = AppState::new(settings);
    let conn = state
        .open_db()
        .with_context(|| format!("opening {}", state.settings.database_path.display()))?;
    db::init_schema(&conn)?;
    Ok(Arc::new(state))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/web/todos") }))
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
        // JSON API
        .route("/api/refresh", post(commands::refresh))
        .route("/api/sync/status", get(commands::sync_status))
        .route("/api/nodes", get(commands::list_nodes).post(commands::create_node))
        .route("/api/nodes/tree", get(commands::wip_tree))
        .route("/api/nodes/{id}", axum::routing::delete(commands::delete_node))
        .route("/api/nodes/{id}/children", get(commands::remote_children))
        .route("/api/nodes/{id}/complete", post(commands::complete_node))
        .route("/api/nodes/{id}/uncomplete", post(commands::uncomplete_node))
        .route("/api/nodes/{id}/status", post(commands::update_status))
        .route("/api/nodes/{id}/move", post(commands::move_node))
        .route("/api/todos", get(commands::list_todos))
        .route("/api/targets", get(commands::targets))
        .route("/api/filters", post(commands::save_filter))
        .route("/api/filters/history", get(commands::filter_history))
        // HTML views
        .route("/web", get(|| async { Redirect::to("/web/todos") }))
        .route("/web/todos", get(views::todos_page))
        .route("/web/kanban", get(views::kanban_page))
        .route("/web/refresh", post(views::refresh_and_show))
        .route("/web/nodes/{id}/complete", post(views::complete_node_web))
        .route("/web/nodes/{id}/uncomplete", post(views::uncomplete_node_web))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Load settings, prepare the cache and serve until the process is stopped.
pub async fn run() -> Result<()> {
    let settings = Settings::from_env()?;
    init_tracing(settings.debug);

    let addr = settings.bind_addr.clone();
    let app_name = settings.app_name.clone();
    let state = init_state(settings)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("{app_name} listening on {addr}");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
