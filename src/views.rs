//! Server-rendered HTML for the todo list and kanban board.
//!
//! Pages are driven by htmx. Each view answers in one of three shapes
//! depending on who asked: a full document for a plain browser load, the
//! view body for htmx navigation, or only the list/board container when the
//! filter input re-renders it.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Html;
use serde::Deserialize;

use crate::db::{self, TodoFilter, TodoOrder};
use crate::error::{AppError, AppResult};
use crate::tags::parse_filter_terms;
use crate::types::{CachedNode, StatusTag};
use crate::{sync, AppState};

pub const TODO_CONTAINER: &str = "todo-list-container";
pub const KANBAN_CONTAINER: &str = "kanban-board-container";

const NO_WIP_MESSAGE: &str = "No WIP node found. Click refresh to sync from Workflowy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    FullPage,
    /// htmx navigation into `#main-content`.
    Fragment,
    /// Filter-triggered swap of the list/board container only.
    Partial,
}

pub fn render_mode(headers: &HeaderMap, container: &str) -> RenderMode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if header("HX-Target") == Some(container) {
        RenderMode::Partial
    } else if header("HX-Request").is_some() {
        RenderMode::Fragment
    } else {
        RenderMode::FullPage
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub filter_text: String,
    /// Checkbox value: "true" when ticked, absent or empty otherwise.
    #[serde(default)]
    pub show_completed: String,
}

impl ViewQuery {
    fn show_completed(&self) -> bool {
        self.show_completed == "true"
    }
}

// ─── Handlers ──────────────────────────────────────────────────────────────────

/// Todo nodes for a view, or None when no WIP root has been discovered yet.
fn load_view_nodes(state: &AppState, query: &ViewQuery) -> AppResult<Option<Vec<CachedNode>>> {
    let conn = state.open_db()?;
    let Some(root) = db::wip_root(&conn)? else {
        return Ok(None);
    };
    let filter = TodoFilter {
        terms: parse_filter_terms(&query.filter_text),
        include_completed: query.show_completed(),
        order: TodoOrder::ColorThenPriority,
    };
    Ok(Some(db::list_todos(&conn, &root.wip_node_id, &filter)?))
}

pub async fn todos_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> AppResult<Html<String>> {
    let title = format!("Todos - {}", state.settings.app_name);
    let Some(nodes) = load_view_nodes(&state, &query)? else {
        return Ok(Html(base_page(&title, &empty_state(NO_WIP_MESSAGE))));
    };
    let show_completed = query.show_completed();
    let body = match render_mode(&headers, TODO_CONTAINER) {
        RenderMode::Partial => todo_list_items(&nodes),
        RenderMode::Fragment => todo_list(&nodes, &query.filter_text, show_completed),
        RenderMode::FullPage => base_page(&title, &todo_list(&nodes, &query.filter_text, show_completed)),
    };
    Ok(Html(body))
}

pub async fn kanban_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> AppResult<Html<String>> {
    let title = format!("Kanban - {}", state.settings.app_name);
    let Some(nodes) = load_view_nodes(&state, &query)? else {
        return Ok(Html(base_page(&title, &empty_state(NO_WIP_MESSAGE))));
    };
    let show_completed = query.show_completed();
    let body = match render_mode(&headers, KANBAN_CONTAINER) {
        RenderMode::Partial => kanban_board_items(&nodes),
        RenderMode::Fragment => kanban_view(&nodes, &query.filter_text, show_completed),
        RenderMode::FullPage => {
            base_page(&title, &kanban_view(&nodes, &query.filter_text, show_completed))
        }
    };
    Ok(Html(body))
}

/// Refresh, then re-render whichever view the browser is on. A rate-limited
/// or overlapping refresh still shows the current cache, with a banner.
pub async fn refresh_and_show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Html<String>> {
    let is_kanban = headers
        .get("HX-Current-URL")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|url| url.contains("/kanban"));

    let banner = match sync::run_refresh(&state).await {
        Ok(_) => None,
        Err(AppError::RateLimited) => Some(error_message(
            "Rate Limited",
            "Workflowy API allows 1 request per minute. Please wait and try again.",
        )),
        Err(AppError::RefreshInProgress) => Some(error_message(
            "Refresh Running",
            "Another refresh is already in progress.",
        )),
        Err(e) => return Err(e),
    };

    let query = ViewQuery::default();
    let Some(nodes) = load_view_nodes(&state, &query)? else {
        let mut html = banner.unwrap_or_default();
        html.push_str(&empty_state(NO_WIP_MESSAGE));
        return Ok(Html(html));
    };

    let html = match (banner, is_kanban) {
        (None, true) => kanban_view(&nodes, "", false),
        (None, false) => todo_list(&nodes, "", false),
        (Some(banner), true) => format!(
            "<div>{}{}{}</div>",
            filter_input("", false, "/web/kanban", KANBAN_CONTAINER),
            banner,
            kanban_board_items(&nodes)
        ),
        (Some(banner), false) => format!(
            "<div>{}{}{}</div>",
            filter_input("", false, "/web/todos", TODO_CONTAINER),
            banner,
            todo_list_items(&nodes)
        ),
    };
    Ok(Html(html))
}

pub async fn complete_node_web(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Html<String>> {
    let node = sync::set_completed(&state, &id, true).await?;
    Ok(Html(node.map(|n| todo_item(&n)).unwrap_or_default()))
}

pub async fn uncomplete_node_web(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Html<String>> {
    let node = sync::set_completed(&state, &id, false).await?;
    Ok(Html(node.map(|n| todo_item(&n)).unwrap_or_default()))
}

// ─── Components ────────────────────────────────────────────────────────────────

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Node names carry Workflowy's colored `<span>` markup and are emitted as-is.
fn node_name(node: &CachedNode) -> String {
    match node.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "(unnamed)".to_string(),
    }
}

fn status_colors(tag: StatusTag) -> (&'static str, &'static str) {
    match tag {
        StatusTag::Backlog => ("bg-gray-600", "text-white"),
        StatusTag::Blocked => ("bg-red-800", "text-red-200"),
        StatusTag::Todo => ("bg-yellow-600", "text-yellow-100"),
        StatusTag::Wip => ("bg-blue-600", "text-blue-100"),
        StatusTag::Test => ("bg-purple-600", "text-purple-100"),
        StatusTag::Done => ("bg-green-700", "text-green-100"),
    }
}

fn status_badge(tag: Option<StatusTag>) -> String {
    let Some(tag) = tag else {
        return String::new();
    };
    let (bg, fg) = status_colors(tag);
    format!(r#"<span class="text-xs px-2 py-1 rounded {bg} {fg}">#{tag}</span>"#)
}

pub fn base_page(title: &str, content: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<script src="https://cdn.tailwindcss.com"></script>
<script src="https://unpkg.com/htmx.org@1.9.10"></script>
<script src="https://cdn.jsdelivr.net/npm/sortablejs@1.15.0/Sortable.min.js"></script>
<style>html, body {{ background-color: #111827; margin: 0; padding: 0; }}</style>
</head>
<body class="bg-gray-900 text-gray-100 min-h-screen">
<nav class="flex items-center gap-4 px-6 py-3 bg-gray-800 border-b border-gray-700">
<a href="/web/todos" hx-get="/web/todos" hx-target="#main-content" hx-push-url="true" class="hover:text-blue-400">Todos</a>
<a href="/web/kanban" hx-get="/web/kanban" hx-target="#main-content" hx-push-url="true" class="hover:text-blue-400">Kanban</a>
<button hx-post="/web/refresh" hx-target="#main-content" class="ml-auto px-3 py-1 bg-blue-600 rounded hover:bg-blue-500">Refresh</button>
</nav>
<main id="main-content" class="max-w-6xl mx-auto p-6">{content}</main>
</body>
</html>"##,
        title = escape(title),
    )
}

pub fn empty_state(message: &str) -> String {
    format!(
        r#"<div class="text-center py-12 text-gray-400"><p>{}</p></div>"#,
        escape(message)
    )
}

pub fn error_message(title: &str, message: &str) -> String {
    format!(
        r#"<div class="mb-4 p-4 bg-red-900 border border-red-700 rounded-lg"><strong class="text-red-200">{}</strong><p class="text-red-300 text-sm">{}</p></div>"#,
        escape(title),
        escape(message)
    )
}

pub fn filter_input(current: &str, show_completed: bool, target_url: &str, container: &str) -> String {
    let checked = if show_completed { " checked" } else { "" };
    format!(
        r##"<form class="mb-4 flex items-center gap-4" hx-get="{target_url}" hx-trigger="keyup changed delay:300ms from:input[name='filter_text'], change from:input[name='show_completed']" hx-target="#{container}" hx-push-url="true">
<input type="text" name="filter_text" value="{value}" placeholder="Filter by name or project (comma-separated)..." class="w-full px-4 py-2 bg-gray-800 border border-gray-700 rounded-lg text-gray-100 placeholder-gray-500 focus:outline-none focus:border-blue-500">
<label class="flex items-center gap-2 text-sm text-gray-400 whitespace-nowrap"><input type="checkbox" name="show_completed" value="true"{checked}>Show completed</label>
</form>"##,
        value = escape(current),
    )
}

pub fn todo_item(node: &CachedNode) -> String {
    let done = node.is_completed();
    let action = if done { "uncomplete" } else { "complete" };
    let checked = if done { " checked" } else { "" };
    let name_cls = if done { "line-through text-gray-500" } else { "text-gray-100" };
    format!(
        r#"<li class="mb-2" id="node-{id}"><div class="flex items-center p-3 bg-gray-800 rounded-lg">
<input type="checkbox"{checked} hx-post="/web/nodes/{id}/{action}" hx-target="closest li" hx-swap="outerHTML" class="form-checkbox h-5 w-5 rounded border-gray-600 bg-gray-700">
<div class="ml-3 flex-1"><span class="{name_cls}">{name}</span> {badge}
<span class="block text-xs text-gray-500 mt-1">{crumb}</span></div>
</div></li>"#,
        id = escape(&node.id),
        name = node_name(node),
        badge = status_badge(node.status_tag),
        crumb = escape(&node.breadcrumb),
    )
}

pub fn todo_list_items(nodes: &[CachedNode]) -> String {
    let mut html = format!(r#"<div id="{TODO_CONTAINER}">"#);
    if nodes.is_empty() {
        html.push_str(&empty_state("No todos match."));
    } else {
        html.push_str(r#"<ul class="space-y-2">"#);
        for node in nodes {
            html.push_str(&todo_item(node));
        }
        html.push_str("</ul>");
    }
    let _ = write!(
        html,
        r#"<p class="mt-4 text-sm text-gray-500">{} items</p></div>"#,
        nodes.len()
    );
    html
}

pub fn todo_list(nodes: &[CachedNode], current_filter: &str, show_completed: bool) -> String {
    format!(
        "<div>{}{}</div>",
        filter_input(current_filter, show_completed, "/web/todos", TODO_CONTAINER),
        todo_list_items(nodes)
    )
}

fn column_title(tag: StatusTag) -> &'static str {
    match tag {
        StatusTag::Backlog => "Backlog",
        StatusTag::Blocked => "Blocked",
        StatusTag::Todo => "Todo",
        StatusTag::Wip => "WIP",
        StatusTag::Test => "Test",
        StatusTag::Done => "Done",
    }
}

fn column_color(tag: StatusTag) -> &'static str {
    match tag {
        StatusTag::Backlog => "bg-gray-600",
        StatusTag::Blocked => "bg-red-600",
        StatusTag::Todo => "bg-yellow-600",
        StatusTag::Wip => "bg-blue-600",
        StatusTag::Test => "bg-purple-600",
        StatusTag::Done => "bg-green-600",
    }
}

/// Nodes for one column, sorted by (color priority, priority).
pub fn column_nodes(nodes: &[CachedNode], tag: StatusTag) -> Vec<&CachedNode> {
    let mut column: Vec<&CachedNode> = nodes.iter().filter(|n| n.column() == tag).collect();
    column.sort_by_key(|n| (n.color_priority, n.priority));
    column
}

pub fn kanban_card(node: &CachedNode) -> String {
    let done = node.is_completed();
    let action = if done { "uncomplete" } else { "complete" };
    let checked = if done { " checked" } else { "" };
    let name_cls = if done { "line-through text-gray-500" } else { "text-gray-100" };
    format!(
        r#"<div class="p-3 bg-gray-700 rounded-lg mb-2 cursor-move border border-gray-600 hover:border-gray-500" data-node-id="{id}" data-current-status="{status}" draggable="true">
<div class="flex items-start"><input type="checkbox"{checked} hx-post="/api/nodes/{id}/{action}" hx-swap="none" class="form-checkbox h-4 w-4 rounded border-gray-600 bg-gray-700">
<span class="ml-2 text-sm {name_cls}">{name}</span></div>
<span class="text-xs text-gray-500 mt-1 block truncate">{crumb}</span></div>"#,
        id = escape(&node.id),
        status = node.column(),
        name = node_name(node),
        crumb = escape(&node.breadcrumb),
    )
}

fn kanban_column(nodes: &[CachedNode], tag: StatusTag) -> String {
    let column = column_nodes(nodes, tag);
    let cards: String = column.iter().map(|n| kanban_card(n)).collect();
    format!(
        r#"<div class="flex-1 min-w-[200px] max-w-[300px] p-3 bg-gray-800 rounded-lg">
<div class="flex items-center mb-3 pb-2 border-b border-gray-700"><h2 class="font-semibold text-gray-100">{title}</h2><span class="ml-2 px-2 py-0.5 text-xs rounded-full {color} text-white">{count}</span></div>
<div class="kanban-column min-h-[200px] space-y-2" data-status="{tag}" id="column-{lower}">{cards}</div></div>"#,
        title = column_title(tag),
        color = column_color(tag),
        count = column.len(),
        lower = tag.as_str().to_lowercase(),
    )
}

pub fn kanban_board(nodes: &[CachedNode]) -> String {
    let columns: String = StatusTag::ALL.iter().map(|t| kanban_column(nodes, *t)).collect();
    format!(r#"<div class="flex gap-4 overflow-x-auto pb-4" id="kanban-board">{columns}</div>"#)
}

const KANBAN_SCRIPT: &str = r#"<script>
function initKanban() {
  document.querySelectorAll('.kanban-column').forEach(function (column) {
    if (column._sortable) return;
    column._sortable = new Sortable(column, {
      group: 'kanban',
      animation: 150,
      ghostClass: 'opacity-50',
      onEnd: function (evt) {
        const nodeId = evt.item.dataset.nodeId;
        const newStatus = evt.to.dataset.status;
        if (newStatus === evt.item.dataset.currentStatus) return;
        fetch(`/api/nodes/${nodeId}/status`, {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ status: newStatus }),
        })
          .then(function (r) { if (!r.ok) throw new Error(r.status); return r.json(); })
          .then(function () { evt.item.dataset.currentStatus = newStatus; })
          .catch(function () { evt.from.appendChild(evt.item); });
      },
    });
  });
}
document.addEventListener('DOMContentLoaded', initKanban);
document.addEventListener('htmx:afterSwap', initKanban);
initKanban();
</script>"#;

pub fn kanban_board_items(nodes: &[CachedNode]) -> String {
    format!(
        r#"<div id="{KANBAN_CONTAINER}">{}{KANBAN_SCRIPT}</div>"#,
        kanban_board(nodes)
    )
}

pub fn kanban_view(nodes: &[CachedNode], current_filter: &str, show_completed: bool) -> String {
    format!(
        "<div>{}{}</div>",
        filter_input(current_filter, show_completed, "/web/kanban", KANBAN_CONTAINER),
        kanban_board_items(nodes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn card(id: &str, name: &str, priority: i64, color: i64) -> CachedNode {
        CachedNode {
            id: id.into(),
            parent_id: None,
            name: Some(name.into()),
            note: None,
            priority,
            layout_mode: Some("todo".into()),
            completed_at: None,
            created_at: None,
            modified_at: None,
            cached_at: 0,
            breadcrumb: "WIP > <Work>".into(),
            status_tag: crate::tags::extract_status_tag(Some(name)),
            color_priority: color,
        }
    }

    #[test]
    fn render_mode_follows_htmx_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(render_mode(&headers, TODO_CONTAINER), RenderMode::FullPage);

        headers.insert("hx-request", HeaderValue::from_static("true"));
        assert_eq!(render_mode(&headers, TODO_CONTAINER), RenderMode::Fragment);

        headers.insert("hx-target", HeaderValue::from_static("main-content"));
        assert_eq!(render_mode(&headers, TODO_CONTAINER), RenderMode::Fragment);

        headers.insert("hx-target", HeaderValue::from_static(TODO_CONTAINER));
        assert_eq!(render_mode(&headers, TODO_CONTAINER), RenderMode::Partial);
        assert_eq!(render_mode(&headers, KANBAN_CONTAINER), RenderMode::Fragment);
    }

    #[test]
    fn columns_default_to_backlog_and_sort_by_color() {
        let nodes = vec![
            card("a", "Untagged", 1, 99),
            card("b", "Red #TODO", 5, 1),
            card("c", "Plain #TODO", 1, 99),
            card("d", "Blue #todo", 9, 6),
        ];
        let backlog: Vec<_> = column_nodes(&nodes, StatusTag::Backlog).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(backlog, ["a"]);
        let todo: Vec<_> = column_nodes(&nodes, StatusTag::Todo).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(todo, ["b", "d", "c"]);
        assert!(column_nodes(&nodes, StatusTag::Done).is_empty());
    }

    #[test]
    fn breadcrumbs_are_escaped_names_are_not() {
        let html = todo_item(&card("x", r#"<span class="bc-red">Hot</span>"#, 0, 1));
        assert!(html.contains(r#"<span class="bc-red">Hot</span>"#));
        assert!(html.contains("WIP &gt; &lt;Work&gt;"));
        assert!(html.contains("/web/nodes/x/complete"));
    }

    #[test]
    fn board_has_every_column() {
        let board = kanban_board(&[card("a", "Task #WIP", 0, 99)]);
        for tag in StatusTag::ALL {
            assert!(board.contains(&format!(r#"data-status="{tag}""#)));
        }
        assert!(board.contains(r#"data-current-status="WIP""#));
    }

    #[test]
    fn full_page_wraps_content() {
        let page = base_page("Todos - Flow", &empty_state("nothing"));
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"<main id="main-content""#));
        assert!(page.contains("nothing"));
    }
}
