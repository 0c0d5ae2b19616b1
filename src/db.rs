use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::types::{CachedNode, FilterHistoryEntry, WipRoot};

const NODE_COLUMNS: &str = "id, parent_id, name, note, priority, layout_mode, completed_at,
     created_at, modified_at, cached_at, breadcrumb, status_tag, color_priority";

/// Open the cache database. Each request opens its own connection and drops
/// it on every exit path.
pub fn open_cache_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

/// Create the three cache tables if they don't exist. Safe to call on every start.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS node_cache (
             id             TEXT PRIMARY KEY,
             parent_id      TEXT,
             name           TEXT,
             note           TEXT,
             priority       INTEGER NOT NULL DEFAULT 0,
             layout_mode    TEXT,
             completed_at   INTEGER,
             created_at     INTEGER,
             modified_at    INTEGER,
             cached_at      INTEGER NOT NULL,
             breadcrumb     TEXT NOT NULL DEFAULT '',
             status_tag     TEXT,
             color_priority INTEGER NOT NULL DEFAULT 99
         );
         CREATE INDEX IF NOT EXISTS idx_node_cache_parent ON node_cache(parent_id);
         CREATE TABLE IF NOT EXISTS wip_config (
             id            INTEGER PRIMARY KEY AUTOINCREMENT,
             wip_node_id   TEXT NOT NULL,
             discovered_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS filter_history (
             id          INTEGER PRIMARY KEY AUTOINCREMENT,
             filter_text TEXT NOT NULL,
             used_at     INTEGER NOT NULL
         );",
    )?;
    Ok(())
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<CachedNode> {
    let status: Option<String> = row.get(11)?;
    Ok(CachedNode {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        name: row.get(2)?,
        note: row.get(3)?,
        priority: row.get(4)?,
        layout_mode: row.get(5)?,
        completed_at: row.get(6)?,
        created_at: row.get(7)?,
        modified_at: row.get(8)?,
        cached_at: row.get(9)?,
        breadcrumb: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        status_tag: status.and_then(|s| s.parse().ok()),
        color_priority: row.get(12)?,
    })
}

fn collect_rows<T>(table: &str, rows: impl Iterator<Item = rusqlite::Result<T>>) -> Vec<T> {
    rows.filter_map(|r| {
        r.map_err(|e| tracing::warn!("Skipping malformed {table} row: {e}"))
            .ok()
    })
    .collect()
}

/// Swap the whole node cache for `nodes` in one transaction. The WIP root row
/// is replaced only when `wip_node_id` is given. Nothing changes on error.
pub fn replace_cache(
    conn: &mut Connection,
    nodes: &[CachedNode],
    wip_node_id: Option<&str>,
    now: i64,
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM node_cache", [])?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO node_cache ({NODE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ))?;
        for n in nodes {
            stmt.execute(params![
                n.id,
                n.parent_id,
                n.name,
                n.note,
                n.priority,
                n.layout_mode,
                n.completed_at,
                n.created_at,
                n.modified_at,
                n.cached_at,
                n.breadcrumb,
                n.status_tag.map(|t| t.as_str()),
                n.color_priority,
            ])?;
        }
    }
    if let Some(wip_id) = wip_node_id {
        tx.execute("DELETE FROM wip_config", [])?;
        tx.execute(
            "INSERT INTO wip_config (wip_node_id, discovered_at) VALUES (?1, ?2)",
            params![wip_id, now],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn wip_root(conn: &Connection) -> Result<Option<WipRoot>> {
    let root = conn
        .query_row(
            "SELECT wip_node_id, discovered_at FROM wip_config ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(WipRoot {
                    wip_node_id: row.get(0)?,
                    discovered_at: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(root)
}

pub fn count_nodes(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM node_cache", [], |row| row.get(0))?;
    Ok(n as usize)
}

/// Fetch a single cached node. Returns None if not cached.
pub fn get_node(conn: &Connection, id: &str) -> Result<Option<CachedNode>> {
    let node = conn
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM node_cache WHERE id = ?1"),
            [id],
            node_from_row,
        )
        .optional()?;
    Ok(node)
}

/// Cached nodes ordered by priority, optionally only children of `parent_id`.
pub fn list_nodes(conn: &Connection, parent_id: Option<&str>) -> Result<Vec<CachedNode>> {
    let nodes = match parent_id {
        Some(parent) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node_cache WHERE parent_id = ?1 ORDER BY priority"
            ))?;
            let rows = stmt.query_map([parent], node_from_row)?;
            collect_rows("node_cache", rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node_cache ORDER BY priority"
            ))?;
            let rows = stmt.query_map([], node_from_row)?;
            collect_rows("node_cache", rows)
        }
    };
    Ok(nodes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TodoOrder {
    #[default]
    Priority,
    ColorThenPriority,
}

#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    /// Every term must appear in the name or the breadcrumb.
    pub terms: Vec<String>,
    pub include_completed: bool,
    pub order: TodoOrder,
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Todo-layout nodes anywhere below the WIP root.
pub fn list_todos(conn: &Connection, wip_node_id: &str, filter: &TodoFilter) -> Result<Vec<CachedNode>> {
    let mut sql = format!(
        "WITH RECURSIVE scope(id) AS (
             SELECT ?1
             UNION
             SELECT n.id FROM node_cache n JOIN scope s ON n.parent_id = s.id
         )
         SELECT {NODE_COLUMNS} FROM node_cache
         WHERE layout_mode = 'todo'
           AND id IN (SELECT id FROM scope)"
    );
    if !filter.include_completed {
        sql.push_str(" AND completed_at IS NULL");
    }

    let mut args = vec![wip_node_id.to_string()];
    for term in &filter.terms {
        args.push(like_pattern(term));
        let idx = args.len();
        sql.push_str(&format!(
            " AND (name LIKE ?{idx} ESCAPE '\\' OR breadcrumb LIKE ?{idx} ESCAPE '\\')"
        ));
    }
    sql.push_str(match filter.order {
        TodoOrder::Priority => " ORDER BY priority",
        TodoOrder::ColorThenPriority => " ORDER BY color_priority, priority",
    });

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), node_from_row)?;
    Ok(collect_rows("node_cache", rows))
}

/// Set or clear the completion timestamp. Returns false if the node isn't cached.
pub fn set_completed(conn: &Connection, id: &str, completed_at: Option<i64>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE node_cache SET completed_at = ?2 WHERE id = ?1",
        params![id, completed_at],
    )?;
    Ok(changed > 0)
}

/// Store a renamed node together with the fields derived from its name.
pub fn update_name(
    conn: &Connection,
    id: &str,
    name: &str,
    status_tag: Option<&str>,
    color_priority: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE node_cache SET name = ?2, status_tag = ?3, color_priority = ?4 WHERE id = ?1",
        params![id, name, status_tag, color_priority],
    )?;
    Ok(changed > 0)
}

pub fn delete_node(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM node_cache WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

pub fn add_filter(conn: &Connection, filter_text: &str, now: i64) -> Result<FilterHistoryEntry> {
    conn.execute(
        "INSERT INTO filter_history (filter_text, used_at) VALUES (?1, ?2)",
        params![filter_text, now],
    )?;
    Ok(FilterHistoryEntry {
        id: conn.last_insert_rowid(),
        filter_text: filter_text.to_string(),
        used_at: now,
    })
}

/// Most recent filters first.
pub fn recent_filters(conn: &Connection, limit: usize) -> Result<Vec<FilterHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, filter_text, used_at FROM filter_history
         ORDER BY used_at DESC, id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok(FilterHistoryEntry {
            id: row.get(0)?,
            filter_text: row.get(1)?,
            used_at: row.get(2)?,
        })
    })?;
    Ok(collect_rows("filter_history", rows))
}
