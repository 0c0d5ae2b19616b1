use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kanban status carried as a trailing `#TAG` in a node name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusTag {
    Backlog,
    Blocked,
    Todo,
    Wip,
    Test,
    Done,
}

impl StatusTag {
    /// Column order on the kanban board.
    pub const ALL: [StatusTag; 6] = [
        StatusTag::Backlog,
        StatusTag::Blocked,
        StatusTag::Todo,
        StatusTag::Wip,
        StatusTag::Test,
        StatusTag::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTag::Backlog => "BACKLOG",
            StatusTag::Blocked => "BLOCKED",
            StatusTag::Todo => "TODO",
            StatusTag::Wip => "WIP",
            StatusTag::Test => "TEST",
            StatusTag::Done => "DONE",
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status tag: {s}"))
    }
}

/// A node as returned by the remote export / get endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub priority: i64,
    /// Free-form object; only `layoutMode` is read from it.
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<i64>, // Unix seconds
    #[serde(default, rename = "modifiedAt")]
    pub modified_at: Option<i64>,
    #[serde(default, rename = "completedAt")]
    pub completed_at: Option<i64>,
}

impl RemoteNode {
    pub fn layout_mode(&self) -> Option<&str> {
        self.data.get("layoutMode").and_then(|v| v.as_str())
    }

    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Local projection of a remote node plus the fields derived at refresh time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: Option<String>,
    pub note: Option<String>,
    pub priority: i64,
    pub layout_mode: Option<String>,
    pub completed_at: Option<i64>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub cached_at: i64,
    pub breadcrumb: String,
    pub status_tag: Option<StatusTag>,
    pub color_priority: i64,
}

impl CachedNode {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Untagged nodes live in the backlog column.
    pub fn column(&self) -> StatusTag {
        self.status_tag.unwrap_or(StatusTag::Backlog)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipRoot {
    pub wip_node_id: String,
    pub discovered_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterHistoryEntry {
    pub id: i64,
    pub filter_text: String,
    pub used_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub nodes_cached: usize,
    pub wip_node_id: Option<String>,
}

/// Cached node with its children, used for the nested subtree view.
#[derive(Debug, Clone, Serialize)]
pub struct NodeTree {
    #[serde(flatten)]
    pub node: CachedNode,
    pub children: Vec<NodeTree>,
}

/// Where a created or moved node lands among its new siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Top,
    Bottom,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: StatusTag,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterHistoryCreate {
    pub filter_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNodeRequest {
    pub parent_id: String,
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveNodeRequest {
    pub parent_id: String,
    #[serde(default)]
    pub position: Position,
}
