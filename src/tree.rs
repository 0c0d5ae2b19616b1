use std::collections::{HashMap, HashSet};

use crate::tags::strip_status_tags;
use crate::types::{CachedNode, NodeTree, RemoteNode};

/// Upper bound on ancestors walked per node; guards against parent cycles.
pub const MAX_BREADCRUMB_DEPTH: usize = 10;

pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// id → node for one export batch.
pub type NodeLookup<'a> = HashMap<&'a str, &'a RemoteNode>;

pub fn build_lookup(nodes: &[RemoteNode]) -> NodeLookup<'_> {
    nodes.iter().map(|n| (n.id.as_str(), n)).collect()
}

/// Ancestor names of `node_id`, root first, tags stripped, excluding the
/// node itself. Unknown ids and broken parent links end the walk early.
pub fn compute_breadcrumb(node_id: &str, lookup: &NodeLookup<'_>, max_depth: usize) -> String {
    let Some(node) = lookup.get(node_id) else {
        return String::new();
    };

    let mut path = Vec::new();
    let mut current = node.parent_id.as_deref();
    let mut depth = 0;

    while let Some(parent_id) = current {
        if depth >= max_depth {
            break;
        }
        let Some(parent) = lookup.get(parent_id) else {
            break;
        };
        let clean = strip_status_tags(parent.name_str());
        if !clean.is_empty() {
            path.push(clean);
        }
        current = parent.parent_id.as_deref();
        depth += 1;
    }

    path.reverse();
    path.join(BREADCRUMB_SEPARATOR)
}

/// The node named exactly "WIP" (trimmed, any case). First one wins.
pub fn find_wip_root(nodes: &[RemoteNode]) -> Option<&RemoteNode> {
    nodes
        .iter()
        .find(|n| n.name_str().trim().eq_ignore_ascii_case("wip"))
}

/// parent id → children sorted by priority. Top-level nodes sit under `None`.
pub fn build_node_tree(nodes: &[CachedNode]) -> HashMap<Option<&str>, Vec<&CachedNode>> {
    let mut tree: HashMap<Option<&str>, Vec<&CachedNode>> = HashMap::new();
    for node in nodes {
        tree.entry(node.parent_id.as_deref()).or_default().push(node);
    }
    for children in tree.values_mut() {
        children.sort_by_key(|n| n.priority);
    }
    tree
}

/// Nested view of the subtree rooted at `root_id`, at full depth. A node is
/// emitted at most once, so malformed parent links can't recurse forever.
pub fn subtree(nodes: &[CachedNode], root_id: &str) -> Option<NodeTree> {
    let tree = build_node_tree(nodes);
    let root = nodes.iter().find(|n| n.id == root_id)?;
    let mut visited = HashSet::from([root.id.as_str()]);
    Some(assemble(root, &tree, &mut visited))
}

fn assemble<'a>(
    node: &'a CachedNode,
    tree: &HashMap<Option<&'a str>, Vec<&'a CachedNode>>,
    visited: &mut HashSet<&'a str>,
) -> NodeTree {
    let mut children = Vec::new();
    for &kid in tree.get(&Some(node.id.as_str())).into_iter().flatten() {
        if visited.insert(kid.id.as_str()) {
            children.push(assemble(kid, tree, visited));
        }
    }
    NodeTree {
        node: node.clone(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, name: &str, parent: Option<&str>) -> RemoteNode {
        RemoteNode {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            name: Some(name.to_string()),
            note: None,
            priority: 0,
            data: serde_json::Value::Null,
            created_at: None,
            modified_at: None,
            completed_at: None,
        }
    }

    fn sample() -> Vec<RemoteNode> {
        vec![
            node("root", "WIP", None),
            node("p", "PERSONAL", Some("root")),
            node("t", "Fix bug #TODO", Some("p")),
        ]
    }

    #[test]
    fn breadcrumb_of_sample_task() {
        let nodes = sample();
        let lookup = build_lookup(&nodes);
        assert_eq!(
            compute_breadcrumb("t", &lookup, MAX_BREADCRUMB_DEPTH),
            "WIP > PERSONAL"
        );
        assert_eq!(compute_breadcrumb("p", &lookup, MAX_BREADCRUMB_DEPTH), "WIP");
    }

    #[test]
    fn breadcrumb_of_root_is_empty() {
        let nodes = sample();
        let lookup = build_lookup(&nodes);
        assert_eq!(compute_breadcrumb("root", &lookup, MAX_BREADCRUMB_DEPTH), "");
        assert_eq!(compute_breadcrumb("missing", &lookup, MAX_BREADCRUMB_DEPTH), "");
    }

    #[test]
    fn breadcrumb_strips_tags_from_ancestors() {
        let nodes = vec![
            node("a", "Project #WIP", None),
            node("b", "Sub #blocked", Some("a")),
            node("c", "Leaf", Some("b")),
        ];
        let lookup = build_lookup(&nodes);
        let crumb = compute_breadcrumb("c", &lookup, MAX_BREADCRUMB_DEPTH);
        assert_eq!(crumb, "Project > Sub");
        assert!(!crumb.contains('#'));
    }

    #[test]
    fn breadcrumb_stops_at_missing_parent() {
        let nodes = vec![node("a", "Orphan parent", Some("gone")), node("b", "Child", Some("a"))];
        let lookup = build_lookup(&nodes);
        assert_eq!(compute_breadcrumb("b", &lookup, MAX_BREADCRUMB_DEPTH), "Orphan parent");
    }

    #[test]
    fn breadcrumb_is_bounded_on_cycles() {
        let nodes = vec![node("a", "A", Some("b")), node("b", "B", Some("a"))];
        let lookup = build_lookup(&nodes);
        let crumb = compute_breadcrumb("a", &lookup, 4);
        assert_eq!(crumb.split(BREADCRUMB_SEPARATOR).count(), 4);
    }

    #[test]
    fn wip_root_requires_exact_name() {
        let nodes = vec![
            node("x", "WIP stuff", None),
            node("y", "#WIP", None),
            node("z", "  wip ", None),
        ];
        assert_eq!(find_wip_root(&nodes).map(|n| n.id.as_str()), Some("z"));

        let near = vec![node("x", "WIP stuff", None), node("y", "WIPE", None)];
        assert!(find_wip_root(&near).is_none());
    }

    fn cached(id: &str, parent: Option<&str>, priority: i64) -> CachedNode {
        CachedNode {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            name: Some(id.to_uppercase()),
            note: None,
            priority,
            layout_mode: None,
            completed_at: None,
            created_at: None,
            modified_at: None,
            cached_at: 0,
            breadcrumb: String::new(),
            status_tag: None,
            color_priority: 99,
        }
    }

    #[test]
    fn tree_groups_and_sorts_children() {
        let nodes = vec![
            cached("root", None, 0),
            cached("b", Some("root"), 2),
            cached("a", Some("root"), 1),
            cached("c", Some("a"), 0),
        ];
        let tree = build_node_tree(&nodes);
        let kids: Vec<_> = tree[&Some("root")].iter().map(|n| n.id.as_str()).collect();
        assert_eq!(kids, ["a", "b"]);
        assert_eq!(tree[&None].len(), 1);

        let nested = subtree(&nodes, "root").unwrap();
        assert_eq!(nested.children.len(), 2);
        assert_eq!(nested.children[0].children[0].node.id, "c");
        assert!(subtree(&nodes, "nope").is_none());
    }

    #[test]
    fn subtree_keeps_deep_chains() {
        let mut nodes = vec![cached("n0", None, 0)];
        for i in 1..14 {
            nodes.push(cached(&format!("n{i}"), Some(&format!("n{}", i - 1)), 0));
        }
        let mut depth = 0;
        let mut cur = subtree(&nodes, "n0").unwrap();
        while let Some(next) = cur.children.pop() {
            depth += 1;
            cur = next;
        }
        assert_eq!(depth, 13);
        assert_eq!(cur.node.id, "n13");
    }

    #[test]
    fn subtree_emits_cyclic_nodes_once() {
        let nodes = vec![
            cached("a", Some("b"), 0),
            cached("b", Some("a"), 0),
            cached("c", Some("b"), 1),
        ];
        let nested = subtree(&nodes, "a").unwrap();
        assert_eq!(nested.children.len(), 1);
        let b = &nested.children[0];
        assert_eq!(b.node.id, "b");
        let under_b: Vec<_> = b.children.iter().map(|n| n.node.id.as_str()).collect();
        assert_eq!(under_b, ["c"]);
    }
}
