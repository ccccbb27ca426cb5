//! Hierarchy record and query-view types.
//!
//! [`Node`] is the canonical row as read from the source. [`TreeNode`] is the
//! per-query view: it adds a `level` relative to the query root and the
//! materialized `children`. A [`Subtree`] is an insertion-ordered, id-keyed
//! collection of tree nodes and serializes as a plain JSON array.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a row in the hierarchy table.
pub type NodeId = i64;

/// Parent side of a row: either the synthetic root or another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRef {
    Root,
    Node(NodeId),
}

impl ParentRef {
    /// Interpret a raw parent column value. Null and `0` both mean top-level.
    pub fn from_raw(raw: Option<NodeId>) -> Self {
        match raw {
            None | Some(0) => Self::Root,
            Some(id) => Self::Node(id),
        }
    }

    pub fn id(self) -> Option<NodeId> {
        match self {
            Self::Root => None,
            Self::Node(id) => Some(id),
        }
    }

    pub fn is_root(self) -> bool {
        matches!(self, Self::Root)
    }
}

impl Serialize for ParentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParentRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<NodeId>::deserialize(deserializer).map(Self::from_raw)
    }
}

/// One row of the hierarchy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent_id: ParentRef,
    pub name: String,
}

impl Node {
    /// Build a row using the raw column convention (`parent_id == 0` is top-level).
    pub fn new(id: NodeId, parent_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: ParentRef::from_raw(Some(parent_id)),
            name: name.into(),
        }
    }
}

/// A node inside a materialized (sub)tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub parent_id: ParentRef,
    pub name: String,
    /// Depth relative to the root of the query that produced this node.
    pub level: u32,
    #[serde(default)]
    pub children: Subtree,
}

impl TreeNode {
    pub fn new(node: &Node, level: u32, children: Subtree) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            level,
            children,
        }
    }

    /// Count nodes in this branch, self included.
    pub fn node_count(&self) -> usize {
        1 + self.children.node_count()
    }
}

/// Insertion-ordered mapping from node id to [`TreeNode`].
///
/// Keeps an id → position index next to the ordered nodes so keyed insert and
/// lookup stay constant-time on wide levels.
#[derive(Debug, Clone, Default)]
pub struct Subtree {
    nodes: Vec<TreeNode>,
    positions: HashMap<NodeId, usize>,
}

impl Subtree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of nodes at every level.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(TreeNode::node_count).sum()
    }

    /// Insert keyed by id. An existing entry with the same id is replaced in place.
    pub fn insert(&mut self, node: TreeNode) {
        match self.positions.get(&node.id) {
            Some(&pos) => self.nodes[pos] = node,
            None => self.push_unique(node),
        }
    }

    /// Append without the id check. Callers guarantee `node.id` is not present.
    pub(crate) fn push_unique(&mut self, node: TreeNode) {
        self.positions.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    /// Top-level lookup.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.positions.get(&id).map(|&pos| &self.nodes[pos])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Depth-first lookup at any level.
    pub fn find(&self, id: NodeId) -> Option<&TreeNode> {
        for node in &self.nodes {
            if node.id == id {
                return Some(node);
            }
            if let Some(found) = node.children.find(id) {
                return Some(found);
            }
        }
        None
    }

    /// Top-level ids in order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeNode> {
        self.nodes.iter()
    }
}

impl PartialEq for Subtree {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for Subtree {}

impl Serialize for Subtree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.nodes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Subtree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<TreeNode>::deserialize(deserializer).map(|nodes| nodes.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Subtree {
    type Item = &'a TreeNode;
    type IntoIter = std::slice::Iter<'a, TreeNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl IntoIterator for Subtree {
    type Item = TreeNode;
    type IntoIter = std::vec::IntoIter<TreeNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl FromIterator<TreeNode> for Subtree {
    fn from_iter<I: IntoIterator<Item = TreeNode>>(iter: I) -> Self {
        let mut subtree = Subtree::new();
        for node in iter {
            subtree.insert(node);
        }
        subtree
    }
}
