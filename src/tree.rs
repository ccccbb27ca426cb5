//! Index construction and recursive subtree materialization.
//!
//! A [`TreeIndex`] is built once from the flat row set and never changes
//! afterwards. It holds the row-by-id map, the rows grouped by parent (in
//! source order) and the fully materialized tree hanging off the root.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::schema::{Node, NodeId, ParentRef, Subtree, TreeNode};

/// How far a materialization may descend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Depth {
    #[default]
    Unbounded,
    Bounded(u32),
}

impl Depth {
    /// Map the legacy integer convention: negative means unlimited.
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::Unbounded
        } else {
            Self::Bounded(u32::try_from(raw).unwrap_or(u32::MAX))
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Bounded(0))
    }

    /// Depth left for the next level down.
    pub fn descend(self) -> Self {
        match self {
            Self::Unbounded => Self::Unbounded,
            Self::Bounded(n) => Self::Bounded(n.saturating_sub(1)),
        }
    }
}

/// Immutable indexes over one bulk read of the hierarchy table.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    by_id: HashMap<NodeId, Node>,
    children_of: HashMap<ParentRef, Vec<Node>>,
    full_tree: Subtree,
}

impl TreeIndex {
    /// Build all indexes in a single pass over `rows`.
    ///
    /// Duplicate ids follow last-write-wins: `by_id` keeps the last row, and
    /// within one parent group the later row replaces the earlier one in place.
    pub fn build(rows: impl IntoIterator<Item = Node>) -> Self {
        let mut by_id: HashMap<NodeId, Node> = HashMap::new();
        let mut children_of: HashMap<ParentRef, Vec<Node>> = HashMap::new();
        let mut positions: HashMap<(ParentRef, NodeId), usize> = HashMap::new();
        let mut row_count = 0usize;
        let mut duplicates = 0usize;

        for row in rows {
            row_count += 1;
            let group = children_of.entry(row.parent_id).or_default();
            match positions.get(&(row.parent_id, row.id)) {
                Some(&pos) => group[pos] = row.clone(),
                None => {
                    positions.insert((row.parent_id, row.id), group.len());
                    group.push(row.clone());
                }
            }
            if by_id.insert(row.id, row).is_some() {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            warn!("{} duplicate node id(s) in source rows; last row wins", duplicates);
        }

        let orphans = by_id
            .values()
            .filter(|n| matches!(n.parent_id, ParentRef::Node(p) if !by_id.contains_key(&p)))
            .count();
        if orphans > 0 {
            debug!("{} node(s) reference a missing parent and are unreachable from the root", orphans);
        }

        let mut index = Self {
            by_id,
            children_of,
            full_tree: Subtree::new(),
        };
        index.full_tree = index.materialize(ParentRef::Root, 0, Depth::Unbounded, &HashSet::new());

        info!(
            "Built tree index: {} rows, {} nodes, {} top-level, {} reachable",
            row_count,
            index.by_id.len(),
            index.full_tree.len(),
            index.full_tree.node_count()
        );

        index
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.by_id.get(&id)
    }

    /// Direct children of `parent` in source order.
    pub fn children_of(&self, parent: ParentRef) -> &[Node] {
        self.children_of
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The tree materialized from the root at build time.
    pub fn full_tree(&self) -> &Subtree {
        &self.full_tree
    }

    /// Number of distinct node ids.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Materialize the children of `parent` as a nested subtree.
    ///
    /// Returned nodes get `level`, their children `level + 1`, and so on.
    /// Each step consumes one unit of `depth`. Any id in `excluded` is dropped
    /// together with its whole branch. A node that reappears among its own
    /// ancestors is skipped so malformed (cyclic) input still terminates.
    pub fn materialize(
        &self,
        parent: ParentRef,
        level: u32,
        depth: Depth,
        excluded: &HashSet<NodeId>,
    ) -> Subtree {
        let mut branch: HashSet<NodeId> = parent.id().into_iter().collect();
        self.materialize_branch(parent, level, depth, excluded, &mut branch)
    }

    fn materialize_branch(
        &self,
        parent: ParentRef,
        level: u32,
        depth: Depth,
        excluded: &HashSet<NodeId>,
        branch: &mut HashSet<NodeId>,
    ) -> Subtree {
        let mut subtree = Subtree::new();
        if depth.is_exhausted() {
            return subtree;
        }

        for child in self.children_of(parent) {
            if excluded.contains(&child.id) {
                continue;
            }
            if !branch.insert(child.id) {
                warn!(
                    "Node {} is its own ancestor (via {:?}); branch truncated",
                    child.id, parent
                );
                continue;
            }
            let children = self.materialize_branch(
                ParentRef::Node(child.id),
                level + 1,
                depth.descend(),
                excluded,
                branch,
            );
            branch.remove(&child.id);
            subtree.push_unique(TreeNode::new(child, level, children));
        }

        subtree
    }
}
