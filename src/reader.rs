//! Read-only hierarchical queries over a loaded [`TreeIndex`].
//!
//! Every query builds a fresh, owned [`Subtree`]; levels in the result are
//! relative to the query, not the absolute depth in the hierarchy. Missing
//! ids are reported as `None` or an empty subtree, never as errors.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::schema::{Node, NodeId, ParentRef, Subtree, TreeNode};
use crate::source::{RowSource, SourceError};
use crate::tree::{Depth, TreeIndex};

/// Default separator for [`TreeReader::path`].
pub const DEFAULT_PATH_SEPARATOR: &str = ">";

/// Knobs for [`TreeReader::sub_tree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubTreeOptions {
    /// Start the result at the parent's children instead of the parent itself.
    pub exclude_parent: bool,
    /// Counted from the parent: `Bounded(1)` is the parent plus its direct children.
    pub depth: Depth,
    /// Ids dropped from the result together with their descendants.
    pub exclude_ids: HashSet<NodeId>,
}

impl SubTreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_parent(mut self, exclude_parent: bool) -> Self {
        self.exclude_parent = exclude_parent;
        self
    }

    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    pub fn exclude(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }
}

/// Loaded hierarchy answering node, subtree, sibling and path queries.
#[derive(Debug, Clone, Default)]
pub struct TreeReader {
    index: TreeIndex,
}

impl TreeReader {
    /// Build from rows already in memory.
    pub fn from_rows(rows: impl IntoIterator<Item = Node>) -> Self {
        Self {
            index: TreeIndex::build(rows),
        }
    }

    /// Perform the single bulk read from `source` and build the indexes.
    pub async fn load<S: RowSource + ?Sized>(source: &S) -> Result<Self, SourceError> {
        debug!("Loading hierarchy from {}", source.name());
        let rows = source.fetch_rows().await?;
        Ok(Self::from_rows(rows))
    }

    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    /// Number of distinct nodes loaded.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Single row by id, without level or children.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.node(id)
    }

    /// The whole hierarchy as materialized at load time.
    pub fn full_tree(&self) -> &Subtree {
        self.index.full_tree()
    }

    /// Subtree under `parent`.
    ///
    /// With `exclude_parent` (or when `parent` is the root) the children become
    /// the top level at level 0. Otherwise the result is a single entry for the
    /// parent at level 0, or empty if the parent does not exist.
    pub fn sub_tree(&self, parent: ParentRef, opts: &SubTreeOptions) -> Subtree {
        let parent_id = match parent {
            ParentRef::Node(id) if !opts.exclude_parent => id,
            _ => return self.index.materialize(parent, 0, opts.depth, &opts.exclude_ids),
        };

        let mut tree = Subtree::new();
        if let Some(node) = self.index.node(parent_id) {
            let children = self
                .index
                .materialize(parent, 1, opts.depth, &opts.exclude_ids);
            tree.insert(TreeNode::new(node, 0, children));
        }
        tree
    }

    /// Nodes sharing `id`'s parent, one level deep. Unknown ids give an empty result.
    pub fn siblings(&self, id: NodeId, exclude_self: bool) -> Subtree {
        let Some(node) = self.index.node(id) else {
            return Subtree::new();
        };

        let mut opts = SubTreeOptions::new()
            .exclude_parent(true)
            .depth(Depth::Bounded(1));
        if exclude_self {
            opts = opts.exclude([id]);
        }
        self.sub_tree(node.parent_id, &opts)
    }

    /// Ancestor names from the top-level node down to `id`, joined by ` {separator} `.
    ///
    /// The walk stops at a top-level node or at a parent id that was never loaded.
    pub fn path(&self, id: NodeId, separator: &str) -> Option<String> {
        let mut node = self.index.node(id)?;
        let mut names = vec![node.name.as_str()];
        let mut visited = HashSet::from([node.id]);

        while let ParentRef::Node(parent_id) = node.parent_id {
            let Some(parent) = self.index.node(parent_id) else {
                break;
            };
            if !visited.insert(parent.id) {
                warn!("Ancestor cycle through node {}; path truncated", parent.id);
                break;
            }
            names.push(parent.name.as_str());
            node = parent;
        }

        names.reverse();
        Some(names.join(format!(" {} ", separator).as_str()))
    }
}
