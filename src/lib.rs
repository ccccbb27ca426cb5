//! Tree Reader - in-memory hierarchy views over a self-referential parent/child table.
//!
//! Rows `(id, parent_id, name)` are read once from a [`source::RowSource`],
//! indexed by [`tree::TreeIndex`] and queried through [`reader::TreeReader`].
//! [`render`] turns query results into nested-list or select-box HTML.

pub mod config;
pub mod reader;
pub mod render;
pub mod schema;
pub mod source;
pub mod tree;

pub use reader::{SubTreeOptions, TreeReader};
pub use render::{render_list, render_select, RenderOptions};
pub use schema::{Node, NodeId, ParentRef, Subtree, TreeNode};
pub use source::{RowSource, SourceError};
pub use tree::{Depth, TreeIndex};
