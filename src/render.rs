//! HTML renderers over a [`Subtree`]: nested list and select box.
//!
//! Pure string formatting. Node names are emitted verbatim.

use crate::schema::{Subtree, TreeNode};

pub const DEFAULT_EMPTY_TREE_MSG: &str = "Empty tree";

/// Presentation settings shared by both renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Returned instead of markup when the tree is empty.
    pub empty_tree_msg: String,
    /// Class of the outermost `<ul>`.
    pub list_class: String,
    /// `name` attribute of the `<select>`.
    pub control_name: String,
    /// Repeated `level` times in front of each option label.
    pub level_marker: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            empty_tree_msg: DEFAULT_EMPTY_TREE_MSG.to_string(),
            list_class: "tree".to_string(),
            control_name: "tree".to_string(),
            level_marker: "-".to_string(),
        }
    }
}

/// `<ul class="{list_class} level-0">` with one nested `<ul>` per child level.
pub fn render_list(tree: &Subtree, opts: &RenderOptions) -> String {
    if tree.is_empty() {
        return opts.empty_tree_msg.clone();
    }

    let mut html = format!("<ul class=\"{} level-0\">", opts.list_class);
    for node in tree {
        push_list_item(&mut html, node);
        push_list_children(&mut html, node);
    }
    html.push_str("</ul>");
    html
}

/// `<select>` with a placeholder option followed by every node in pre-order.
pub fn render_select(tree: &Subtree, opts: &RenderOptions) -> String {
    if tree.is_empty() {
        return opts.empty_tree_msg.clone();
    }

    let mut html = format!("<select name={}>", opts.control_name);
    html.push_str("<option value=\"0\">-- Select Item --</option>");
    for node in tree {
        push_select_options(&mut html, node, &opts.level_marker);
    }
    html.push_str("</select>");
    html
}

fn push_list_item(html: &mut String, node: &TreeNode) {
    html.push_str(&format!("<li class=\"node-{}\">{}</li>", node.id, node.name));
}

fn push_list_children(html: &mut String, node: &TreeNode) {
    if node.children.is_empty() {
        return;
    }
    html.push_str(&format!("<ul class=\"level-{}\">", node.level + 1));
    for child in &node.children {
        push_list_item(html, child);
        push_list_children(html, child);
    }
    html.push_str("</ul>");
}

fn push_select_options(html: &mut String, node: &TreeNode, level_marker: &str) {
    html.push_str(&format!(
        "<option value=\"{}\">{}{}</option>",
        node.id,
        level_marker.repeat(node.level as usize),
        node.name
    ));
    for child in &node.children {
        push_select_options(html, child, level_marker);
    }
}
