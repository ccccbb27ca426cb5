//! Tree Reader - HTTP demo server over a hierarchy loaded at startup.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tree_reader::config::AppConfig;
use tree_reader::reader::DEFAULT_PATH_SEPARATOR;
use tree_reader::{
    render_list, render_select, Depth, Node, NodeId, ParentRef, RenderOptions, SubTreeOptions,
    Subtree, TreeReader,
};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    reader: Arc<TreeReader>,
    render: Arc<RenderOptions>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tree_reader=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let source = config.row_source()?;

    // One bulk read; the tree is immutable afterwards
    let reader = TreeReader::load(source.as_ref())
        .await
        .with_context(|| format!("Failed to load hierarchy from {}", source.name()))?;
    info!(
        "Loaded {} nodes ({} top-level)",
        reader.len(),
        reader.full_tree().len()
    );

    let state = AppState {
        reader: Arc::new(reader),
        render: Arc::new(config.render.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(demo))
        .route("/health", get(health))
        .route("/tree", get(full_tree))
        .route("/nodes/:id", get(get_node))
        .route("/nodes/:id/subtree", get(get_sub_tree))
        .route("/nodes/:id/siblings", get(get_siblings))
        .route("/nodes/:id/path", get(get_path))
        .route("/render/list", get(list_html))
        .route("/render/select", get(select_html))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// The full cached tree.
async fn full_tree(State(state): State<AppState>) -> Json<Subtree> {
    Json(state.reader.full_tree().clone())
}

/// A single row.
async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<Node>, StatusCode> {
    state
        .reader
        .node(id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Default, Deserialize)]
struct TreeQuery {
    #[serde(default)]
    exclude_parent: bool,
    /// Negative means unlimited.
    depth: Option<i64>,
    /// Comma-separated ids.
    exclude: Option<String>,
}

impl TreeQuery {
    fn options(&self) -> Result<SubTreeOptions, String> {
        let depth = self.depth.map(Depth::from_raw).unwrap_or_default();
        let exclude = match &self.exclude {
            Some(raw) => parse_ids(raw)?,
            None => HashSet::new(),
        };
        Ok(SubTreeOptions::new()
            .exclude_parent(self.exclude_parent)
            .depth(depth)
            .exclude(exclude))
    }
}

/// Subtree under a node. Id `0` addresses the root.
async fn get_sub_tree(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<Subtree>, (StatusCode, String)> {
    let opts = query.options().map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(Json(state.reader.sub_tree(parent_ref(id), &opts)))
}

#[derive(Debug, Default, Deserialize)]
struct SiblingsQuery {
    #[serde(default)]
    exclude_self: bool,
}

/// Nodes on the same level under the same parent.
async fn get_siblings(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Query(query): Query<SiblingsQuery>,
) -> Json<Subtree> {
    Json(state.reader.siblings(id, query.exclude_self))
}

#[derive(Debug, Default, Deserialize)]
struct PathQuery {
    separator: Option<String>,
}

#[derive(Debug, Serialize)]
struct PathResponse {
    id: NodeId,
    path: String,
}

/// Ancestor names down to the node.
async fn get_path(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Query(query): Query<PathQuery>,
) -> Result<Json<PathResponse>, StatusCode> {
    let separator = query.separator.as_deref().unwrap_or(DEFAULT_PATH_SEPARATOR);
    state
        .reader
        .path(id, separator)
        .map(|path| Json(PathResponse { id, path }))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Default, Deserialize)]
struct RenderQuery {
    /// Render the full tree when absent.
    parent: Option<NodeId>,
    #[serde(default)]
    exclude_parent: bool,
    depth: Option<i64>,
    exclude: Option<String>,
    list_class: Option<String>,
    name: Option<String>,
    marker: Option<String>,
}

impl RenderQuery {
    fn tree(&self, reader: &TreeReader) -> Result<Subtree, String> {
        let Some(parent) = self.parent else {
            return Ok(reader.full_tree().clone());
        };
        let query = TreeQuery {
            exclude_parent: self.exclude_parent,
            depth: self.depth,
            exclude: self.exclude.clone(),
        };
        Ok(reader.sub_tree(parent_ref(parent), &query.options()?))
    }

    fn render_options(&self, base: &RenderOptions) -> RenderOptions {
        let mut opts = base.clone();
        if let Some(class) = &self.list_class {
            opts.list_class = class.clone();
        }
        if let Some(name) = &self.name {
            opts.control_name = name.clone();
        }
        if let Some(marker) = &self.marker {
            opts.level_marker = marker.clone();
        }
        opts
    }
}

/// Nested `<ul>` rendering.
async fn list_html(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
) -> Result<Html<String>, (StatusCode, String)> {
    let tree = query
        .tree(&state.reader)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(Html(render_list(&tree, &query.render_options(&state.render))))
}

/// `<select>` rendering.
async fn select_html(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
) -> Result<Html<String>, (StatusCode, String)> {
    let tree = query
        .tree(&state.reader)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(Html(render_select(&tree, &query.render_options(&state.render))))
}

#[derive(Debug, Deserialize)]
struct DemoQuery {
    #[serde(default = "default_demo_parent")]
    parent: NodeId,
    #[serde(default = "default_demo_sibling")]
    sibling: NodeId,
    #[serde(default = "default_demo_node")]
    node: NodeId,
    #[serde(default = "default_demo_missing")]
    missing: NodeId,
}

fn default_demo_parent() -> NodeId {
    1
}

fn default_demo_sibling() -> NodeId {
    3
}

fn default_demo_node() -> NodeId {
    5
}

fn default_demo_missing() -> NodeId {
    59
}

/// Walkthrough page showing every query with both renderers.
async fn demo(State(state): State<AppState>, Query(query): Query<DemoQuery>) -> Html<String> {
    Html(demo_page(&state.reader, &state.render, &query))
}

// ============================================================================
// Helper functions
// ============================================================================

/// The root is addressed as id `0`, following the table convention.
fn parent_ref(id: NodeId) -> ParentRef {
    ParentRef::from_raw(Some(id))
}

/// Parse a comma-separated id list, ignoring blanks.
fn parse_ids(raw: &str) -> Result<HashSet<NodeId>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<NodeId>().map_err(|_| format!("Invalid node id: {}", s)))
        .collect()
}

fn demo_page(reader: &TreeReader, opts: &RenderOptions, query: &DemoQuery) -> String {
    let mut sections: Vec<(String, Subtree)> = vec![
        ("Full tree".to_string(), reader.full_tree().clone()),
        (
            "Subtree: including parent, depth 1".to_string(),
            reader.sub_tree(
                parent_ref(query.parent),
                &SubTreeOptions::new().depth(Depth::Bounded(1)),
            ),
        ),
        (
            "Subtree: excluding parent, unlimited depth".to_string(),
            reader.sub_tree(parent_ref(query.parent), &SubTreeOptions::new().exclude_parent(true)),
        ),
        (
            "Subtree: unexisting parent".to_string(),
            reader.sub_tree(
                parent_ref(query.missing),
                &SubTreeOptions::new().depth(Depth::Bounded(1)),
            ),
        ),
    ];
    sections.push(("Siblings".to_string(), reader.siblings(query.sibling, false)));
    sections.push((
        "Siblings: excluding node".to_string(),
        reader.siblings(query.sibling, true),
    ));

    let mut html = String::from("<!DOCTYPE html><html><head><title>Tree Reader</title></head><body>");
    for (title, tree) in &sections {
        html.push_str(&format!("<h2>{}</h2>", title));
        html.push_str(&render_list(tree, opts));
        html.push_str(&render_select(tree, opts));
        html.push_str("<hr/>");
    }

    html.push_str("<h2>Getting node</h2><pre>");
    match reader.node(query.node) {
        Some(node) => html.push_str(&serde_json::to_string_pretty(node).unwrap_or_default()),
        None => html.push_str("Not found"),
    }
    html.push_str("</pre>");

    if let Some(path) = reader.path(query.node, DEFAULT_PATH_SEPARATOR) {
        html.push_str(&format!("<h2>Path</h2><p>{}</p>", path));
    }

    html.push_str("</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let reader = TreeReader::from_rows(vec![
            Node::new(1, 0, "A"),
            Node::new(2, 1, "B"),
            Node::new(3, 1, "C"),
            Node::new(4, 2, "D"),
            Node::new(5, 3, "E"),
        ]);
        AppState {
            reader: Arc::new(reader),
            render: Arc::new(RenderOptions::default()),
        }
    }

    #[test]
    fn test_parse_ids() {
        let ids = parse_ids("1, 2,,3 ").unwrap();
        assert_eq!(ids, HashSet::from([1, 2, 3]));
        assert!(parse_ids("").unwrap().is_empty());
        assert!(parse_ids("1,x").is_err());
    }

    #[test]
    fn test_tree_query_options() {
        let query = TreeQuery {
            exclude_parent: true,
            depth: Some(-1),
            exclude: Some("4".to_string()),
        };
        let opts = query.options().unwrap();
        assert!(opts.exclude_parent);
        assert_eq!(opts.depth, Depth::Unbounded);
        assert!(opts.exclude_ids.contains(&4));

        assert_eq!(TreeQuery::default().options().unwrap(), SubTreeOptions::new());
    }

    #[tokio::test]
    async fn test_get_node() {
        let Json(node) = get_node(State(test_state()), Path(4)).await.unwrap();
        assert_eq!(node.name, "D");

        let missing = get_node(State(test_state()), Path(99)).await;
        assert!(matches!(missing, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn test_get_sub_tree_root_and_bad_query() {
        let Json(tree) = get_sub_tree(State(test_state()), Path(0), Query(TreeQuery::default()))
            .await
            .unwrap();
        assert_eq!(tree.ids(), vec![1]);

        let bad = TreeQuery {
            exclude: Some("nope".to_string()),
            ..TreeQuery::default()
        };
        let err = get_sub_tree(State(test_state()), Path(1), Query(bad)).await;
        assert!(matches!(err, Err((StatusCode::BAD_REQUEST, _))));
    }

    #[tokio::test]
    async fn test_get_siblings_and_path() {
        let Json(siblings) = get_siblings(
            State(test_state()),
            Path(3),
            Query(SiblingsQuery { exclude_self: true }),
        )
        .await;
        assert_eq!(siblings.ids(), vec![2]);

        let Json(resp) = get_path(State(test_state()), Path(5), Query(PathQuery::default()))
            .await
            .unwrap();
        assert_eq!(resp.path, "A > C > E");

        let missing = get_path(State(test_state()), Path(42), Query(PathQuery::default())).await;
        assert!(matches!(missing, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn test_render_endpoints() {
        let query = RenderQuery {
            parent: Some(59),
            ..RenderQuery::default()
        };
        let Html(body) = list_html(State(test_state()), Query(query)).await.unwrap();
        assert_eq!(body, "Empty tree");

        let query = RenderQuery {
            parent: Some(1),
            depth: Some(1),
            name: Some("pick".to_string()),
            marker: Some("*".to_string()),
            ..RenderQuery::default()
        };
        let Html(body) = select_html(State(test_state()), Query(query)).await.unwrap();
        assert!(body.starts_with("<select name=pick>"));
        assert!(body.contains("<option value=\"3\">*C</option>"));
        assert!(!body.contains("value=\"5\""));
    }

    #[test]
    fn test_demo_page_sections() {
        let state = test_state();
        let query = DemoQuery {
            parent: default_demo_parent(),
            sibling: default_demo_sibling(),
            node: default_demo_node(),
            missing: default_demo_missing(),
        };
        let html = demo_page(&state.reader, &state.render, &query);

        assert!(html.contains("<h2>Full tree</h2>"));
        assert!(html.contains("<h2>Subtree: unexisting parent</h2>Empty treeEmpty tree<hr/>"));
        assert!(html.contains("<h2>Siblings: excluding node</h2><ul class=\"tree level-0\"><li class=\"node-2\">B</li></ul>"));
        assert!(html.contains("\"name\": \"E\""));
        assert!(html.contains("<p>A > C > E</p>"));
    }
}
