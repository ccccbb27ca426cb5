//! Supabase / PostgREST reader for the hierarchy table.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{RowSource, SourceError, TableColumns};
use crate::schema::{Node, NodeId, ParentRef};

/// PostgREST caps responses server-side; read in pages no larger than this.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Reads `(id, parent_id, name)` rows from a table exposed over the Supabase REST API.
#[derive(Clone)]
pub struct SupabaseRowSource {
    client: Client,
    base_url: String,
    service_role_key: String,
    schema: Option<String>,
    table: String,
    columns: TableColumns,
    page_size: usize,
}

impl SupabaseRowSource {
    pub fn new(
        base_url: impl Into<String>,
        service_role_key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
            schema: None,
            table: table.into(),
            columns: TableColumns::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Create a source from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("SUPABASE_URL").map_err(|_| anyhow!("SUPABASE_URL not set"))?;
        let service_role_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| anyhow!("SUPABASE_SERVICE_ROLE_KEY not set"))?;
        let table = std::env::var("TREE_TABLE").unwrap_or_else(|_| "tree".to_string());

        let mut source = Self::new(base_url, service_role_key, table)
            .with_columns(TableColumns::from_env());
        if let Ok(schema) = std::env::var("TREE_DB_SCHEMA") {
            source = source.with_schema(schema);
        }
        Ok(source)
    }

    /// Read from a non-default Postgres schema (sent as `Accept-Profile`).
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_columns(mut self, columns: TableColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// REST path for one page. Columns are aliased so rows always decode as `id/parent_id/name`.
    fn page_path(&self, offset: usize) -> String {
        format!(
            "{}?select=id:{},parent_id:{},name:{}&order={}.asc&limit={}&offset={}",
            self.table,
            self.columns.id,
            self.columns.parent_id,
            self.columns.name,
            self.columns.id,
            self.page_size,
            offset
        )
    }

    /// GET one page of rows. Also returns the table size from `Content-Range`
    /// when the server reports it (requested via `Prefer: count=exact`).
    async fn fetch_page(&self, offset: usize) -> Result<(Vec<TreeRow>, Option<usize>), SourceError> {
        let path = self.page_path(offset);
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        let mut request = self
            .client
            .get(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Prefer", "count=exact");
        if let Some(schema) = &self.schema {
            request = request.header("Accept-Profile", schema);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status { path, status, body });
        }

        let total = resp
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total);

        Ok((resp.json().await?, total))
    }
}

#[async_trait::async_trait]
impl RowSource for SupabaseRowSource {
    fn name(&self) -> &str {
        &self.table
    }

    /// Pages until the server returns an empty page or the reported total is reached.
    /// A short page does not end the read: `max-rows` may cap pages below `page_size`.
    async fn fetch_rows(&self) -> Result<Vec<Node>, SourceError> {
        let mut nodes = Vec::new();
        let mut offset = 0;

        loop {
            let (page, total) = self.fetch_page(offset).await?;
            let fetched = page.len();
            debug!(
                "Fetched {} row(s) from {} at offset {} (total {:?})",
                fetched, self.table, offset, total
            );
            if fetched == 0 {
                break;
            }

            for (idx, row) in page.into_iter().enumerate() {
                nodes.push(row.into_node(offset + idx + 1, &self.columns)?);
            }
            offset += fetched;

            if total.is_some_and(|total| offset >= total) {
                break;
            }
        }

        info!("Loaded {} row(s) from table {}", nodes.len(), self.table);
        Ok(nodes)
    }
}

/// Total from a `Content-Range` value such as `0-999/2500` or `*/0`. `None` when unknown (`*`).
fn content_range_total(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

// ============================================================================
// Supabase row types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TreeRow {
    id: NodeId,
    parent_id: Option<RawParent>,
    name: Option<String>,
}

/// Parent column as stored: integer column, or text where blank means top-level.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawParent {
    Id(NodeId),
    Text(String),
}

impl TreeRow {
    /// `row` is the 1-based position in the result set, used in error messages.
    fn into_node(self, row: usize, columns: &TableColumns) -> Result<Node, SourceError> {
        let parent_id = match self.parent_id {
            None => ParentRef::Root,
            Some(RawParent::Id(id)) => ParentRef::from_raw(Some(id)),
            Some(RawParent::Text(text)) => {
                let text = text.trim();
                if text.is_empty() || text.eq_ignore_ascii_case("null") {
                    ParentRef::Root
                } else {
                    let id = text.parse().map_err(|_| SourceError::InvalidId {
                        row,
                        column: columns.parent_id.clone(),
                        value: text.to_string(),
                    })?;
                    ParentRef::from_raw(Some(id))
                }
            }
        };

        Ok(Node {
            id: self.id,
            parent_id,
            name: self.name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::HeaderMap, routing::get, Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serve `/rest/v1/tree` from `rows` rows, never more than `cap` per response.
    async fn spawn_capped_table(
        rows: usize,
        cap: usize,
        report_count: bool,
        requests: Arc<AtomicUsize>,
    ) -> String {
        let handler = move |Query(params): Query<HashMap<String, String>>| {
            let requests = requests.clone();
            async move {
                requests.fetch_add(1, Ordering::SeqCst);
                let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
                let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(rows);
                let end = (offset + limit.min(cap)).min(rows);
                let page: Vec<serde_json::Value> = (offset..end)
                    .map(|i| {
                        let id = i as i64 + 1;
                        let parent = if id == 1 { serde_json::Value::Null } else { serde_json::json!(1) };
                        serde_json::json!({"id": id, "parent_id": parent, "name": format!("n{}", id)})
                    })
                    .collect();

                let mut headers = HeaderMap::new();
                if report_count {
                    let range = if end > offset {
                        format!("{}-{}/{}", offset, end - 1, rows)
                    } else {
                        format!("*/{}", rows)
                    };
                    headers.insert("content-range", range.parse().unwrap());
                }
                (headers, Json(page))
            }
        };

        let app = Router::new().route("/rest/v1/tree", get(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_page_path_aliases_columns() {
        let source = SupabaseRowSource::new("https://example.supabase.co/", "key", "categories")
            .with_columns(TableColumns {
                id: "cat_id".to_string(),
                parent_id: "cat_parent".to_string(),
                name: "title".to_string(),
            })
            .with_page_size(50);

        assert_eq!(source.base_url, "https://example.supabase.co");
        assert_eq!(
            source.page_path(100),
            "categories?select=id:cat_id,parent_id:cat_parent,name:title&order=cat_id.asc&limit=50&offset=100"
        );
        assert_eq!(source.name(), "categories");
    }

    #[test]
    fn test_page_size_never_zero() {
        let source = SupabaseRowSource::new("http://localhost", "key", "tree").with_page_size(0);
        assert_eq!(source.page_size, 1);
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("0-999/2500"), Some(2500));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-24/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn test_tree_row_into_node() {
        let rows: Vec<TreeRow> = serde_json::from_str(
            r#"[
                {"id": 1, "parent_id": null, "name": "A"},
                {"id": 2, "parent_id": 0, "name": "B"},
                {"id": 3, "parent_id": 1, "name": null}
            ]"#,
        )
        .unwrap();
        let columns = TableColumns::default();
        let nodes: Vec<Node> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.into_node(i + 1, &columns).unwrap())
            .collect();

        assert_eq!(nodes[0].parent_id, ParentRef::Root);
        assert_eq!(nodes[1].parent_id, ParentRef::Root);
        assert_eq!(nodes[2].parent_id, ParentRef::Node(1));
        assert_eq!(nodes[2].name, "");
    }

    #[test]
    fn test_text_parent_column() {
        let rows: Vec<TreeRow> = serde_json::from_str(
            r#"[
                {"id": 1, "parent_id": "", "name": "A"},
                {"id": 2, "parent_id": " 1 ", "name": "B"},
                {"id": 3, "parent_id": "0", "name": "C"},
                {"id": 4, "parent_id": "NULL", "name": "D"},
                {"id": 5, "parent_id": "abc", "name": "E"}
            ]"#,
        )
        .unwrap();
        let columns = TableColumns::default();
        let mut rows = rows.into_iter();

        let mut next = |row| rows.next().unwrap().into_node(row, &columns);
        assert_eq!(next(1).unwrap().parent_id, ParentRef::Root);
        assert_eq!(next(2).unwrap().parent_id, ParentRef::Node(1));
        assert_eq!(next(3).unwrap().parent_id, ParentRef::Root);
        assert_eq!(next(4).unwrap().parent_id, ParentRef::Root);
        match next(5) {
            Err(SourceError::InvalidId { row, column, value }) => {
                assert_eq!(row, 5);
                assert_eq!(column, "parent_id");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_rows_past_server_row_cap() {
        let requests = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_capped_table(5, 2, false, requests.clone()).await;
        let source = SupabaseRowSource::new(base_url, "key", "tree").with_page_size(5);

        let nodes = source.fetch_rows().await.unwrap();

        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(nodes[1].parent_id, ParentRef::Node(1));
        // 2 + 2 + 1 rows, then the empty page that ends the read
        assert_eq!(requests.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fetch_rows_stops_at_reported_total() {
        let requests = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_capped_table(5, 2, true, requests.clone()).await;
        let source = SupabaseRowSource::new(base_url, "key", "tree").with_page_size(1000);

        let nodes = source.fetch_rows().await.unwrap();

        assert_eq!(nodes.len(), 5);
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_rows_empty_table() {
        let requests = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_capped_table(0, 2, true, requests.clone()).await;
        let source = SupabaseRowSource::new(base_url, "key", "tree");

        assert!(source.fetch_rows().await.unwrap().is_empty());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_rows_unreachable_host() {
        let source = SupabaseRowSource::new("http://127.0.0.1:1", "key", "tree");
        assert!(matches!(source.fetch_rows().await, Err(SourceError::Http(_))));
    }
}
