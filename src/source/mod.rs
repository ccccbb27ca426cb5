//! Row source abstraction.
//!
//! Defines the [`RowSource`] trait so the tree can be loaded from different
//! backends (a PostgREST/Supabase table, a CSV or Excel sheet, or rows already
//! in memory). Table and column naming is a source concern only; the tree
//! itself only ever sees resolved [`Node`] rows.

pub mod sheet;
pub mod supabase;

use std::str::FromStr;

use crate::schema::Node;

pub use sheet::SheetRowSource;
pub use supabase::SupabaseRowSource;

/// Failure while fetching or decoding rows.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{path} returned {status}: {body}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Sheet(#[from] calamine::Error),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("row {row}: invalid {column} '{value}'")]
    InvalidId {
        row: usize,
        column: String,
        value: String,
    },
    #[error("unsupported file type: .{0} (supported: .csv, .xlsx, .xlsm, .xlsb)")]
    UnsupportedFile(String),
}

/// Async trait implemented by each row backend.
#[async_trait::async_trait]
pub trait RowSource: Send + Sync {
    fn name(&self) -> &str;

    /// One bulk read of the whole hierarchy table.
    async fn fetch_rows(&self) -> Result<Vec<Node>, SourceError>;
}

/// Column names of the hierarchy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    pub id: String,
    pub parent_id: String,
    pub name: String,
}

impl Default for TableColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            parent_id: "parent_id".to_string(),
            name: "name".to_string(),
        }
    }
}

impl TableColumns {
    /// Read `TREE_ID_COLUMN`, `TREE_PARENT_COLUMN` and `TREE_NAME_COLUMN`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            id: std::env::var("TREE_ID_COLUMN").unwrap_or(defaults.id),
            parent_id: std::env::var("TREE_PARENT_COLUMN").unwrap_or(defaults.parent_id),
            name: std::env::var("TREE_NAME_COLUMN").unwrap_or(defaults.name),
        }
    }
}

/// Rows held in memory, e.g. fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticRows {
    rows: Vec<Node>,
}

impl StaticRows {
    pub fn new(rows: Vec<Node>) -> Self {
        Self { rows }
    }
}

#[async_trait::async_trait]
impl RowSource for StaticRows {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_rows(&self) -> Result<Vec<Node>, SourceError> {
        Ok(self.rows.clone())
    }
}

/// Known backend identifiers used for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Supabase,
    Sheet,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supabase" | "postgrest" => Ok(Self::Supabase),
            "sheet" | "csv" | "excel" => Ok(Self::Sheet),
            other => Err(format!("unknown row source '{}' (expected supabase or sheet)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("supabase".parse::<SourceKind>(), Ok(SourceKind::Supabase));
        assert_eq!(" CSV ".parse::<SourceKind>(), Ok(SourceKind::Sheet));
        assert!("mysql".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_default_columns() {
        let cols = TableColumns::default();
        assert_eq!(cols.id, "id");
        assert_eq!(cols.parent_id, "parent_id");
        assert_eq!(cols.name, "name");
    }

    #[tokio::test]
    async fn test_static_rows_returns_clone() {
        let source = StaticRows::new(vec![Node::new(1, 0, "A")]);
        let first = source.fetch_rows().await.unwrap();
        let second = source.fetch_rows().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.name(), "static");
    }
}
