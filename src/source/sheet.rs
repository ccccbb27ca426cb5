//! Hierarchy rows from tabular files: CSV and Excel (.xlsx/.xlsm/.xlsb).
//!
//! The first row is the header. The id, parent and name columns are located
//! by header name (case-insensitive). A blank, `0` or `NULL` parent marks a
//! top-level row.

use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_from_rs, Data, Reader, Xlsb, Xlsx};
use tracing::{debug, info, warn};

use super::{RowSource, SourceError, TableColumns};
use crate::schema::{Node, NodeId, ParentRef};

/// Reads the hierarchy from a CSV or Excel file on disk.
#[derive(Debug, Clone)]
pub struct SheetRowSource {
    path: PathBuf,
    label: String,
    columns: TableColumns,
}

impl SheetRowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            label,
            columns: TableColumns::default(),
        }
    }

    /// Create a source from `TREE_SHEET_PATH` plus the column variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var("TREE_SHEET_PATH")
            .map_err(|_| anyhow::anyhow!("TREE_SHEET_PATH not set"))?;
        Ok(Self::new(path).with_columns(TableColumns::from_env()))
    }

    pub fn with_columns(mut self, columns: TableColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl RowSource for SheetRowSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch_rows(&self) -> Result<Vec<Node>, SourceError> {
        let data = tokio::fs::read(&self.path).await?;
        let nodes = parse_file(&self.label, &data, &self.columns)?;
        info!("Loaded {} row(s) from {:?}", nodes.len(), self.path);
        Ok(nodes)
    }
}

/// Dispatch file parsing by extension.
pub fn parse_file(
    filename: &str,
    data: &[u8],
    columns: &TableColumns,
) -> Result<Vec<Node>, SourceError> {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => parse_csv(data, columns),
        "xlsx" | "xlsm" => {
            let workbook: Xlsx<_> =
                open_workbook_from_rs(Cursor::new(data)).map_err(calamine::Error::from)?;
            parse_workbook::<Cursor<&[u8]>, _>(workbook, columns)
        }
        "xlsb" => {
            let workbook: Xlsb<_> =
                open_workbook_from_rs(Cursor::new(data)).map_err(calamine::Error::from)?;
            parse_workbook::<Cursor<&[u8]>, _>(workbook, columns)
        }
        _ => Err(SourceError::UnsupportedFile(ext)),
    }
}

/// Parse CSV bytes into rows.
pub fn parse_csv(data: &[u8], columns: &TableColumns) -> Result<Vec<Node>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let layout = ColumnLayout::locate(&headers, columns)?;

    let mut nodes = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let cells: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        if let Some(node) = layout.node_from_cells(idx + 2, &cells)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Use the first worksheet whose header row names all three columns.
fn parse_workbook<RS, R>(mut workbook: R, columns: &TableColumns) -> Result<Vec<Node>, SourceError>
where
    RS: Read + Seek,
    R: Reader<RS>,
{
    let mut last_err = SourceError::MissingColumn(columns.id.clone());

    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping sheet '{}': {:?}", name, e);
                continue;
            }
        };

        let mut row_iter = range.rows();
        let Some(header_row) = row_iter.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();
        let layout = match ColumnLayout::locate(&headers, columns) {
            Ok(layout) => layout,
            Err(e) => {
                debug!("Sheet '{}' lacks tree columns: {}", name, e);
                last_err = e;
                continue;
            }
        };

        let mut nodes = Vec::new();
        for (idx, row) in row_iter.enumerate() {
            let cells: Vec<String> = row.iter().map(cell_to_string).collect();
            if let Some(node) = layout.node_from_cells(idx + 2, &cells)? {
                nodes.push(node);
            }
        }
        debug!("Using sheet '{}' ({} rows)", name, nodes.len());
        return Ok(nodes);
    }

    Err(last_err)
}

/// Positions of the tree columns within a header row.
struct ColumnLayout<'a> {
    columns: &'a TableColumns,
    id: usize,
    parent_id: usize,
    name: usize,
}

impl<'a> ColumnLayout<'a> {
    fn locate(headers: &[String], columns: &'a TableColumns) -> Result<Self, SourceError> {
        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| SourceError::MissingColumn(wanted.to_string()))
        };
        Ok(Self {
            columns,
            id: find(columns.id.as_str())?,
            parent_id: find(columns.parent_id.as_str())?,
            name: find(columns.name.as_str())?,
        })
    }

    /// `row` is the 1-based line number used in error messages. Blank rows yield `None`.
    fn node_from_cells(&self, row: usize, cells: &[String]) -> Result<Option<Node>, SourceError> {
        if cells.iter().all(|c| c.trim().is_empty()) {
            return Ok(None);
        }
        let cell = |idx: usize| cells.get(idx).map(|c| c.trim()).unwrap_or("");

        let raw_id = cell(self.id);
        let id: NodeId = raw_id.parse().map_err(|_| SourceError::InvalidId {
            row,
            column: self.columns.id.clone(),
            value: raw_id.to_string(),
        })?;

        let raw_parent = cell(self.parent_id);
        let parent_id = if raw_parent.is_empty() || raw_parent.eq_ignore_ascii_case("null") {
            ParentRef::Root
        } else {
            let parent: NodeId = raw_parent.parse().map_err(|_| SourceError::InvalidId {
                row,
                column: self.columns.parent_id.clone(),
                value: raw_parent.to_string(),
            })?;
            ParentRef::from_raw(Some(parent))
        };

        Ok(Some(Node {
            id,
            parent_id,
            name: cell(self.name).to_string(),
        }))
    }
}

/// Convert a calamine cell to a string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}
