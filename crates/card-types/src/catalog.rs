//! Card catalog reader.
//!
//! Reads the catalog that drives index building. Supported formats are
//! picked by file extension: CSV with a header row, a JSON array of
//! objects, or JSON Lines.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::CardError;
use crate::record::{CardRecord, CARD_ID_COLUMN, FALLBACK_ID_COLUMN, IMAGE_URL_COLUMN};

/// Catalog file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Csv,
    Json,
    JsonLines,
}

impl CatalogFormat {
    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(CatalogFormat::Csv),
            "json" => Some(CatalogFormat::Json),
            "jsonl" | "ndjson" => Some(CatalogFormat::JsonLines),
            _ => None,
        }
    }
}

/// A catalog row that could not become a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based data row number
    pub row: usize,
    pub reason: String,
}

/// Parsed catalog rows in file order, valid or not.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<Result<CardRecord, RejectedRow>>,
}

impl Catalog {
    /// Total rows, including rejected ones.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the first `n` rows.
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    pub fn records(&self) -> impl Iterator<Item = &CardRecord> {
        self.rows.iter().filter_map(|row| row.as_ref().ok())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &RejectedRow> {
        self.rows.iter().filter_map(|row| row.as_ref().err())
    }

    /// Split into valid records and rejected rows, each in file order.
    pub fn into_parts(self) -> (Vec<CardRecord>, Vec<RejectedRow>) {
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        for row in self.rows {
            match row {
                Ok(record) => records.push(record),
                Err(bad) => rejected.push(bad),
            }
        }
        (records, rejected)
    }
}

/// Load a catalog file, keeping rows that cannot become records.
///
/// Fails if the file is missing, its format is unknown, or it lacks an
/// identifier column (`card_id`, falling back to `id`) or `image_url`.
/// A row with an empty identifier is rejected on its own and logged; the
/// rest of the catalog still loads.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog, CardError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CardError::CatalogNotFound(path.to_path_buf()));
    }
    let format = CatalogFormat::from_path(path)
        .ok_or_else(|| CardError::UnsupportedFormat(path.to_path_buf()))?;

    let (columns, rows) = match format {
        CatalogFormat::Csv => read_csv_rows(path)?,
        CatalogFormat::Json => read_json_rows(path)?,
        CatalogFormat::JsonLines => read_json_lines_rows(path)?,
    };

    // A JSON catalog with no rows has no columns to check.
    if rows.is_empty() && format != CatalogFormat::Csv {
        return Ok(Catalog::default());
    }

    let id_column = resolve_id_column(&columns)?;
    let rows: Vec<Result<CardRecord, RejectedRow>> = rows
        .into_iter()
        .enumerate()
        .map(|(i, fields)| {
            CardRecord::from_row(i + 1, id_column, fields).map_err(|e| match e {
                CardError::InvalidRecord { row, reason } => RejectedRow { row, reason },
                other => RejectedRow {
                    row: i + 1,
                    reason: other.to_string(),
                },
            })
        })
        .collect();
    let catalog = Catalog { rows };

    for bad in catalog.rejected() {
        warn!(row = bad.row, reason = %bad.reason, "Skipping invalid catalog row");
    }
    info!(
        path = %path.display(),
        format = ?format,
        records = catalog.records().count(),
        rejected = catalog.rejected().count(),
        "Loaded catalog"
    );
    Ok(catalog)
}

/// Read the valid records of a catalog file, in file order.
///
/// Rows with an empty identifier are dropped; use `load_catalog` to see
/// them.
pub fn read_catalog(path: impl AsRef<Path>) -> Result<Vec<CardRecord>, CardError> {
    Ok(load_catalog(path)?.into_parts().0)
}

/// Pick the identifier column and check that `image_url` exists.
fn resolve_id_column(columns: &[String]) -> Result<&'static str, CardError> {
    let has = |name: &str| columns.iter().any(|c| c == name);

    let id_column = if has(CARD_ID_COLUMN) {
        Some(CARD_ID_COLUMN)
    } else if has(FALLBACK_ID_COLUMN) {
        Some(FALLBACK_ID_COLUMN)
    } else {
        None
    };

    let mut missing = Vec::new();
    if id_column.is_none() {
        missing.push(format!("{} (or {})", CARD_ID_COLUMN, FALLBACK_ID_COLUMN));
    }
    if !has(IMAGE_URL_COLUMN) {
        missing.push(IMAGE_URL_COLUMN.to_string());
    }

    match id_column {
        Some(column) if missing.is_empty() => Ok(column),
        _ => Err(CardError::MissingColumns(missing)),
    }
}

type Rows = (Vec<String>, Vec<Map<String, Value>>);

fn read_csv_rows(path: &Path) -> Result<Rows, CardError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (header.clone(), value)
            })
            .collect();
        rows.push(fields);
    }

    debug!(columns = headers.len(), rows = rows.len(), "Parsed CSV catalog");
    Ok((headers, rows))
}

fn read_json_rows(path: &Path) -> Result<Rows, CardError> {
    let text = fs::read_to_string(path)?;
    let values: Vec<Value> = serde_json::from_str(&text)?;
    collect_objects(values)
}

fn read_json_lines_rows(path: &Path) -> Result<Rows, CardError> {
    let text = fs::read_to_string(path)?;
    let values = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<Value>, _>>()?;
    collect_objects(values)
}

/// Keep object rows and gather the union of their keys in first-seen order.
fn collect_objects(values: Vec<Value>) -> Result<Rows, CardError> {
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(values.len());

    for (i, value) in values.into_iter().enumerate() {
        let Value::Object(fields) = value else {
            return Err(CardError::InvalidRecord {
                row: i + 1,
                reason: "expected a JSON object".to_string(),
            });
        };
        for key in fields.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        rows.push(fields);
    }

    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_csv_catalog() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cards.csv",
            "card_id,name,image_url,price\nA,Alpha,u1,\nB,Beta,u2,1.50\n",
        );

        let records = read_catalog(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].card_id, "A");
        assert_eq!(records[1].image_url, "u2");
        assert_eq!(records[0].fields["price"], Value::Null);
        assert_eq!(records[1].fields["name"], Value::String("Beta".into()));
    }

    #[test]
    fn test_read_csv_falls_back_to_id_column() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cards.csv", "id,image_url\n7,u7\n");
        let records = read_catalog(&path).unwrap();
        assert_eq!(records[0].card_id, "7");
    }

    #[test]
    fn test_missing_columns_are_named() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cards.csv", "name,url\nx,y\n");
        let err = read_catalog(&path).unwrap_err();
        match err {
            CardError::MissingColumns(missing) => {
                assert_eq!(missing.len(), 2);
                assert!(missing[0].contains("card_id"));
                assert_eq!(missing[1], "image_url");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_only_csv_is_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cards.csv", "card_id,image_url\n");
        assert!(read_catalog(&path).unwrap().is_empty());
    }

    #[test]
    fn test_read_json_catalog() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cards.json",
            r#"[{"card_id":"A","image_url":"u1"},{"card_id":"B","image_url":"u2","hp":60}]"#,
        );
        let records = read_catalog(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].fields["hp"], Value::from(60));
    }

    #[test]
    fn test_read_json_lines_catalog() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cards.jsonl",
            "{\"card_id\":\"A\",\"image_url\":\"u1\"}\n\n{\"card_id\":\"C\",\"image_url\":\"u3\"}\n",
        );
        let ids: Vec<String> = read_catalog(&path)
            .unwrap()
            .into_iter()
            .map(|r| r.card_id)
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_blank_id_rejects_only_that_row() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cards.csv", "card_id,image_url\nA,u1\n,u2\nC,u3\n");

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 3);
        let ids: Vec<&str> = catalog.records().map(|r| r.card_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        let rejected: Vec<&RejectedRow> = catalog.rejected().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].row, 2);
        assert!(rejected[0].reason.contains("card_id"));

        let records = read_catalog(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_truncate_counts_rejected_rows() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cards.jsonl",
            "{\"card_id\":\"A\",\"image_url\":\"u1\"}\n{\"card_id\":\" \",\"image_url\":\"u2\"}\n{\"card_id\":\"C\",\"image_url\":\"u3\"}\n",
        );

        let mut catalog = load_catalog(&path).unwrap();
        catalog.truncate(2);
        let (records, rejected) = catalog.into_parts();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].card_id, "A");
        assert_eq!(rejected[0].row, 2);
    }

    #[test]
    fn test_missing_catalog_file() {
        let err = read_catalog("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, CardError::CatalogNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cards.xlsx", "");
        let err = read_catalog(&path).unwrap_err();
        assert!(matches!(err, CardError::UnsupportedFormat(_)));
    }
}
