use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, SegmentRecord, SegmentTable, TimepointIndexing};
use crate::config::{DatasetConfig, SegmentColumns};
use crate::dataset::LABEL_MARKER;
use crate::error::{Result, SegexpError};

static NULL_CELL: CellValue = CellValue::Null;

// ---------------------------------------------------------------------------
// Loader contract
// ---------------------------------------------------------------------------

/// Parses a segments table into records and names its label image column.
pub trait SegmentTableLoader {
    /// Cells of columns starting with `image_path_prefix` are image path
    /// references and must be kept as written.
    /// Fails with [`SegexpError::TableFormat`] on malformed input.
    fn load(
        &self,
        table_path: &Path,
        indexing: TimepointIndexing,
        image_path_prefix: &str,
    ) -> Result<SegmentTable>;
}

/// File-backed loader.  Dispatch by extension.
///
/// Supported formats:
/// * `.tsv` / `.txt` / `.tab` – tab-separated, header row first
/// * `.csv`                   – comma-separated, header row first
/// * `.json`                  – `[{ "label_id": 1, "image_path_raw": "raw/a.tif", ... }, ...]`
/// * `.parquet`               – one column per table column
#[derive(Debug, Clone, Default)]
pub struct TableLoader {
    label_image_column: Option<String>,
    columns: SegmentColumns,
}

/// Settings of a single `load` call.
struct LoadRequest<'a> {
    indexing: TimepointIndexing,
    image_path_prefix: &'a str,
}

impl LoadRequest<'_> {
    fn is_image_column(&self, header: &str) -> bool {
        header.starts_with(self.image_path_prefix)
    }
}

impl TableLoader {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            label_image_column: config.label_image_column.clone(),
            columns: config.columns.clone(),
        }
    }

    pub fn with_label_image_column(mut self, column: impl Into<String>) -> Self {
        self.label_image_column = Some(column.into());
        self
    }

    fn load_file(&self, path: &Path, request: &LoadRequest<'_>) -> anyhow::Result<SegmentTable> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let raw = match ext.as_str() {
            "tsv" | "txt" | "tab" => read_delimited(path, b'\t', request)?,
            "csv" => read_delimited(path, b',', request)?,
            "json" => read_json(path, request)?,
            "parquet" | "pq" => read_parquet(path)?,
            other => bail!("Unsupported table extension: .{other}"),
        };
        debug!(
            "Read {} rows with columns {:?} from {}",
            raw.rows.len(),
            raw.headers,
            path.display()
        );
        self.build_table(raw, request)
    }

    /// Turn raw cells into segment records, resolving the identity columns.
    fn build_table(&self, raw: RawTable, request: &LoadRequest<'_>) -> anyhow::Result<SegmentTable> {
        let RawTable { headers, rows } = raw;

        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                bail!("duplicate column '{header}'");
            }
        }

        let label_image_column = self.find_label_image_column(&headers, request)?;
        let cols = &self.columns;
        let label_idx = position(&headers, &cols.label_id)
            .with_context(|| format!("missing '{}' column", cols.label_id))?;
        let timepoint_idx = position(&headers, &cols.timepoint);
        let anchor_idx = [
            position(&headers, &cols.anchor_x),
            position(&headers, &cols.anchor_y),
            position(&headers, &cols.anchor_z),
        ];
        let image_idx = label_image_column
            .as_deref()
            .and_then(|c| position(&headers, c));

        let columns: Arc<[String]> = headers.into();
        let mut records = Vec::with_capacity(rows.len());

        for (row_no, cells) in rows.into_iter().enumerate() {
            let cell = |idx: usize| cells.get(idx).unwrap_or(&NULL_CELL);

            let label_id = cell(label_idx).as_f64().with_context(|| {
                format!(
                    "row {row_no}: '{}' value '{}' is not a number",
                    cols.label_id,
                    cell(label_idx)
                )
            })?;

            let timepoint = match timepoint_idx.map(cell) {
                None | Some(CellValue::Null) => 0,
                Some(value) => {
                    let raw = value.as_i64().with_context(|| {
                        format!("row {row_no}: timepoint '{value}' is not an integer")
                    })?;
                    request
                        .indexing
                        .normalize(raw)
                        .map_err(|e| anyhow!("row {row_no}: {e}"))?
                }
            };

            let anchor = match anchor_idx {
                [Some(x), Some(y), z] => {
                    let coord = |idx: usize, axis: &str| {
                        cell(idx).as_f64().with_context(|| {
                            format!("row {row_no}: anchor {axis} '{}' is not a number", cell(idx))
                        })
                    };
                    let z = match z {
                        Some(z) => coord(z, "z")?,
                        None => 0.0,
                    };
                    Some([coord(x, "x")?, coord(y, "y")?, z])
                }
                _ => None,
            };

            let image_id = image_idx
                .and_then(|idx| cell(idx).as_path())
                .map(|p| p.into_owned());

            records.push(SegmentRecord::new(
                Arc::clone(&columns),
                cells,
                label_id,
                timepoint,
                anchor,
                image_id,
            ));
        }

        Ok(SegmentTable::new(records, label_image_column))
    }

    /// The configured label image column, or else the first image column
    /// whose name mentions "label".
    fn find_label_image_column(
        &self,
        headers: &[String],
        request: &LoadRequest<'_>,
    ) -> anyhow::Result<Option<String>> {
        if let Some(column) = &self.label_image_column {
            if !headers.contains(column) {
                bail!("label image column '{column}' not found");
            }
            return Ok(Some(column.clone()));
        }
        Ok(headers
            .iter()
            .find(|h| request.is_image_column(h) && h.contains(LABEL_MARKER))
            .cloned())
    }
}

impl SegmentTableLoader for TableLoader {
    fn load(
        &self,
        table_path: &Path,
        indexing: TimepointIndexing,
        image_path_prefix: &str,
    ) -> Result<SegmentTable> {
        let request = LoadRequest {
            indexing,
            image_path_prefix,
        };
        self.load_file(table_path, &request)
            .map_err(|e| SegexpError::table_format(table_path, format!("{e:#}")))
    }
}

// ---------------------------------------------------------------------------
// Delimited text (TSV / CSV)
// ---------------------------------------------------------------------------

fn read_delimited(path: &Path, delimiter: u8, request: &LoadRequest<'_>) -> anyhow::Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .context("opening table")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading table headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("table row {row_no}"))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| {
                if request.is_image_column(header) {
                    text_path_cell(value)
                } else {
                    guess_cell_type(value)
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// JSON (records-oriented)
// ---------------------------------------------------------------------------

fn read_json(path: &Path, request: &LoadRequest<'_>) -> anyhow::Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut objects = Vec::with_capacity(records.len());
    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .into_iter()
        .map(|obj| {
            headers
                .iter()
                .map(|header| match obj.get(header) {
                    None => CellValue::Null,
                    Some(value) if request.is_image_column(header) => json_path_cell(value),
                    Some(value) => json_to_cell(value),
                })
                .collect()
        })
        .collect();

    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn read_parquet(path: &Path) -> anyhow::Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| extract_cell(col, row))
                    .collect(),
            );
        }
    }

    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Header plus rows of cells aligned with it, before segment parsing.
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

fn position(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// Image path cells stay text so names like `001` are not read as numbers.
fn text_path_cell(s: &str) -> CellValue {
    if s.trim().is_empty() {
        CellValue::Null
    } else {
        CellValue::String(s.to_string())
    }
}

fn guess_cell_type(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::String(s.to_string())
}

fn json_path_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => text_path_cell(s),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::Int8 => CellValue::Integer(col.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => CellValue::Integer(col.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => CellValue::Integer(col.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => CellValue::Integer(col.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => CellValue::Integer(col.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v)
                .map(CellValue::Integer)
                .unwrap_or(CellValue::Float(v as f64))
        }
        DataType::Float32 => CellValue::Float(col.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        _ => array_value_to_string(col, row)
            .map(CellValue::String)
            .unwrap_or(CellValue::Null),
    }
}
