use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, ExampleRow, ExampleTable};

pub const FILENAME_COLUMN: &str = "filename";
pub const LABEL_COLUMN: &str = "label";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a train/test split table.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row with `filename` and `label` columns (the default)
/// * `.json`    – `[{ "filename": "...", "label": 1, ... }, ...]`
/// * `.parquet` – `filename` string column and a `label` column
///
/// Extra columns are ignored.  Row order is preserved.
pub fn load_table(path: &Path) -> Result<ExampleTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported table extension: .{other}"),
    }
    .with_context(|| format!("loading table {}", path.display()))?;

    log::info!(
        "Loaded {} rows from {} ({} distinct labels)",
        table.len(),
        path.display(),
        table.unique_labels.len()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<ExampleTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();

    let filename_idx = headers
        .iter()
        .position(|h| h == FILENAME_COLUMN)
        .context("CSV missing 'filename' column")?;
    let label_idx = headers
        .iter()
        .position(|h| h == LABEL_COLUMN)
        .context("CSV missing 'label' column")?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let filename = record
            .get(filename_idx)
            .filter(|f| !f.is_empty())
            .with_context(|| format!("CSV row {row_no}: empty filename"))?;
        let label = CellValue::parse(record.get(label_idx).unwrap_or(""));

        rows.push(ExampleRow {
            filename: filename.to_string(),
            label,
        });
    }

    Ok(ExampleTable::from_rows(rows))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
fn load_json(path: &Path) -> Result<ExampleTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let obj = rec
                .as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))?;
            let filename = obj
                .get(FILENAME_COLUMN)
                .and_then(|v| v.as_str())
                .with_context(|| format!("Row {i}: missing or invalid 'filename'"))?;
            let label = obj
                .get(LABEL_COLUMN)
                .map(json_to_cell)
                .with_context(|| format!("Row {i}: missing 'label'"))?;
            Ok(ExampleRow {
                filename: filename.to_string(),
                label,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(ExampleTable::from_rows)
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

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<ExampleTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let filename_idx = schema
            .index_of(FILENAME_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'filename' column"))?;
        let label_idx = schema
            .index_of(LABEL_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'label' column"))?;

        let filenames = batch.column(filename_idx);
        let labels = batch.column(label_idx);

        for row in 0..batch.num_rows() {
            let filename = match extract_cell(filenames, row)? {
                CellValue::String(s) => s,
                other => bail!("Row {row}: filename must be a string, got {other}"),
            };
            rows.push(ExampleRow {
                filename,
                label: extract_cell(labels, row)?,
            });
        }
    }

    Ok(ExampleTable::from_rows(rows))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &Arc<dyn Array>, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => {
            let arr = downcast::<Int32Array>(col)?;
            CellValue::Integer(arr.value(row) as i64)
        }
        DataType::Int64 => CellValue::Integer(downcast::<Int64Array>(col)?.value(row)),
        DataType::Float32 => {
            let arr = downcast::<Float32Array>(col)?;
            CellValue::Float(arr.value(row) as f64)
        }
        DataType::Float64 => CellValue::Float(downcast::<Float64Array>(col)?.value(row)),
        DataType::Boolean => CellValue::Bool(downcast::<BooleanArray>(col)?.value(row)),
        other => bail!("Unsupported column type {other:?}"),
    };
    Ok(value)
}

fn downcast<T: 'static>(col: &Arc<dyn Array>) -> Result<&T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("unexpected array layout for {:?}", col.data_type()))
}
