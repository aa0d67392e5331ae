use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Date64Array, Float32Array,
    Float64Array, Int32Array, Int64Array, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::util::display::array_value_to_string;
use chrono::NaiveTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Dataset, Field, FieldType, Record, Schema, Value};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which columns hold dates, and which of them is the primary date field.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Columns that must parse as dates. Absent ones are skipped with a warning.
    pub date_fields: Vec<String>,
    /// Primary date field; must be present in the file.
    pub primary_date: Option<String>,
}

impl LoadOptions {
    fn is_date_field(&self, name: &str) -> bool {
        self.primary_date.as_deref() == Some(name) || self.date_fields.iter().any(|f| f == name)
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one record per line
/// * `.json`    – `[{ "Claim ID": 1, "Claim Status": "Approved", ... }, ...]`
/// * `.parquet` – flat columns (strings, ints, floats, bools, dates, timestamps)
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => read_csv(path)?,
        "json" => read_json(path)?,
        "parquet" | "pq" => read_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let dataset = build_dataset(table, options)
        .with_context(|| format!("building dataset from {}", path.display()))?;
    log::info!(
        "loaded {} records with {} fields from {}",
        dataset.len(),
        dataset.schema().len(),
        path.display()
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Column-wise staging shared by every format
// ---------------------------------------------------------------------------

/// A cell as read from the file, before the column type is settled.
#[derive(Debug, Clone)]
enum RawCell {
    /// Untyped text (CSV cells, JSON strings).
    Text(String),
    /// A value whose type the file format already carries.
    Typed(Value),
}

impl RawCell {
    /// Interpret the cell as `field_type`, `None` when it does not fit.
    fn coerce(&self, field_type: FieldType) -> Option<Value> {
        match self {
            RawCell::Text(s) => Value::parse(s, field_type),
            RawCell::Typed(Value::Null) => Some(Value::Null),
            RawCell::Typed(v) if v.field_type() == Some(field_type) => Some(v.clone()),
            RawCell::Typed(Value::Integer(i)) if field_type == FieldType::Float => {
                Some(Value::Float(*i as f64))
            }
            RawCell::Typed(v) if field_type == FieldType::Text => Some(Value::Text(v.to_string())),
            RawCell::Typed(_) => None,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            RawCell::Text(s) => s.trim().is_empty(),
            RawCell::Typed(v) => v.is_null(),
        }
    }

    fn describe(&self) -> String {
        match self {
            RawCell::Text(s) => s.clone(),
            RawCell::Typed(v) => v.to_string(),
        }
    }
}

struct RawTable {
    headers: Vec<String>,
    /// One vector per header, all of equal length.
    columns: Vec<Vec<RawCell>>,
}

impl RawTable {
    fn new(headers: Vec<String>) -> Self {
        let columns = headers.iter().map(|_| Vec::new()).collect();
        RawTable { headers, columns }
    }

    fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// Narrowest type every cell of a column fits, in this order of preference.
const INFERENCE_ORDER: [FieldType; 5] = [
    FieldType::Integer,
    FieldType::Float,
    FieldType::Bool,
    FieldType::Date,
    FieldType::Text,
];

fn infer_column(name: &str, cells: &[RawCell], declared_date: bool) -> Result<(FieldType, Vec<Value>)> {
    let candidates: &[FieldType] = if declared_date {
        &[FieldType::Date]
    } else if cells.iter().all(RawCell::is_blank) {
        &[FieldType::Text]
    } else {
        &INFERENCE_ORDER
    };

    for &field_type in candidates {
        let parsed: Option<Vec<Value>> = cells.iter().map(|c| c.coerce(field_type)).collect();
        if let Some(values) = parsed {
            return Ok((field_type, values));
        }
    }

    // Only a declared date column can get here; report the first offender.
    let (row, cell) = cells
        .iter()
        .enumerate()
        .find(|(_, c)| c.coerce(FieldType::Date).is_none())
        .context("column type inference failed")?;
    bail!("row {row}: '{}' in column '{name}' is not a date", cell.describe())
}

fn build_dataset(table: RawTable, options: &LoadOptions) -> Result<Dataset> {
    let row_count = table.row_count();
    let mut fields = Vec::with_capacity(table.headers.len());
    let mut typed_columns = Vec::with_capacity(table.headers.len());
    for (name, cells) in table.headers.iter().zip(&table.columns) {
        let (field_type, values) = infer_column(name, cells, options.is_date_field(name))?;
        log::debug!("column '{name}' inferred as {field_type}");
        fields.push(Field::new(name.clone(), field_type));
        typed_columns.push(values.into_iter());
    }

    let records = (0..row_count)
        .map(|_| {
            Record::new(
                typed_columns
                    .iter_mut()
                    .map(|col| col.next().unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .collect();

    let schema = Schema::new(fields)?;
    for declared in &options.date_fields {
        if !schema.contains(declared) {
            log::warn!("date column '{declared}' not found, skipping");
        }
    }
    Ok(Dataset::new(schema, records, options.primary_date.as_deref())?)
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = RawTable::new(headers);
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, column) in table.columns.iter_mut().enumerate() {
            let cell = record.get(col_idx).unwrap_or("");
            column.push(RawCell::Text(cell.to_string()));
        }
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON reader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
/// Keys missing from a record read as null.
fn read_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

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
    }

    let mut table = RawTable::new(headers);
    for rec in records {
        for (header, column) in table.headers.iter().zip(table.columns.iter_mut()) {
            let cell = rec.get(header).map_or(RawCell::Typed(Value::Null), json_to_cell);
            column.push(cell);
        }
    }
    Ok(table)
}

fn json_to_cell(val: &JsonValue) -> RawCell {
    match val {
        JsonValue::String(s) => RawCell::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawCell::Typed(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                RawCell::Typed(Value::Float(f))
            } else {
                RawCell::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => RawCell::Typed(Value::Bool(*b)),
        JsonValue::Null => RawCell::Typed(Value::Null),
        other => RawCell::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn read_parquet(path: &Path) -> Result<RawTable> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let headers = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut table = RawTable::new(headers);
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col_idx, column) in table.columns.iter_mut().enumerate() {
            let array = batch.column(col_idx);
            for row in 0..batch.num_rows() {
                let cell = extract_cell(array, row)
                    .with_context(|| format!("column '{}', row {row}", table.headers[col_idx]))?;
                column.push(cell);
            }
        }
    }
    Ok(table)
}

// -- Arrow helpers --

fn downcast<'a, T: 'static>(col: &'a ArrayRef) -> Result<&'a T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("unexpected array layout for {:?}", col.data_type()))
}

fn date_value(d: Option<chrono::NaiveDateTime>) -> RawCell {
    RawCell::Typed(d.map_or(Value::Null, Value::Date))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> Result<RawCell> {
    if col.is_null(row) {
        return Ok(RawCell::Typed(Value::Null));
    }
    let cell = match col.data_type() {
        DataType::Utf8 => RawCell::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => RawCell::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => RawCell::Typed(Value::Integer(downcast::<Int32Array>(col)?.value(row) as i64)),
        DataType::Int64 => RawCell::Typed(Value::Integer(downcast::<Int64Array>(col)?.value(row))),
        DataType::Float32 => RawCell::Typed(Value::Float(downcast::<Float32Array>(col)?.value(row) as f64)),
        DataType::Float64 => RawCell::Typed(Value::Float(downcast::<Float64Array>(col)?.value(row))),
        DataType::Boolean => RawCell::Typed(Value::Bool(downcast::<BooleanArray>(col)?.value(row))),
        DataType::Date32 => date_value(
            downcast::<Date32Array>(col)?
                .value_as_date(row)
                .map(|d| d.and_time(NaiveTime::MIN)),
        ),
        DataType::Date64 => date_value(downcast::<Date64Array>(col)?.value_as_datetime(row)),
        DataType::Timestamp(TimeUnit::Second, _) => {
            date_value(downcast::<TimestampSecondArray>(col)?.value_as_datetime(row))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            date_value(downcast::<TimestampMillisecondArray>(col)?.value_as_datetime(row))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            date_value(downcast::<TimestampMicrosecondArray>(col)?.value_as_datetime(row))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            date_value(downcast::<TimestampNanosecondArray>(col)?.value_as_datetime(row))
        }
        _ => RawCell::Text(array_value_to_string(col, row)?),
    };
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use arrow::array::StringArray;
    use arrow::datatypes::Schema as ArrowSchema;
    use arrow::record_batch::RecordBatch;
    use chrono::NaiveDate;
    use parquet::arrow::ArrowWriter;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn claims_options() -> LoadOptions {
        LoadOptions {
            date_fields: vec!["Date Of Diagnosis".into()],
            primary_date: Some("Claim Created Date".into()),
        }
    }

    #[test]
    fn test_load_csv_infers_types() {
        let file = write_temp(
            ".csv",
            "Claim ID,Claim Created Date,Claim Status,Claim Amount,Year\n\
             1,2023-03-04,Approved,100,2023\n\
             2,2023-03-05 10:00:00,Denied,250.5,2023\n\
             3,2024-01-02,Approved,,2024\n",
        );
        let ds = load_file(file.path(), &claims_options()).unwrap();

        assert_eq!(ds.len(), 3);
        let types: Vec<FieldType> = ds.schema().fields().iter().map(|f| f.field_type).collect();
        assert_eq!(
            types,
            vec![
                FieldType::Integer,
                FieldType::Date,
                FieldType::Text,
                FieldType::Float,
                FieldType::Integer
            ]
        );
        assert_eq!(ds.records()[0].get(3), &Value::Float(100.0));
        assert_eq!(ds.records()[2].get(3), &Value::Null);
        assert_eq!(ds.date_field(), Some("Claim Created Date"));
        // The declared diagnosis date is absent from this export and skipped.
        assert!(!ds.schema().contains("Date Of Diagnosis"));
        assert!(ds.schema().contains("Claim Amount"));
    }

    #[test]
    fn test_load_csv_bad_declared_date_reports_row() {
        let file = write_temp(".csv", "Claim Created Date,x\n2023-01-01,1\nnot a date,2\n");
        let err = load_file(file.path(), &claims_options()).unwrap_err();
        assert!(format!("{err:#}").contains("row 1"), "{err:#}");
    }

    #[test]
    fn test_load_csv_missing_primary_date_is_schema_error() {
        let file = write_temp(".csv", "a,b\n1,2\n");
        let err = load_file(file.path(), &claims_options()).unwrap_err();
        let root = err.downcast_ref::<crate::error::Error>();
        assert_eq!(root, Some(&crate::error::Error::Schema("Claim Created Date".into())));
    }

    #[test]
    fn test_load_json_records() {
        let file = write_temp(
            ".json",
            r#"[
                {"visit_id": 1, "visit_created_on": "2024-02-01 08:00:00", "visit_type": "Outpatient", "fee": 10},
                {"visit_id": 2, "visit_created_on": "2024-02-02 21:30:00", "visit_type": "Inpatient", "fee": 12.5, "note": "late"}
            ]"#,
        );
        let options = LoadOptions {
            date_fields: vec![],
            primary_date: Some("visit_created_on".into()),
        };
        let ds = load_file(file.path(), &options).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.schema().field("fee").unwrap().field_type, FieldType::Float);
        assert_eq!(ds.schema().field("note").unwrap().field_type, FieldType::Text);
        let note = ds.schema().position("note").unwrap();
        assert_eq!(ds.records()[0].get(note), &Value::Null);
    }

    #[test]
    fn test_load_parquet() {
        let schema = Arc::new(ArrowSchema::new(vec![
            arrow::datatypes::Field::new("Claim Created Date", DataType::Date32, true),
            arrow::datatypes::Field::new("Claim Type", DataType::Utf8, true),
            arrow::datatypes::Field::new("Claim Amount", DataType::Float64, true),
        ]));
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let day = (NaiveDate::from_ymd_opt(2024, 5, 6).unwrap() - epoch).num_days() as i32;
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Date32Array::from(vec![Some(day), None])),
                Arc::new(StringArray::from(vec![Some("Dental"), Some("Optical")])),
                Arc::new(Float64Array::from(vec![Some(12.0), None])),
            ],
        )
        .unwrap();

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.as_file().try_clone().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = load_file(file.path(), &claims_options()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(
            ds.records()[0].get(0).as_date().unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
        );
        assert_eq!(ds.records()[1].get(0), &Value::Null);
        assert_eq!(ds.records()[0].get(1), &Value::from("Dental"));
        assert_eq!(ds.schema().field("Claim Amount").unwrap().field_type, FieldType::Float);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".xlsx", "");
        assert!(load_file(file.path(), &LoadOptions::default()).is_err());
    }
}
