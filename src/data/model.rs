use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::Error;

/// Full English month names, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Text layouts accepted for date cells, tried in order. Slash dates are read
/// month-first; `13/03/2024` falls through to the day-first layout.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Parse a date or timestamp cell. Plain dates land at midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

// ---------------------------------------------------------------------------
// FieldType – declared type of a schema field
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Bool,
    Date,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Grouping and facet indices key on `Value`, so it must be `Ord` and `Hash`.
///
/// Floats compare by canonical bits: `-0.0` equals `0.0` and all NaNs are
/// equal. `Eq` and `Hash` follow `Ord`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Null,
}

/// Collapse signed zero and NaN payloads to one representative.
fn canonical_float(f: f64) -> f64 {
    if f == 0.0 {
        0.0
    } else if f.is_nan() {
        f64::NAN
    } else {
        f
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => canonical_float(*a).total_cmp(&canonical_float(*b)),
            (Text(a), Text(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => canonical_float(*f).to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) if d.time() == NaiveTime::MIN => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl Value {
    /// Parse text as the given field type. Empty text is `Null`.
    pub fn parse(s: &str, field_type: FieldType) -> Option<Value> {
        let s = s.trim();
        if s.is_empty() {
            return Some(Value::Null);
        }
        match field_type {
            FieldType::Text => Some(Value::Text(s.to_string())),
            FieldType::Integer => s.parse::<i64>().ok().map(Value::Integer),
            FieldType::Float => s.parse::<f64>().ok().map(Value::Float),
            FieldType::Bool => {
                if s.eq_ignore_ascii_case("true") {
                    Some(Value::Bool(true))
                } else if s.eq_ignore_ascii_case("false") {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            FieldType::Date => parse_datetime(s).map(Value::Date),
        }
    }

    /// The type of this value, `None` for `Null`.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Text(_) => Some(FieldType::Text),
            Value::Integer(_) => Some(FieldType::Integer),
            Value::Float(_) => Some(FieldType::Float),
            Value::Bool(_) => Some(FieldType::Bool),
            Value::Date(_) => Some(FieldType::Date),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered field list with a name index. Records store values positionally.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self, Error> {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), i).is_some() {
                return Err(Error::DuplicateField(field.name.clone()));
            }
        }
        Ok(Schema { fields, index })
    }

    /// Column position of `name`, or `Error::Schema` when absent.
    pub fn position(&self, name: &str) -> Result<usize, Error> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::Schema(name.to_string()))
    }

    pub fn field(&self, name: &str) -> Result<&Field, Error> {
        self.position(name).map(|i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Record – one row of the source table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Record { values }
    }

    pub fn get(&self, position: usize) -> &Value {
        self.values.get(position).unwrap_or(&Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// Calendar component extracted from a date field by [`Dataset::derive_date_part`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// Calendar year as an integer.
    Year,
    /// Quarter number 1–4.
    Quarter,
    /// Full month name ("January").
    MonthName,
    /// Abbreviated month and year ("Jan 2024").
    MonthLabel,
    /// First day of the month, as a date.
    MonthStart,
    /// The calendar day, time stripped.
    Day,
}

impl DatePart {
    fn field_type(self) -> FieldType {
        match self {
            DatePart::Year | DatePart::Quarter => FieldType::Integer,
            DatePart::MonthName | DatePart::MonthLabel => FieldType::Text,
            DatePart::MonthStart | DatePart::Day => FieldType::Date,
        }
    }

    fn extract(self, dt: NaiveDateTime) -> Value {
        let date = dt.date();
        match self {
            DatePart::Year => Value::Integer(date.year() as i64),
            DatePart::Quarter => Value::Integer(((date.month0() / 3) + 1) as i64),
            DatePart::MonthName => Value::Text(MONTH_NAMES[date.month0() as usize].to_string()),
            DatePart::MonthLabel => Value::Text(date.format("%b %Y").to_string()),
            DatePart::MonthStart => date
                .with_day(1)
                .map(|d| Value::Date(d.and_time(NaiveTime::MIN)))
                .unwrap_or(Value::Null),
            DatePart::Day => Value::Date(date.and_time(NaiveTime::MIN)),
        }
    }
}

/// The loaded dataset with its schema and per-field distinct values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Schema,
    records: Vec<Record>,
    date_field: Option<String>,
    /// For each field the sorted set of distinct values (filter options).
    unique_values: BTreeMap<String, BTreeSet<Value>>,
}

impl Dataset {
    /// Validate `records` against `schema` and build the distinct-value index.
    ///
    /// Integer cells in a float field are widened; any other type mismatch
    /// is an error. `date_field`, when given, must name a date field.
    pub fn new(
        schema: Schema,
        mut records: Vec<Record>,
        date_field: Option<&str>,
    ) -> Result<Self, Error> {
        if let Some(name) = date_field {
            let field = schema.field(name)?;
            if field.field_type != FieldType::Date {
                return Err(Error::Type {
                    field: name.to_string(),
                    expected: "date",
                    found: field.field_type,
                });
            }
        }

        for (row, record) in records.iter_mut().enumerate() {
            if record.values.len() != schema.len() {
                return Err(Error::Arity {
                    row,
                    expected: schema.len(),
                    found: record.values.len(),
                });
            }
            for (value, field) in record.values.iter_mut().zip(schema.fields()) {
                let Some(found) = value.field_type() else {
                    continue;
                };
                if found == field.field_type {
                    continue;
                }
                let widened = match (&*value, field.field_type) {
                    (Value::Integer(i), FieldType::Float) => Value::Float(*i as f64),
                    _ => {
                        return Err(Error::Cell {
                            row,
                            field: field.name.clone(),
                            expected: field.field_type,
                            found,
                        })
                    }
                };
                *value = widened;
            }
        }

        let mut unique_values: BTreeMap<String, BTreeSet<Value>> = BTreeMap::new();
        for (i, field) in schema.fields().iter().enumerate() {
            let values = records.iter().map(|r| r.get(i).clone()).collect();
            unique_values.insert(field.name.clone(), values);
        }

        Ok(Dataset {
            schema,
            records,
            date_field: date_field.map(str::to_string),
            unique_values,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The primary date field, if one was declared.
    pub fn date_field(&self) -> Option<&str> {
        self.date_field.as_deref()
    }

    /// Sorted distinct values of a field, nulls included.
    pub fn distinct(&self, field: &str) -> Result<&BTreeSet<Value>, Error> {
        self.unique_values
            .get(field)
            .ok_or_else(|| Error::Schema(field.to_string()))
    }

    /// Earliest and latest value of the primary date field.
    pub fn date_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let values = self.unique_values.get(self.date_field.as_deref()?)?;
        let mut dates = values.iter().filter_map(Value::as_date);
        let first = dates.next()?;
        let last = dates.last().unwrap_or(first);
        Some((first, last))
    }

    /// Return a new dataset with `name` computed from the date field `source`.
    /// Null source cells give null derived cells.
    pub fn derive_date_part(&self, source: &str, name: &str, part: DatePart) -> Result<Dataset, Error> {
        let position = self.schema.position(source)?;
        let source_type = self.schema.fields()[position].field_type;
        if source_type != FieldType::Date {
            return Err(Error::Type {
                field: source.to_string(),
                expected: "date",
                found: source_type,
            });
        }

        let mut fields = self.schema.fields().to_vec();
        fields.push(Field::new(name, part.field_type()));
        let schema = Schema::new(fields)?;

        let records = self
            .records
            .iter()
            .map(|r| {
                let mut values = r.values.clone();
                values.push(r.get(position).as_date().map_or(Value::Null, |d| part.extract(d)));
                Record::new(values)
            })
            .collect();

        Dataset::new(schema, records, self.date_field.as_deref())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
