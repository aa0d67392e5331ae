//! The filter-aggregate pipeline shared by every dashboard.
//!
//! [`apply`] narrows a [`Dataset`] with [`FilterCriteria`] and returns a
//! [`FilteredResult`]; every aggregate is computed on demand from that view.
//! Nothing is cached: identical inputs give identical outputs.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::data::filter::{filtered_indices, Criterion, FilterCriteria};
use crate::data::model::{Dataset, Record, Value, MONTH_NAMES};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Reductions and orderings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Rows per group, nulls included.
    Count,
    /// Sum of non-null values.
    Sum,
    /// Mean of non-null values; 0.0 when a group has none.
    Mean,
}

impl Reduction {
    fn needs_numeric(self) -> bool {
        !matches!(self, Reduction::Count)
    }
}

/// Comparator over whole group keys.
pub type KeyOrder<'a> = &'a dyn Fn(&[Value], &[Value]) -> Ordering;

/// Output order of [`FilteredResult::group_reduce`]. Every sort is stable, so
/// ties keep first-seen order.
#[derive(Clone, Copy)]
pub enum GroupOrder<'a> {
    FirstSeen,
    KeyAscending,
    ValueDescending,
    By(KeyOrder<'a>),
}

impl std::fmt::Debug for GroupOrder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupOrder::FirstSeen => f.write_str("FirstSeen"),
            GroupOrder::KeyAscending => f.write_str("KeyAscending"),
            GroupOrder::ValueDescending => f.write_str("ValueDescending"),
            GroupOrder::By(_) => f.write_str("By(..)"),
        }
    }
}

/// Position of a month name ("March", "mar") in the calendar, 0-based.
pub fn month_index(value: &Value) -> Option<usize> {
    let name = value.as_str()?.trim();
    MONTH_NAMES.iter().position(|m| {
        m.eq_ignore_ascii_case(name) || (name.len() == 3 && m[..3].eq_ignore_ascii_case(name))
    })
}

/// Calendar order for month-name values. Non-month values sort after all
/// months, by their natural order.
pub fn calendar_month_cmp(a: &Value, b: &Value) -> Ordering {
    match (month_index(a), month_index(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Group-key form of [`calendar_month_cmp`]: the first key component is the
/// month, the rest break ties in natural order.
pub fn calendar_month_key_cmp(a: &[Value], b: &[Value]) -> Ordering {
    match (a.split_first(), b.split_first()) {
        (Some((ma, ra)), Some((mb, rb))) => calendar_month_cmp(ma, mb).then_with(|| ra.cmp(rb)),
        _ => a.len().cmp(&b.len()),
    }
}

// ---------------------------------------------------------------------------
// Output shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: Vec<Value>,
    pub value: f64,
}

impl Group {
    /// First key component, for single-field groupings.
    pub fn label(&self) -> &Value {
        self.key.first().unwrap_or(&Value::Null)
    }
}

/// Two-dimensional grouped reduction. Combinations with no rows are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    rows: Vec<Value>,
    columns: Vec<Value>,
    cells: HashMap<(Value, Value), f64>,
}

impl Pivot {
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn columns(&self) -> &[Value] {
        &self.columns
    }

    pub fn get(&self, row: &Value, column: &Value) -> Option<f64> {
        self.cells.get(&(row.clone(), column.clone())).copied()
    }

    pub fn sort_rows_by(&mut self, cmp: impl Fn(&Value, &Value) -> Ordering) {
        self.rows.sort_by(|a, b| cmp(a, b));
    }

    pub fn sort_columns_by(&mut self, cmp: impl Fn(&Value, &Value) -> Ordering) {
        self.columns.sort_by(|a, b| cmp(a, b));
    }

    /// Dense row-major view for display; missing cells are `None`.
    pub fn to_table(&self) -> PivotTable {
        PivotTable {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| PivotRow {
                    label: r.clone(),
                    cells: self.columns.iter().map(|c| self.get(r, c)).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PivotTable {
    pub columns: Vec<Value>,
    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub label: Value,
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    rows: usize,
    non_null: usize,
    sum: f64,
}

impl Accumulator {
    fn push(&mut self, value: &Value) {
        self.rows += 1;
        if let Some(v) = value.as_f64() {
            self.non_null += 1;
            self.sum += v;
        }
    }

    fn finish(&self, reduction: Reduction) -> f64 {
        match reduction {
            Reduction::Count => self.rows as f64,
            Reduction::Sum => self.sum,
            Reduction::Mean if self.non_null > 0 => self.sum / self.non_null as f64,
            Reduction::Mean => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// apply / FilteredResult
// ---------------------------------------------------------------------------

/// Filter `dataset` by `criteria`.
///
/// Fails only for criteria naming unknown fields or placing a date range on a
/// non-date field. An inverted date range is valid and matches nothing.
pub fn apply<'a>(dataset: &'a Dataset, criteria: &FilterCriteria) -> Result<FilteredResult<'a>, Error> {
    let indices = filtered_indices(dataset, criteria)?;
    log::debug!("filter kept {} of {} records", indices.len(), dataset.len());
    Ok(FilteredResult { dataset, indices })
}

/// A filtered view over a borrowed dataset, in dataset order.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredResult<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> FilteredResult<'a> {
    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Positions of the kept records in the source dataset.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn records(&self) -> impl Iterator<Item = &'a Record> + '_ {
        let records = self.dataset.records();
        self.indices.iter().map(move |&i| &records[i])
    }

    pub fn row_count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Narrow this view further by one more criterion.
    pub fn refine(&self, field: &str, criterion: Criterion) -> Result<FilteredResult<'a>, Error> {
        let mut criteria = FilterCriteria::new();
        match criterion {
            Criterion::Values(values) => criteria.set_values(field, values),
            Criterion::DateRange { start, end } => criteria.set_date_range(field, start, end),
        }
        let resolved = criteria.resolve(self.dataset)?;
        let records = self.dataset.records();
        let indices = self
            .indices
            .iter()
            .copied()
            .filter(|&i| {
                resolved
                    .iter()
                    .all(|(position, c)| c.matches(records[i].get(*position)))
            })
            .collect();
        Ok(FilteredResult {
            dataset: self.dataset,
            indices,
        })
    }

    fn numeric_position(&self, field: &str) -> Result<usize, Error> {
        let position = self.dataset.schema().position(field)?;
        let field_type = self.dataset.schema().fields()[position].field_type;
        if !field_type.is_numeric() {
            return Err(Error::Type {
                field: field.to_string(),
                expected: "numeric",
                found: field_type,
            });
        }
        Ok(position)
    }

    /// Sum of a numeric field over the kept rows; nulls are skipped.
    pub fn total_of(&self, field: &str) -> Result<f64, Error> {
        let position = self.numeric_position(field)?;
        Ok(self
            .records()
            .filter_map(|r| r.get(position).as_f64())
            .sum())
    }

    /// `total_of(field) / row_count`, or `0.0` when no rows are kept.
    pub fn mean_of(&self, field: &str) -> Result<f64, Error> {
        let total = self.total_of(field)?;
        if self.row_count() == 0 {
            return Ok(0.0);
        }
        Ok(total / self.row_count() as f64)
    }

    /// Number of kept rows whose `field` equals `value`.
    pub fn count_where(&self, field: &str, value: &Value) -> Result<usize, Error> {
        let position = self.dataset.schema().position(field)?;
        Ok(self.records().filter(|r| r.get(position) == value).count())
    }

    /// Fraction of kept rows whose `field` equals `value`, in `[0, 1]`.
    pub fn proportion_where(&self, field: &str, value: &Value) -> Result<f64, Error> {
        let matches = self.count_where(field, value)?;
        if self.row_count() == 0 {
            return Ok(0.0);
        }
        Ok(matches as f64 / self.row_count() as f64)
    }

    /// Group the kept rows by `group_fields` and reduce `value_field` per group.
    pub fn group_reduce(
        &self,
        group_fields: &[&str],
        value_field: &str,
        reduction: Reduction,
        order: GroupOrder<'_>,
    ) -> Result<Vec<Group>, Error> {
        let schema = self.dataset.schema();
        let key_positions = group_fields
            .iter()
            .map(|f| schema.position(f))
            .collect::<Result<Vec<_>, _>>()?;
        let value_position = if reduction.needs_numeric() {
            self.numeric_position(value_field)?
        } else {
            schema.position(value_field)?
        };

        let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Accumulator)> = Vec::new();
        for record in self.records() {
            let key: Vec<Value> = key_positions.iter().map(|&p| record.get(p).clone()).collect();
            let slot = match slots.get(&key) {
                Some(&slot) => slot,
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, Accumulator::default()));
                    groups.len() - 1
                }
            };
            groups[slot].1.push(record.get(value_position));
        }

        let mut out: Vec<Group> = groups
            .into_iter()
            .map(|(key, acc)| Group {
                key,
                value: acc.finish(reduction),
            })
            .collect();

        match order {
            GroupOrder::FirstSeen => {}
            GroupOrder::KeyAscending => out.sort_by(|a, b| a.key.cmp(&b.key)),
            GroupOrder::ValueDescending => out.sort_by(|a, b| b.value.total_cmp(&a.value)),
            GroupOrder::By(cmp) => out.sort_by(|a, b| cmp(&a.key, &b.key)),
        }
        Ok(out)
    }

    /// Row count per distinct value of `field`, most frequent first.
    pub fn value_counts(&self, field: &str) -> Result<Vec<Group>, Error> {
        self.group_reduce(&[field], field, Reduction::Count, GroupOrder::ValueDescending)
    }

    /// Reduce `value_field` over every (row_field, col_field) combination present.
    /// Row and column labels come out in first-seen order.
    pub fn pivot(
        &self,
        row_field: &str,
        col_field: &str,
        value_field: &str,
        reduction: Reduction,
    ) -> Result<Pivot, Error> {
        let groups = self.group_reduce(
            &[row_field, col_field],
            value_field,
            reduction,
            GroupOrder::FirstSeen,
        )?;

        let mut rows = Vec::new();
        let mut columns = Vec::new();
        let mut seen_rows = HashSet::new();
        let mut seen_columns = HashSet::new();
        let mut cells = HashMap::with_capacity(groups.len());
        for group in groups {
            let mut key = group.key.into_iter();
            let row = key.next().unwrap_or(Value::Null);
            let column = key.next().unwrap_or(Value::Null);
            if seen_rows.insert(row.clone()) {
                rows.push(row.clone());
            }
            if seen_columns.insert(column.clone()) {
                columns.push(column.clone());
            }
            cells.insert((row, column), group.value);
        }

        Ok(Pivot {
            rows,
            columns,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Field, FieldType, Record, Schema};
    use chrono::NaiveDate;

    fn dataset() -> Dataset {
        let schema = Schema::new(vec![
            Field::new("Month", FieldType::Text),
            Field::new("Type", FieldType::Text),
            Field::new("Status", FieldType::Text),
            Field::new("Amount", FieldType::Float),
            Field::new("Created", FieldType::Date),
        ])
        .unwrap();
        let row = |month: &str, ty: &str, status: &str, amount: Value, day: u32| {
            Record::new(vec![
                month.into(),
                ty.into(),
                status.into(),
                amount,
                Value::Date(NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(9, 0, 0).unwrap()),
            ])
        };
        let records = vec![
            row("March", "Dental", "Approved", Value::Float(100.0), 1),
            row("January", "Optical", "Denied", Value::Float(300.0), 2),
            row("March", "Optical", "Approved", Value::Float(50.0), 3),
            row("February", "Dental", "Approved", Value::Null, 4),
            row("January", "Dental", "Denied", Value::Float(25.0), 5),
        ];
        Dataset::new(schema, records, Some("Created")).unwrap()
    }

    #[test]
    fn test_totals_and_means() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        assert_eq!(result.row_count(), 5);
        assert_eq!(result.total_of("Amount").unwrap(), 475.0);
        assert_eq!(result.mean_of("Amount").unwrap(), 95.0);
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        let ds = dataset();
        let criteria = FilterCriteria::new().with_values("Status", ["Pending".into()]);
        let result = apply(&ds, &criteria).unwrap();
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.total_of("Amount").unwrap(), 0.0);
        assert_eq!(result.mean_of("Amount").unwrap(), 0.0);
        assert_eq!(result.proportion_where("Status", &"Approved".into()).unwrap(), 0.0);
    }

    #[test]
    fn test_numeric_reduction_on_text_is_type_error() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        assert!(matches!(result.total_of("Status"), Err(Error::Type { .. })));
        assert!(matches!(
            result.group_reduce(&["Month"], "Type", Reduction::Mean, GroupOrder::FirstSeen),
            Err(Error::Type { .. })
        ));
        // Counting a text field is fine.
        assert!(result
            .group_reduce(&["Month"], "Type", Reduction::Count, GroupOrder::FirstSeen)
            .is_ok());
    }

    #[test]
    fn test_unknown_fields_are_schema_errors() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        assert_eq!(result.total_of("Nope").unwrap_err(), Error::Schema("Nope".into()));
        assert_eq!(
            result
                .group_reduce(&["Nope"], "Amount", Reduction::Sum, GroupOrder::FirstSeen)
                .unwrap_err(),
            Error::Schema("Nope".into())
        );
        assert!(result.pivot("Type", "Nope", "Amount", Reduction::Sum).is_err());
    }

    #[test]
    fn test_group_mean_first_seen_skips_nulls() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        let groups = result
            .group_reduce(&["Month"], "Amount", Reduction::Mean, GroupOrder::FirstSeen)
            .unwrap();
        let summary: Vec<(Value, f64)> = groups.iter().map(|g| (g.label().clone(), g.value)).collect();
        assert_eq!(
            summary,
            vec![
                ("March".into(), 75.0),
                ("January".into(), 162.5),
                ("February".into(), 0.0),
            ]
        );
    }

    #[test]
    fn test_group_calendar_order() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        let groups = result
            .group_reduce(
                &["Month", "Type"],
                "Amount",
                Reduction::Count,
                GroupOrder::By(&calendar_month_key_cmp),
            )
            .unwrap();
        let keys: Vec<String> = groups
            .iter()
            .map(|g| format!("{}/{}", g.key[0], g.key[1]))
            .collect();
        assert_eq!(
            keys,
            vec![
                "January/Dental",
                "January/Optical",
                "February/Dental",
                "March/Dental",
                "March/Optical"
            ]
        );
    }

    #[test]
    fn test_value_counts_ties_keep_first_seen() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        let counts = result.value_counts("Type").unwrap();
        assert_eq!(counts[0].label(), &Value::from("Dental"));
        assert_eq!(counts[0].value, 3.0);

        let months = result.value_counts("Month").unwrap();
        let labels: Vec<&Value> = months.iter().map(Group::label).collect();
        assert_eq!(
            labels,
            vec![&Value::from("March"), &Value::from("January"), &Value::from("February")]
        );
    }

    #[test]
    fn test_pivot_leaves_missing_cells_absent() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        let mut pivot = result.pivot("Type", "Month", "Amount", Reduction::Sum).unwrap();
        assert_eq!(pivot.get(&"Dental".into(), &"January".into()), Some(25.0));
        assert_eq!(pivot.get(&"Optical".into(), &"February".into()), None);

        pivot.sort_columns_by(calendar_month_cmp);
        let table = pivot.to_table();
        assert_eq!(
            table.columns,
            vec![Value::from("January"), Value::from("February"), Value::from("March")]
        );
        assert_eq!(table.rows[1].label, Value::from("Optical"));
        assert_eq!(table.rows[1].cells, vec![Some(300.0), None, Some(50.0)]);
    }

    #[test]
    fn test_refine_narrows_by_date() {
        let ds = dataset();
        let result = apply(&ds, &FilterCriteria::new().with_values("Type", ["Dental".into()])).unwrap();
        let refined = result
            .refine(
                "Created",
                Criterion::DateRange {
                    start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    end: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
                },
            )
            .unwrap();
        assert_eq!(refined.indices(), &[3]);
    }

    #[test]
    fn test_month_index() {
        assert_eq!(month_index(&"january".into()), Some(0));
        assert_eq!(month_index(&"Dec".into()), Some(11));
        assert_eq!(month_index(&"Smarch".into()), None);
        assert_eq!(month_index(&Value::Integer(3)), None);
        assert_eq!(calendar_month_cmp(&"Sep".into(), &"Other".into()), Ordering::Less);
    }
    fn rates(values: &[f64]) -> Dataset {
        let schema = Schema::new(vec![Field::new("rate", FieldType::Float)]).unwrap();
        let records = values.iter().map(|&v| Record::new(vec![Value::Float(v)])).collect();
        Dataset::new(schema, records, None).unwrap()
    }

    #[test]
    fn test_nan_rows_form_one_group() {
        let ds = rates(&[f64::NAN, f64::NAN, -f64::NAN]);
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        let groups = result
            .group_reduce(&["rate"], "rate", Reduction::Count, GroupOrder::FirstSeen)
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].value, 3.0);
        assert_eq!(ds.distinct("rate").unwrap().len(), 1);
        assert_eq!(apply(&ds, &FilterCriteria::new()).unwrap(), result);
    }

    #[test]
    fn test_signed_zero_groups_and_filters_alike() {
        let ds = rates(&[0.0, -0.0, 1.5]);
        let result = apply(&ds, &FilterCriteria::new()).unwrap();
        let groups = result
            .group_reduce(&["rate"], "rate", Reduction::Count, GroupOrder::FirstSeen)
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].value, 2.0);

        assert_eq!(result.count_where("rate", &Value::Float(0.0)).unwrap(), 2);
        let zero = FilterCriteria::new().with_values("rate", [Value::Float(0.0)]);
        assert_eq!(apply(&ds, &zero).unwrap().indices(), &[0, 1]);
    }
}
