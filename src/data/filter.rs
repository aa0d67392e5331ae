use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use super::model::{Dataset, FieldType, Value};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Criterion: the acceptance rule for one field
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Accept records whose value is one of these. An empty set accepts all.
    Values(BTreeSet<Value>),
    /// Accept records whose date falls in `[start, end]`, compared by calendar day.
    /// The whole of `end` is inside the range: a timestamp at 23:59 on `end`
    /// matches, unlike a timestamp comparison against `end` at midnight.
    /// An inverted range accepts nothing.
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl Criterion {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Criterion::Values(selected) => selected.is_empty() || selected.contains(value),
            Criterion::DateRange { start, end } => match value.as_date() {
                Some(dt) => {
                    let day = dt.date();
                    *start <= day && day <= *end
                }
                None => false,
            },
        }
    }

    fn is_unconstrained(&self) -> bool {
        matches!(self, Criterion::Values(selected) if selected.is_empty())
    }
}

// ---------------------------------------------------------------------------
// FilterCriteria: per-field criteria, ANDed together
// ---------------------------------------------------------------------------

/// Maps field name → criterion. A field without an entry accepts every value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    criteria: BTreeMap<String, Criterion>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FilterCriteria::set_values`].
    pub fn with_values<I>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.set_values(field, values);
        self
    }

    /// Builder form of [`FilterCriteria::set_date_range`].
    pub fn with_date_range(mut self, field: &str, start: NaiveDate, end: NaiveDate) -> Self {
        self.set_date_range(field, start, end);
        self
    }

    pub fn set_values<I>(&mut self, field: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.criteria
            .insert(field.to_string(), Criterion::Values(values.into_iter().collect()));
    }

    /// Add one accepted value. Replaces a date range on the same field.
    pub fn add_value(&mut self, field: &str, value: Value) {
        match self.criteria.get_mut(field) {
            Some(Criterion::Values(selected)) => {
                selected.insert(value);
            }
            _ => self.set_values(field, [value]),
        }
    }

    /// Remove one accepted value; dropping the last one removes the criterion.
    pub fn remove_value(&mut self, field: &str, value: &Value) {
        if let Some(Criterion::Values(selected)) = self.criteria.get_mut(field) {
            selected.remove(value);
            if selected.is_empty() {
                self.criteria.remove(field);
            }
        }
    }

    pub fn set_date_range(&mut self, field: &str, start: NaiveDate, end: NaiveDate) {
        self.criteria
            .insert(field.to_string(), Criterion::DateRange { start, end });
    }

    pub fn clear_field(&mut self, field: &str) {
        self.criteria.remove(field);
    }

    pub fn clear(&mut self) {
        self.criteria.clear();
    }

    pub fn get(&self, field: &str) -> Option<&Criterion> {
        self.criteria.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Criterion)> {
        self.criteria.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when no field is constrained.
    pub fn is_unconstrained(&self) -> bool {
        self.criteria.values().all(Criterion::is_unconstrained)
    }

    /// Human-readable summary of the selected facet values, in `fields` order.
    /// Returns "All Data" when none of those fields carries a selection.
    pub fn describe(&self, fields: &[&str]) -> String {
        let parts: Vec<String> = fields
            .iter()
            .filter_map(|f| match self.criteria.get(*f) {
                Some(Criterion::Values(selected)) if !selected.is_empty() => Some(
                    selected
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            "All Data".to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Resolve every criterion to its schema position.
    ///
    /// Fails with `Error::Schema` for unknown fields and `Error::Type` for a
    /// date range on a non-date field.
    pub fn resolve<'c>(&'c self, dataset: &Dataset) -> Result<Vec<(usize, &'c Criterion)>, Error> {
        let schema = dataset.schema();
        let mut resolved = Vec::with_capacity(self.criteria.len());
        for (name, criterion) in &self.criteria {
            let position = schema.position(name)?;
            let field_type = schema.fields()[position].field_type;
            if matches!(criterion, Criterion::DateRange { .. }) && field_type != FieldType::Date {
                return Err(Error::Type {
                    field: name.clone(),
                    expected: "date",
                    found: field_type,
                });
            }
            if !criterion.is_unconstrained() {
                resolved.push((position, criterion));
            }
        }
        Ok(resolved)
    }
}

/// Return indices of records that pass every criterion, in dataset order.
pub fn filtered_indices(dataset: &Dataset, criteria: &FilterCriteria) -> Result<Vec<usize>, Error> {
    let resolved = criteria.resolve(dataset)?;
    Ok(dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, record)| {
            resolved
                .iter()
                .all(|(position, criterion)| criterion.matches(record.get(*position)))
        })
        .map(|(i, _)| i)
        .collect())
}
