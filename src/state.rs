use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::data::filter::{Criterion, FilterCriteria};
use crate::data::model::{Dataset, Value};
use crate::error::Error;
use crate::pipeline::{apply, FilteredResult};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// One dashboard session: the dataset loaded at startup plus the filter
/// selections of the input layer. Every change is followed by a fresh
/// [`Session::result`]; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct Session {
    dataset: Dataset,
    criteria: FilterCriteria,
}

impl Session {
    pub fn new(dataset: Dataset) -> Self {
        Session {
            dataset,
            criteria: FilterCriteria::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Selectable values for a facet, drawn from the loaded data.
    pub fn facet_options(&self, field: &str) -> Result<&BTreeSet<Value>, Error> {
        self.dataset.distinct(field)
    }

    /// Default date selection: the full span of the primary date field.
    pub fn default_date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.dataset
            .date_bounds()
            .map(|(lo, hi)| (lo.date(), hi.date()))
    }

    /// Restrict the primary date field to `[start, end]`.
    pub fn set_date_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<(), Error> {
        let field = self
            .dataset
            .date_field()
            .ok_or_else(|| Error::Schema("<primary date>".to_string()))?
            .to_string();
        self.criteria.set_date_range(&field, start, end);
        Ok(())
    }

    /// Toggle a single value in a facet's selection.
    pub fn toggle_filter_value(&mut self, field: &str, value: &Value) -> Result<(), Error> {
        self.dataset.schema().position(field)?;
        let selected = matches!(
            self.criteria.get(field),
            Some(Criterion::Values(values)) if values.contains(value)
        );
        if selected {
            self.criteria.remove_value(field, value);
        } else {
            self.criteria.add_value(field, value.clone());
        }
        Ok(())
    }

    /// Add a value to a facet's selection, leaving it selected if it already was.
    pub fn select_value(&mut self, field: &str, value: Value) -> Result<(), Error> {
        self.dataset.schema().position(field)?;
        self.criteria.add_value(field, value);
        Ok(())
    }

    /// Select every value of a facet.
    pub fn select_all(&mut self, field: &str) -> Result<(), Error> {
        let all_values = self.dataset.distinct(field)?.clone();
        self.criteria.set_values(field, all_values);
        Ok(())
    }

    /// Drop a facet's selection so it accepts everything again.
    pub fn clear_filter(&mut self, field: &str) {
        self.criteria.clear_field(field);
    }

    pub fn clear_all(&mut self) {
        self.criteria.clear();
    }

    /// Recompute the filtered view for the current selections.
    pub fn result(&self) -> Result<FilteredResult<'_>, Error> {
        apply(&self.dataset, &self.criteria)
    }
}
