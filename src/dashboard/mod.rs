/// Dashboard summaries built on the shared pipeline.
///
/// Each dashboard takes a [`FilteredResult`](crate::pipeline::FilteredResult)
/// plus the criteria that produced it and returns a serializable summary. An
/// empty filter result yields `row_count == 0` and empty tables; the renderer
/// decides how to show "no data".
pub mod claims;
pub mod visits;

use serde::Serialize;

use crate::data::model::Value;
use crate::pipeline::Group;

/// A category's row count and its share of the total, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareRow {
    pub label: Value,
    pub count: usize,
    pub percentage: f64,
}

/// Turn single-field count groups into percentage shares.
pub fn shares(counts: &[Group]) -> Vec<ShareRow> {
    let total: f64 = counts.iter().map(|g| g.value).sum();
    counts
        .iter()
        .map(|g| ShareRow {
            label: g.label().clone(),
            count: g.value as usize,
            percentage: if total > 0.0 { g.value / total * 100.0 } else { 0.0 },
        })
        .collect()
}

/// Mean of the group values, 0.0 for no groups.
pub fn mean_per_group(groups: &[Group]) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    groups.iter().map(|g| g.value).sum::<f64>() / groups.len() as f64
}
