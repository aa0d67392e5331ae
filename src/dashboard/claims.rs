use std::collections::HashMap;

use serde::Serialize;

use super::{mean_per_group, shares, ShareRow};
use crate::config::DashboardConfig;
use crate::data::filter::{Criterion, FilterCriteria};
use crate::data::model::Value;
use crate::error::Error;
use crate::pipeline::{
    calendar_month_cmp, calendar_month_key_cmp, FilteredResult, Group, GroupOrder, PivotTable,
    Reduction,
};

/// Average amount and claim count for one (month, claim type) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTypeRow {
    pub month: Value,
    pub claim_type: Value,
    pub average_amount: f64,
    pub claims: usize,
}

/// Claims created at one instant inside a configured time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    pub date: Value,
    pub claims: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimsSummary {
    pub row_count: usize,
    pub filter_description: String,
    pub total_claimed_amount: f64,
    pub approved_claim_amount: f64,
    pub approval_percentage: f64,
    pub average_claim_amount: f64,
    pub average_claims_per_period: f64,
    pub claim_types: Vec<ShareRow>,
    pub amount_by_year: Vec<Group>,
    pub mean_amount_by_type: Vec<Group>,
    pub claims_by_source: Vec<Group>,
    pub month_type: Vec<MonthTypeRow>,
    pub provider_totals: Vec<Group>,
    pub employer_totals: Vec<Group>,
    pub over_time: Vec<TimePoint>,
    pub type_by_month: PivotTable,
}

pub fn summarize(
    result: &FilteredResult<'_>,
    criteria: &FilterCriteria,
    config: &DashboardConfig,
) -> Result<ClaimsSummary, Error> {
    let cols = &config.claims;
    let approved = Value::Text(config.approved_status.clone());

    let per_period = result.group_reduce(
        &[cols.year.as_str(), cols.month.as_str()],
        &cols.claim_id,
        Reduction::Count,
        GroupOrder::FirstSeen,
    )?;

    let mut type_by_month = result.pivot(&cols.claim_type, &cols.month, &cols.amount, Reduction::Mean)?;
    type_by_month.sort_rows_by(Value::cmp);
    type_by_month.sort_columns_by(calendar_month_cmp);

    Ok(ClaimsSummary {
        row_count: result.row_count(),
        filter_description: criteria.describe(&cols.facets()),
        total_claimed_amount: result.total_of(&cols.amount)?,
        approved_claim_amount: result.total_of(&cols.approved_amount)?,
        approval_percentage: result.proportion_where(&cols.status, &approved)? * 100.0,
        average_claim_amount: result.mean_of(&cols.amount)?,
        average_claims_per_period: mean_per_group(&per_period),
        claim_types: shares(&result.value_counts(&cols.claim_type)?),
        amount_by_year: result.group_reduce(
            &[cols.year.as_str()],
            &cols.amount,
            Reduction::Sum,
            GroupOrder::KeyAscending,
        )?,
        mean_amount_by_type: result.group_reduce(
            &[cols.claim_type.as_str()],
            &cols.amount,
            Reduction::Mean,
            GroupOrder::KeyAscending,
        )?,
        claims_by_source: result.value_counts(&cols.source)?,
        month_type: month_type_rows(result, config)?,
        provider_totals: result.group_reduce(
            &[cols.provider.as_str()],
            &cols.amount,
            Reduction::Sum,
            GroupOrder::ValueDescending,
        )?,
        employer_totals: result.group_reduce(
            &[cols.employer.as_str()],
            &cols.amount,
            Reduction::Sum,
            GroupOrder::ValueDescending,
        )?,
        over_time: over_time(result, config)?,
        type_by_month: type_by_month.to_table(),
    })
}

fn month_type_rows(result: &FilteredResult<'_>, config: &DashboardConfig) -> Result<Vec<MonthTypeRow>, Error> {
    let cols = &config.claims;
    let keys = [cols.month.as_str(), cols.claim_type.as_str()];
    let order = GroupOrder::By(&calendar_month_key_cmp);

    let counts: HashMap<Vec<Value>, f64> = result
        .group_reduce(&keys, &cols.claim_id, Reduction::Count, order)?
        .into_iter()
        .map(|g| (g.key, g.value))
        .collect();

    Ok(result
        .group_reduce(&keys, &cols.amount, Reduction::Mean, order)?
        .into_iter()
        .map(|g| {
            let claims = counts.get(&g.key).copied().unwrap_or(0.0) as usize;
            let mut key = g.key.into_iter();
            MonthTypeRow {
                month: key.next().unwrap_or(Value::Null),
                claim_type: key.next().unwrap_or(Value::Null),
                average_amount: g.value,
                claims,
            }
        })
        .collect())
}

/// Per-date claim count and amount inside each configured window, windows
/// concatenated in configuration order.
fn over_time(result: &FilteredResult<'_>, config: &DashboardConfig) -> Result<Vec<TimePoint>, Error> {
    let cols = &config.claims;
    let mut points = Vec::new();
    for window in &config.time_windows {
        let in_window = result.refine(
            &cols.created_date,
            Criterion::DateRange {
                start: window.start,
                end: window.end,
            },
        )?;
        let amounts = in_window.group_reduce(
            &[cols.created_date.as_str()],
            &cols.amount,
            Reduction::Sum,
            GroupOrder::KeyAscending,
        )?;
        let counts = in_window.group_reduce(
            &[cols.created_date.as_str()],
            &cols.amount,
            Reduction::Count,
            GroupOrder::KeyAscending,
        )?;
        points.extend(amounts.into_iter().zip(counts).map(|(amount, count)| TimePoint {
            date: amount.label().clone(),
            claims: count.value as usize,
            amount: amount.value,
        }));
    }
    Ok(points)
}
