use chrono::NaiveDate;
use serde::Serialize;

use super::{mean_per_group, shares, ShareRow};
use crate::config::{DashboardConfig, VisitsColumns};
use crate::data::filter::FilterCriteria;
use crate::data::model::{DatePart, Dataset, Value};
use crate::error::Error;
use crate::pipeline::{
    calendar_month_cmp, FilteredResult, Group, GroupOrder, PivotTable, Reduction,
};

/// Derived columns added by [`prepare`].
pub const MONTH_START_FIELD: &str = "visit_month_start";
pub const MONTH_NAME_FIELD: &str = "visit_month";
pub const DAY_FIELD: &str = "visit_day";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCount {
    /// "Jan 2024"
    pub month: String,
    pub visits: usize,
    /// Percent change from the previous month; `None` for the first month.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub day: NaiveDate,
    pub visits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitsSummary {
    pub row_count: usize,
    pub filter_description: String,
    pub day_visits: usize,
    pub night_visits: usize,
    pub average_visits_per_period: f64,
    pub visits_by_month: Vec<MonthCount>,
    pub peak_month: Option<String>,
    pub visits_by_type: Vec<ShareRow>,
    pub top_specialisations: Vec<Group>,
    pub daily_visits: Vec<DayCount>,
    pub type_by_month: PivotTable,
}

/// Add the calendar columns the visits summary groups by.
pub fn prepare(dataset: &Dataset, cols: &VisitsColumns) -> Result<Dataset, Error> {
    dataset
        .derive_date_part(&cols.created_on, MONTH_START_FIELD, DatePart::MonthStart)?
        .derive_date_part(&cols.created_on, MONTH_NAME_FIELD, DatePart::MonthName)?
        .derive_date_part(&cols.created_on, DAY_FIELD, DatePart::Day)
}

/// Summarize a filtered view over a dataset returned by [`prepare`].
pub fn summarize(
    result: &FilteredResult<'_>,
    criteria: &FilterCriteria,
    config: &DashboardConfig,
) -> Result<VisitsSummary, Error> {
    let cols = &config.visits;

    let per_period = result.group_reduce(
        &[cols.year.as_str(), cols.quarter.as_str()],
        &cols.visit_id,
        Reduction::Count,
        GroupOrder::FirstSeen,
    )?;

    let mut visits_by_month: Vec<MonthCount> = result
        .group_reduce(
            &[MONTH_START_FIELD],
            MONTH_START_FIELD,
            Reduction::Count,
            GroupOrder::KeyAscending,
        )?
        .into_iter()
        .filter_map(|g| {
            let start = g.label().as_date()?;
            Some(MonthCount {
                month: start.format("%b %Y").to_string(),
                visits: g.value as usize,
                change_pct: None,
            })
        })
        .collect();
    for i in 1..visits_by_month.len() {
        let previous = visits_by_month[i - 1].visits as f64;
        let current = visits_by_month[i].visits as f64;
        visits_by_month[i].change_pct = Some((current - previous) / previous * 100.0);
    }

    // Earliest month wins a tie.
    let peak_month = visits_by_month
        .iter()
        .fold(None::<&MonthCount>, |best, m| match best {
            Some(b) if b.visits >= m.visits => Some(b),
            _ => Some(m),
        })
        .map(|m| m.month.clone());

    let mut top_specialisations = result.value_counts(&cols.specialisation)?;
    top_specialisations.truncate(config.top_n);

    let daily_visits = result
        .group_reduce(&[DAY_FIELD], DAY_FIELD, Reduction::Count, GroupOrder::KeyAscending)?
        .into_iter()
        .filter_map(|g| {
            Some(DayCount {
                day: g.label().as_date()?.date(),
                visits: g.value as usize,
            })
        })
        .collect();

    let mut type_by_month = result.pivot(
        &cols.visit_type,
        MONTH_NAME_FIELD,
        &cols.visit_id,
        Reduction::Count,
    )?;
    type_by_month.sort_columns_by(calendar_month_cmp);

    let day = Value::Text(config.day_label.clone());
    let night = Value::Text(config.night_label.clone());

    Ok(VisitsSummary {
        row_count: result.row_count(),
        filter_description: criteria.describe(&cols.facets()),
        day_visits: result.count_where(&cols.day_or_night, &day)?,
        night_visits: result.count_where(&cols.day_or_night, &night)?,
        average_visits_per_period: mean_per_group(&per_period),
        visits_by_month,
        peak_month,
        visits_by_type: shares(&result.value_counts(&cols.visit_type)?),
        top_specialisations,
        daily_visits,
        type_by_month: type_by_month.to_table(),
    })
}
