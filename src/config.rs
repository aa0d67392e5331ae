use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::loader::LoadOptions;

/// Column names of the claims export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClaimsColumns {
    pub created_date: String,
    pub diagnosis_date: String,
    pub year: String,
    pub month: String,
    pub status: String,
    pub source: String,
    pub employer: String,
    pub provider: String,
    pub claim_type: String,
    pub claim_id: String,
    pub amount: String,
    pub approved_amount: String,
}

impl Default for ClaimsColumns {
    fn default() -> Self {
        ClaimsColumns {
            created_date: "Claim Created Date".into(),
            diagnosis_date: "Date Of Diagnosis".into(),
            year: "Year".into(),
            month: "Month".into(),
            status: "Claim Status".into(),
            source: "Source".into(),
            employer: "Employer Name".into(),
            provider: "Provider Name".into(),
            claim_type: "Claim Type".into(),
            claim_id: "Claim ID".into(),
            amount: "Claim Amount".into(),
            approved_amount: "Approved Claim Amount".into(),
        }
    }
}

impl ClaimsColumns {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            date_fields: vec![self.diagnosis_date.clone()],
            primary_date: Some(self.created_date.clone()),
        }
    }

    /// Facets named in the filter description, in display order.
    pub fn facets(&self) -> [&str; 3] {
        [self.year.as_str(), self.month.as_str(), self.status.as_str()]
    }
}

/// Column names of the service-visits export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisitsColumns {
    pub created_on: String,
    pub visit_id: String,
    pub year: String,
    pub quarter: String,
    pub month: String,
    pub visit_type: String,
    pub day_or_night: String,
    pub specialisation: String,
}

impl Default for VisitsColumns {
    fn default() -> Self {
        VisitsColumns {
            created_on: "visit_created_on".into(),
            visit_id: "visit_id".into(),
            year: "year".into(),
            quarter: "quarter".into(),
            month: "MonthName".into(),
            visit_type: "visit_type".into(),
            day_or_night: "DayOrNight".into(),
            specialisation: "attending_doctor_specialisation".into(),
        }
    }
}

impl VisitsColumns {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            date_fields: Vec::new(),
            primary_date: Some(self.created_on.clone()),
        }
    }

    pub fn facets(&self) -> [&str; 4] {
        [
            self.year.as_str(),
            self.quarter.as_str(),
            self.month.as_str(),
            self.visit_type.as_str(),
        ]
    }
}

/// Inclusive calendar window for the claims-over-time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardConfig {
    pub claims: ClaimsColumns,
    pub visits: VisitsColumns,
    pub approved_status: String,
    pub day_label: String,
    pub night_label: String,
    pub top_n: usize,
    pub time_windows: Vec<TimeWindow>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let window = |(y1, m1, d1): (i32, u32, u32), (y2, m2, d2): (i32, u32, u32)| {
            NaiveDate::from_ymd_opt(y1, m1, d1)
                .zip(NaiveDate::from_ymd_opt(y2, m2, d2))
                .map(|(start, end)| TimeWindow { start, end })
        };
        DashboardConfig {
            claims: ClaimsColumns::default(),
            visits: VisitsColumns::default(),
            approved_status: "Approved".into(),
            day_label: "Day".into(),
            night_label: "Night".into(),
            top_n: 10,
            time_windows: [
                window((2023, 3, 1), (2023, 10, 31)),
                window((2024, 1, 1), (2024, 6, 30)),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON config file. Omitted keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}
