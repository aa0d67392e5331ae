use std::io::{self, Write};

use crate::dashboard::claims::ClaimsSummary;
use crate::dashboard::visits::VisitsSummary;
use crate::dashboard::ShareRow;
use crate::pipeline::{Group, PivotTable};

pub const NO_DATA: &str = "No data available for this selection";

pub fn write_claims(out: &mut impl Write, summary: &ClaimsSummary) -> io::Result<()> {
    writeln!(out, "Claims: {}", summary.filter_description)?;
    if summary.row_count == 0 {
        return writeln!(out, "{NO_DATA}");
    }

    writeln!(out, "  Total claimed amount    {:>16.2}", summary.total_claimed_amount)?;
    writeln!(out, "  Approved claim amount   {:>16.2}", summary.approved_claim_amount)?;
    writeln!(out, "  Approval percentage     {:>15.2}%", summary.approval_percentage)?;
    writeln!(out, "  Average claim amount    {:>16.2}", summary.average_claim_amount)?;
    writeln!(out, "  Claims per month        {:>16.2}", summary.average_claims_per_period)?;

    heading(out, "Claim types")?;
    write_shares(out, &summary.claim_types)?;
    heading(out, "Claim amount by year")?;
    write_groups(out, &summary.amount_by_year)?;
    heading(out, "Mean claim amount by type")?;
    write_groups(out, &summary.mean_amount_by_type)?;
    heading(out, "Claims by source")?;
    write_groups(out, &summary.claims_by_source)?;

    heading(out, "Average claim amount by month and type")?;
    for row in &summary.month_type {
        writeln!(
            out,
            "  {:<12} {:<24} {:>14.2} {:>8}",
            row.month.to_string(),
            row.claim_type.to_string(),
            row.average_amount,
            row.claims
        )?;
    }

    heading(out, "Provider claim amount")?;
    write_groups(out, &summary.provider_totals)?;
    heading(out, "Employer claim amount")?;
    write_groups(out, &summary.employer_totals)?;

    heading(out, "Claims over time")?;
    for point in &summary.over_time {
        writeln!(out, "  {:<20} {:>8} {:>16.2}", point.date.to_string(), point.claims, point.amount)?;
    }

    heading(out, "Month-wise claims summary")?;
    write_pivot(out, &summary.type_by_month)
}

pub fn write_visits(out: &mut impl Write, summary: &VisitsSummary) -> io::Result<()> {
    writeln!(out, "Visits: {}", summary.filter_description)?;
    if summary.row_count == 0 {
        return writeln!(out, "{NO_DATA}");
    }

    writeln!(out, "  Total visits            {:>16}", summary.row_count)?;
    writeln!(out, "  Day visits              {:>16}", summary.day_visits)?;
    writeln!(out, "  Night visits            {:>16}", summary.night_visits)?;
    writeln!(out, "  Visits per quarter      {:>16.2}", summary.average_visits_per_period)?;
    if let Some(peak) = &summary.peak_month {
        writeln!(out, "  Peak month              {:>16}", peak)?;
    }

    heading(out, "Monthly visits")?;
    for month in &summary.visits_by_month {
        match month.change_pct {
            Some(change) => writeln!(out, "  {:<12} {:>8} {:>+9.2}%", month.month, month.visits, change)?,
            None => writeln!(out, "  {:<12} {:>8} {:>10}", month.month, month.visits, "-")?,
        }
    }
    heading(out, "Visits by visit type")?;
    write_shares(out, &summary.visits_by_type)?;
    heading(out, "Top attending doctor specialisations")?;
    write_groups(out, &summary.top_specialisations)?;

    heading(out, "Visits by day")?;
    for day in &summary.daily_visits {
        writeln!(out, "  {:<12} {:>8}", day.day, day.visits)?;
    }

    heading(out, "Month-wise visit type summary")?;
    write_pivot(out, &summary.type_by_month)
}

fn heading(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{title}")
}

fn write_groups(out: &mut impl Write, groups: &[Group]) -> io::Result<()> {
    for group in groups {
        let label = group
            .key
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" / ");
        writeln!(out, "  {:<32} {:>16.2}", label, group.value)?;
    }
    Ok(())
}

fn write_shares(out: &mut impl Write, rows: &[ShareRow]) -> io::Result<()> {
    for row in rows {
        writeln!(
            out,
            "  {:<32} {:>8} {:>7.2}%",
            row.label.to_string(),
            row.count,
            row.percentage
        )?;
    }
    Ok(())
}

fn write_pivot(out: &mut impl Write, table: &PivotTable) -> io::Result<()> {
    write!(out, "  {:<24}", "")?;
    for column in &table.columns {
        write!(out, " {:>12}", column.to_string())?;
    }
    writeln!(out)?;
    for row in &table.rows {
        write!(out, "  {:<24}", row.label.to_string())?;
        for cell in &row.cells {
            match cell {
                Some(v) => write!(out, " {:>12.2}", v)?,
                None => write!(out, " {:>12}", "-")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::visits::MonthCount;
    use crate::data::model::Value;
    use crate::pipeline::PivotRow;

    fn empty_visits() -> VisitsSummary {
        VisitsSummary {
            row_count: 0,
            filter_description: "All Data".into(),
            day_visits: 0,
            night_visits: 0,
            average_visits_per_period: 0.0,
            visits_by_month: Vec::new(),
            peak_month: None,
            visits_by_type: Vec::new(),
            top_specialisations: Vec::new(),
            daily_visits: Vec::new(),
            type_by_month: PivotTable::default(),
        }
    }

    #[test]
    fn test_empty_summary_prints_no_data() {
        let mut out = Vec::new();
        write_visits(&mut out, &empty_visits()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("Visits: All Data\n{NO_DATA}\n"));
    }

    #[test]
    fn test_monthly_visits_show_change() {
        let mut summary = empty_visits();
        summary.row_count = 3;
        summary.visits_by_month = vec![
            MonthCount {
                month: "Jan 2024".into(),
                visits: 1,
                change_pct: None,
            },
            MonthCount {
                month: "Feb 2024".into(),
                visits: 2,
                change_pct: Some(100.0),
            },
        ];
        let mut out = Vec::new();
        write_visits(&mut out, &summary).unwrap();
        let text = String::from_utf8(out).unwrap();
        let jan = text.lines().find(|l| l.contains("Jan 2024")).unwrap();
        let feb = text.lines().find(|l| l.contains("Feb 2024")).unwrap();
        assert!(jan.trim_end().ends_with('-'));
        assert!(feb.trim_end().ends_with("+100.00%"));
    }

    #[test]
    fn test_pivot_marks_absent_cells() {
        let table = PivotTable {
            columns: vec!["January".into(), "March".into()],
            rows: vec![PivotRow {
                label: "Outpatient".into(),
                cells: vec![Some(2.0), None],
            }],
        };
        let mut out = Vec::new();
        write_pivot(&mut out, &table).unwrap();
        let text = String::from_utf8(out).unwrap();
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("  Outpatient"));
        assert!(last.contains("2.00"));
        assert!(last.trim_end().ends_with('-'));
    }

    #[test]
    fn test_groups_join_composite_keys() {
        let groups = vec![Group {
            key: vec![Value::Integer(2024), "Jan".into()],
            value: 3.0,
        }];
        let mut out = Vec::new();
        write_groups(&mut out, &groups).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("2024 / Jan"));
    }
}
