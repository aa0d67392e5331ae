use chrono::NaiveDate;

use dashpipe::data::filter::FilterCriteria;
use dashpipe::data::model::{Dataset, Field, FieldType, Record, Schema, Value};
use dashpipe::pipeline::{apply, GroupOrder, Reduction};

fn date(y: i32, m: u32, d: u32) -> Value {
    Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
}

fn claims(rows: &[(&str, &str, f64, Value)]) -> Dataset {
    let schema = Schema::new(vec![
        Field::new("Month", FieldType::Text),
        Field::new("status", FieldType::Text),
        Field::new("Amount", FieldType::Float),
        Field::new("created", FieldType::Date),
    ])
    .unwrap();
    let records = rows
        .iter()
        .map(|(month, status, amount, created)| {
            Record::new(vec![
                (*month).into(),
                (*status).into(),
                Value::Float(*amount),
                created.clone(),
            ])
        })
        .collect();
    Dataset::new(schema, records, Some("created")).unwrap()
}

fn sample() -> Dataset {
    claims(&[
        ("Jan", "Approved", 100.0, date(2023, 1, 10)),
        ("Jan", "Approved", 300.0, date(2023, 1, 20)),
        ("Feb", "Denied", 50.0, date(2023, 2, 5)),
        ("Mar", "Approved", 75.5, date(2024, 3, 1)),
        ("Jun", "Denied", 20.25, date(2024, 6, 30)),
    ])
}

#[test]
fn unconstrained_criteria_keep_every_record() {
    let ds = sample();
    let result = apply(&ds, &FilterCriteria::new()).unwrap();
    assert_eq!(result.row_count(), ds.len());
    assert!(result.records().eq(ds.records().iter()));

    // An empty selection is unconstrained too.
    let criteria = FilterCriteria::new().with_values("status", Vec::<Value>::new());
    assert_eq!(apply(&ds, &criteria).unwrap().row_count(), ds.len());
}

#[test]
fn mean_of_empty_result_is_zero() {
    let ds = sample();
    let criteria = FilterCriteria::new().with_values("status", ["Pending".into()]);
    let result = apply(&ds, &criteria).unwrap();
    assert_eq!(result.row_count(), 0);
    assert_eq!(result.mean_of("Amount").unwrap(), 0.0);
    assert_eq!(result.total_of("Amount").unwrap(), 0.0);
    assert_eq!(result.proportion_where("status", &"Approved".into()).unwrap(), 0.0);
}

#[test]
fn total_is_independent_of_record_order() {
    let rows = [
        ("Jan", "Approved", 0.1, date(2023, 1, 1)),
        ("Feb", "Denied", 0.2, date(2023, 2, 1)),
        ("Mar", "Approved", 0.3, date(2023, 3, 1)),
        ("Apr", "Approved", 1e6, date(2023, 4, 1)),
    ];
    let forward = claims(&rows);
    let mut reversed_rows = rows.to_vec();
    reversed_rows.reverse();
    let reversed = claims(&reversed_rows);

    let criteria = FilterCriteria::new().with_values("status", ["Approved".into()]);
    let a = apply(&forward, &criteria).unwrap().total_of("Amount").unwrap();
    let b = apply(&reversed, &criteria).unwrap().total_of("Amount").unwrap();
    assert!((a - b).abs() < 1e-6);
    assert!((a - 1_000_000.4).abs() < 1e-6);
}

#[test]
fn count_groups_sum_to_row_count() {
    let ds = sample();
    let criteria = FilterCriteria::new().with_date_range(
        "created",
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
    );
    let result = apply(&ds, &criteria).unwrap();
    let groups = result
        .group_reduce(&["Month", "status"], "Amount", Reduction::Count, GroupOrder::FirstSeen)
        .unwrap();
    let total: f64 = groups.iter().map(|g| g.value).sum();
    assert_eq!(total as usize, result.row_count());
    assert_eq!(result.row_count(), 3);
}

#[test]
fn proportion_is_matches_over_rows() {
    let ds = claims(&[
        ("Jan", "Approved", 1.0, date(2023, 1, 1)),
        ("Jan", "Approved", 1.0, date(2023, 1, 2)),
        ("Jan", "Denied", 1.0, date(2023, 1, 3)),
        ("Jan", "Approved", 1.0, date(2023, 1, 4)),
        ("Jan", "Denied", 1.0, date(2023, 1, 5)),
    ]);
    let result = apply(&ds, &FilterCriteria::new()).unwrap();
    assert_eq!(result.proportion_where("status", &"Approved".into()).unwrap(), 0.6);
    assert_eq!(result.proportion_where("status", &"Denied".into()).unwrap(), 2.0 / 5.0);
}

#[test]
fn apply_is_idempotent() {
    let ds = sample();
    let criteria = FilterCriteria::new()
        .with_values("Month", ["Jan".into(), "Jun".into()])
        .with_values("status", ["Approved".into(), "Denied".into()]);
    let first = apply(&ds, &criteria).unwrap();
    let second = apply(&ds, &criteria).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.indices(), &[0, 1, 4]);
}

#[test]
fn inverted_date_range_matches_nothing() {
    let ds = sample();
    let criteria = FilterCriteria::new().with_date_range(
        "created",
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
    );
    let result = apply(&ds, &criteria).unwrap();
    assert_eq!(result.row_count(), 0);
    assert!(result.is_empty());
}

#[test]
fn mean_by_month_in_first_seen_order() {
    let ds = claims(&[
        ("Jan", "Approved", 100.0, date(2023, 1, 1)),
        ("Jan", "Approved", 300.0, date(2023, 1, 2)),
        ("Feb", "Approved", 50.0, date(2023, 2, 1)),
    ]);
    let result = apply(&ds, &FilterCriteria::new()).unwrap();
    let groups: Vec<(Value, f64)> = result
        .group_reduce(&["Month"], "Amount", Reduction::Mean, GroupOrder::FirstSeen)
        .unwrap()
        .into_iter()
        .map(|g| (g.label().clone(), g.value))
        .collect();
    assert_eq!(groups, vec![("Jan".into(), 200.0), ("Feb".into(), 50.0)]);
}

#[test]
fn unknown_fields_are_schema_errors() {
    let ds = sample();
    let criteria = FilterCriteria::new().with_values("nope", ["x".into()]);
    assert_eq!(
        apply(&ds, &criteria).unwrap_err(),
        dashpipe::Error::Schema("nope".into())
    );

    let result = apply(&ds, &FilterCriteria::new()).unwrap();
    assert!(result.total_of("missing").is_err());
    assert!(matches!(
        result.total_of("status"),
        Err(dashpipe::Error::Type { .. })
    ));
}
