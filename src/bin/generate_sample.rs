use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use parquet::arrow::ArrowWriter;

use dashpipe::data::model::MONTH_NAMES;

const CLAIMS: usize = 600;
const VISITS: usize = 1500;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_f64() * n as f64) as usize % n.max(1)
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }

    /// Log-normal amount, rounded to cents.
    fn amount(&mut self, median: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (median * (0.6 * z).exp() * 100.0).round() / 100.0
    }
}

/// Days since 1970-01-01, the Arrow `Date32` encoding.
fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - 719_163
}

fn random_day(rng: &mut SimpleRng, start: NaiveDate) -> NaiveDate {
    start + Duration::days(rng.below(730) as i64)
}

fn write_claims(rng: &mut SimpleRng, start: NaiveDate, path: &str) -> Result<()> {
    let statuses = ["Approved", "Approved", "Approved", "Pending", "Rejected"];
    let sources = ["Hospital", "Clinic", "Pharmacy", "Laboratory"];
    let employers = ["Acme Ltd", "Globex", "Initech", "Umbrella Corp", "Stark Industries"];
    let providers = ["City Hospital", "Lakeside Clinic", "Central Pharmacy", "Metro Labs", "Hilltop Medical"];
    let types = [("Outpatient", 120.0), ("Inpatient", 2400.0), ("Dental", 300.0), ("Optical", 180.0)];

    let mut ids = Vec::with_capacity(CLAIMS);
    let mut created = Vec::with_capacity(CLAIMS);
    let mut diagnosed = Vec::with_capacity(CLAIMS);
    let mut years = Vec::with_capacity(CLAIMS);
    let mut months = Vec::with_capacity(CLAIMS);
    let mut status_col = Vec::with_capacity(CLAIMS);
    let mut source_col = Vec::with_capacity(CLAIMS);
    let mut employer_col = Vec::with_capacity(CLAIMS);
    let mut provider_col = Vec::with_capacity(CLAIMS);
    let mut type_col = Vec::with_capacity(CLAIMS);
    let mut amounts = Vec::with_capacity(CLAIMS);
    let mut approved = Vec::with_capacity(CLAIMS);

    for id in 0..CLAIMS {
        let day = random_day(rng, start);
        let (claim_type, median) = types[rng.below(types.len())];
        let status = rng.pick(&statuses);
        let amount = rng.amount(median);

        ids.push(100_000 + id as i64);
        created.push(epoch_days(day));
        // One claim in twenty has no recorded diagnosis date.
        diagnosed.push((rng.below(20) != 0).then(|| epoch_days(day - Duration::days(rng.below(30) as i64))));
        years.push(day.year() as i64);
        months.push(MONTH_NAMES[day.month0() as usize]);
        status_col.push(status);
        source_col.push(rng.pick(&sources));
        employer_col.push(rng.pick(&employers));
        provider_col.push(rng.pick(&providers));
        type_col.push(claim_type);
        amounts.push(amount);
        approved.push(if status == "Approved" { amount } else { 0.0 });
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("Claim ID", DataType::Int64, false),
        Field::new("Claim Created Date", DataType::Date32, false),
        Field::new("Date Of Diagnosis", DataType::Date32, true),
        Field::new("Year", DataType::Int64, false),
        Field::new("Month", DataType::Utf8, false),
        Field::new("Claim Status", DataType::Utf8, false),
        Field::new("Source", DataType::Utf8, false),
        Field::new("Employer Name", DataType::Utf8, false),
        Field::new("Provider Name", DataType::Utf8, false),
        Field::new("Claim Type", DataType::Utf8, false),
        Field::new("Claim Amount", DataType::Float64, false),
        Field::new("Approved Claim Amount", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Date32Array::from(created)),
            Arc::new(Date32Array::from(diagnosed)),
            Arc::new(Int64Array::from(years)),
            Arc::new(StringArray::from(months)),
            Arc::new(StringArray::from(status_col)),
            Arc::new(StringArray::from(source_col)),
            Arc::new(StringArray::from(employer_col)),
            Arc::new(StringArray::from(provider_col)),
            Arc::new(StringArray::from(type_col)),
            Arc::new(Float64Array::from(amounts)),
            Arc::new(Float64Array::from(approved)),
        ],
    )
    .context("building claims batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    println!("Wrote {CLAIMS} claims to {path}");
    Ok(())
}

fn write_visits(rng: &mut SimpleRng, start: NaiveDate, path: &str) -> Result<()> {
    let visit_types = ["Outpatient", "Outpatient", "Inpatient", "Emergency", "Telemedicine"];
    let specialisations = [
        "General Practice",
        "Cardiology",
        "Pediatrics",
        "Dermatology",
        "Orthopedics",
        "Gynecology",
        "Neurology",
        "Ophthalmology",
        "Psychiatry",
        "Radiology",
        "Oncology",
        "Urology",
    ];

    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {path}"))?;
    writer.write_record([
        "visit_id",
        "visit_created_on",
        "year",
        "quarter",
        "MonthName",
        "visit_type",
        "DayOrNight",
        "attending_doctor_specialisation",
    ])?;

    for id in 0..VISITS {
        let day = random_day(rng, start);
        let time = NaiveTime::from_hms_opt(rng.below(24) as u32, rng.below(60) as u32, 0).unwrap_or(NaiveTime::MIN);
        let created = day.and_time(time);
        let shift = if (7..19).contains(&created.hour()) { "Day" } else { "Night" };

        writer.write_record([
            (1 + id).to_string(),
            created.format("%Y-%m-%d %H:%M:%S").to_string(),
            day.year().to_string(),
            (day.month0() / 3 + 1).to_string(),
            MONTH_NAMES[day.month0() as usize].to_string(),
            rng.pick(&visit_types).to_string(),
            shift.to_string(),
            rng.pick(&specialisations).to_string(),
        ])?;
    }
    writer.flush()?;

    println!("Wrote {VISITS} visits to {path}");
    Ok(())
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).context("invalid start date")?;

    write_claims(&mut rng, start, "sample_claims.parquet")?;
    write_visits(&mut rng, start, "sample_visits.csv")?;
    Ok(())
}
