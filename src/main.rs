use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use dashpipe::config::DashboardConfig;
use dashpipe::dashboard::{claims, visits};
use dashpipe::data::loader::{load_file, LoadOptions};
use dashpipe::data::model::{Dataset, Value};
use dashpipe::report;
use dashpipe::state::Session;

/// Dashpipe - claims and service-visits dashboards from tabular exports
#[derive(Parser)]
#[command(name = "dashpipe")]
#[command(about = "Filter a claims or visits export and print its dashboard summary")]
#[command(version)]
struct Cli {
    /// JSON file overriding column names and dashboard settings
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the summary as JSON instead of a text report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a claims export
    Claims(Selection),
    /// Summarize a service-visits export
    Visits(Selection),
}

#[derive(Args)]
struct Selection {
    /// CSV, JSON or Parquet file to load
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// First day of the date range (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day of the date range (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Keep rows whose FIELD equals VALUE; repeat to select several values
    #[arg(long = "filter", value_name = "FIELD=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
}

fn parse_filter(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
        _ => Err(format!("expected FIELD=VALUE, got '{arg}'")),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Command::Claims(selection) => {
            let dataset = load(&selection.file, &config.claims.load_options())?;
            let session = select(dataset, selection)?;
            let result = session.result()?;
            let summary = claims::summarize(&result, session.criteria(), &config)?;
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
            } else {
                report::write_claims(&mut out, &summary)?;
            }
        }
        Command::Visits(selection) => {
            let dataset = load(&selection.file, &config.visits.load_options())?;
            let dataset = visits::prepare(&dataset, &config.visits)?;
            let session = select(dataset, selection)?;
            let result = session.result()?;
            let summary = visits::summarize(&result, session.criteria(), &config)?;
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
            } else {
                report::write_visits(&mut out, &summary)?;
            }
        }
    }

    Ok(())
}

fn load(path: &Path, options: &LoadOptions) -> Result<Dataset> {
    load_file(path, options).with_context(|| format!("loading {}", path.display()))
}

/// Apply the command-line selections to a fresh session.
fn select(dataset: Dataset, selection: &Selection) -> Result<Session> {
    let mut session = Session::new(dataset);

    if selection.from.is_some() || selection.to.is_some() {
        let Some((lo, hi)) = session.default_date_range() else {
            bail!("--from/--to given but the dataset has no dated rows");
        };
        let start = selection.from.unwrap_or(lo);
        let end = selection.to.unwrap_or(hi);
        log::info!("date range {start} to {end}");
        session.set_date_range(start, end)?;
    }

    for (field, text) in &selection.filters {
        let field_type = session.dataset().schema().field(field)?.field_type;
        let Some(value) = Value::parse(text, field_type) else {
            bail!("'{text}' is not a valid {field_type} for field '{field}'");
        };
        session.select_value(field, value)?;
    }

    Ok(session)
}
