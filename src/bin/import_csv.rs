// CSV import CLI: parse a scraped extract and drive the batch ingestion
// service, mirroring what the dashboard's uploader does over HTTP.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use csv::ReaderBuilder;
use itertools::Itertools;
use serde_json::{Map, Value};

use marketdash::db::Db;
use marketdash::ingest;
use marketdash::schema::Table;
use marketdash::util::env as env_util;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Product,
    Store,
    Category,
}

impl Kind {
    fn table(self) -> Table {
        match self {
            Kind::Product => Table::Products,
            Kind::Store => Table::Stores,
            Kind::Category => Table::Categories,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "import_csv", about = "Import a scraped CSV extract")]
struct Args {
    /// Path to the CSV file
    #[arg(long)]
    file: PathBuf,

    /// Entity type the file contains
    #[arg(long, value_enum)]
    kind: Kind,

    /// Rows submitted per ingestion call
    #[arg(long, default_value_t = 500)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let args = Args::parse();
    let table = args.kind.table();
    let schema = table.schema();

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&args.file)
        .with_context(|| format!("opening {}", args.file.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV header row")?
        .iter()
        .map(str::to_string)
        .collect();

    // Same preflight the uploader runs: refuse files missing the natural-key
    // columns outright instead of failing every row.
    let missing: Vec<&str> = schema
        .required
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        bail!("CSV is missing required column(s): {}", missing.join(", "));
    }

    let mut rows: Vec<Map<String, Value>> = Vec::new();
    for record in reader.records() {
        let record = record.context("reading CSV record")?;
        // Short records are padded with empty cells; extra cells are dropped.
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter().pad_using(headers.len(), |_| ""))
            .map(|(h, v)| (h.clone(), Value::from(v)))
            .collect();
        rows.push(row);
    }
    tracing::info!(rows = rows.len(), table = %table, "parsed CSV");

    env_util::init_env();
    let database_url = env_util::db_url()?;
    let db = Db::connect(&database_url, 5).await?;

    let mut inserted = 0usize;
    let mut failed = 0usize;
    for batch in rows.chunks(args.batch_size.max(1)) {
        let report = ingest::ingest(&db, table, batch).await?;
        inserted += report.inserted_ids.len();
        failed += report.failures.len();
        for failure in &report.failures {
            tracing::warn!(row = failure.index, reason = %failure.reason, "row skipped");
        }
    }

    println!(
        "imported {} of {} rows into {} ({} failed)",
        inserted,
        rows.len(),
        table,
        failed
    );
    Ok(())
}
