//! 🚀 skux-cli: the front door. Loads config, sets up logging, runs one
//! ingestion, prints the receipt. The real work lives in the `skux` crate. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use skux::{IngestReport, Overrides};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 🛒 Ingest a product catalogue CSV into MongoDB, backing the raw file up to S3 first.
#[derive(Parser, Debug)]
#[command(name = "skux", version, about)]
struct Cli {
    /// TOML config file. Layered in only if it exists.
    #[arg(default_value = "skux.toml")]
    config: PathBuf,

    /// CSV to ingest (overrides CSV_PATH and csv.path)
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Upserts per bulk write
    #[arg(long)]
    batch_size: Option<usize>,

    /// Run the whole pipeline against an in-memory collection; nothing is written to MongoDB
    #[arg(long)]
    dry_run: bool,

    /// Skip the raw S3 backup even if a bucket is configured
    #[arg(long)]
    no_archive: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            csv_path: self.csv_path.clone(),
            batch_size: self.batch_size,
            dry_run: self.dry_run,
            no_archive: self.no_archive,
        }
    }
}

/// 🚀 main(): one thread, one run, one exit code.
///
/// 🔧 Steps:
/// 1. `.env` (if any) and CLI args
/// 2. Load config (env + optional TOML), apply CLI overrides
/// 3. Init tracing: `RUST_LOG` wins, else `log_level` from config
/// 4. Run, then print the summary or the error chain and exit 1
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // -- 🌱 a missing .env is normal, not an error
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let config_file = cli.config.as_path();
    let the_config_file_if_it_exists = match config_file.try_exists().context(format!(
        "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
        config_file.display()
    ))? {
        true => Some(config_file),
        false => None,
    };

    let mut app_config = match skux::load_config(the_config_file_if_it_exists) {
        Ok(app_config) => app_config,
        Err(err) => {
            init_tracing("info");
            report_failure(&err);
            std::process::exit(1);
        }
    };
    app_config.apply(cli.overrides());
    init_tracing(&app_config.log_level);

    match the_config_file_if_it_exists {
        Some(path) => info!("🔧 Configuration loaded from env and '{}'", path.display()),
        None => info!("🔧 Configuration loaded from env only"),
    }
    if cli.dry_run {
        warn!("🧪 Dry run: upserts go to an in-memory collection and vanish at exit");
    }

    match skux::run(app_config).await {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 💀 Log the error and every cause under it, plus a hint when it smells like the network.
fn report_failure(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("Server selection timeout")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("dispatch failure")
            || cause_str.contains("dns error")
            || cause_str.contains("failed to lookup address")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like MongoDB or S3 isn't reachable. Check MONGO_URI, the cluster's \
             IP allow list, AWS_REGION and credentials. Running locally? `docker ps` to see \
             what's up, or `docker compose up -d` to resurrect it. ☕"
        );
    }
}

fn print_summary(report: &IngestReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("📦 skux run"), Cell::new("")]);

    let the_rows: Vec<(&str, String)> = vec![
        ("CSV", report.csv_path.clone()),
        ("Rows loaded", report.rows_loaded.to_string()),
        ("Rows skipped (no product_id)", report.rows_skipped.to_string()),
        (
            "Raw backup",
            report
                .archive_key
                .clone()
                .unwrap_or_else(|| "skipped".to_string()),
        ),
        ("Batches", report.totals.batches.to_string()),
        ("Matched", report.totals.matched.to_string()),
        ("Modified", report.totals.modified.to_string()),
        ("Upserted", report.totals.upserted.to_string()),
        ("Changed (modified + upserted)", report.totals.changed().to_string()),
        ("Write errors", report.totals.write_errors.to_string()),
    ];
    for (label, value) in the_rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }

    println!("{table}");
}
