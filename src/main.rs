//! Reclaim Cycle CLI
//!
//! Loads the three keyed streams from CSV, runs one cycle for a carrier,
//! and writes one outcome line per cycle header to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --owner UP --service-month 200203 --phase 1 \
//!     --headers headers.csv --rates rates.csv --history history.csv > outcomes.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use clap::Parser;
use log::info;
use reclaim_cycle::record::{HeaderRow, HistoryRow, RateRow};
use reclaim_cycle::{run_cycle, write_outcomes, JobConfig, MemoryStore, Result, ServiceMonth};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "reclaim-cycle")]
#[command(about = "Settle cycle headers against reclaim rates and movement history")]
struct Args {
    /// Carrier/road whose records are processed
    #[arg(long)]
    owner: String,

    /// Service month, YYYYMM
    #[arg(long)]
    service_month: ServiceMonth,

    /// Job phase (1 or 2)
    #[arg(long)]
    phase: String,

    /// Cycle header CSV
    #[arg(long)]
    headers: PathBuf,

    /// Reclaim rate master CSV
    #[arg(long)]
    rates: PathBuf,

    /// Equipment movement history CSV
    #[arg(long)]
    history: PathBuf,

    /// Carrier participates in TOL
    #[arg(long)]
    tol_participant: bool,

    /// Run TOL detection for voluntary trips
    #[arg(long)]
    voluntary_trip: bool,

    /// Run TOL detection for estimate trips
    #[arg(long)]
    estimate_trip: bool,

    /// Months before this one use historical rate tables, YYYYMM
    #[arg(long)]
    mods_effective_month: Option<ServiceMonth>,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the cycle aborted.
fn run() -> Result<bool> {
    let args = Args::parse();

    let headers = MemoryStore::from_path(&args.headers, HeaderRow::parse)?;
    let rates = MemoryStore::from_path(&args.rates, RateRow::parse)?;
    let history = MemoryStore::from_path(&args.history, HistoryRow::parse)?;

    let mut config = JobConfig::new(&args.owner, args.service_month, &args.phase);
    config.tol_participant = args.tol_participant;
    config.voluntary_trip = args.voluntary_trip;
    config.estimate_trip = args.estimate_trip;
    config.mods_effective_month = args.mods_effective_month;

    let result = run_cycle(config, headers, rates, history);

    let stdout = io::stdout();
    let handle = stdout.lock();
    write_outcomes(&result, handle)?;

    info!(
        "{} resolved, {} failed, retrieval {:?}",
        result.resolved_count(),
        result.failed_count(),
        result.retrieval_mode
    );
    for follow_up in &result.follow_ups {
        info!("Follow-up required: {:?}", follow_up);
    }

    if let Some(reason) = &result.abort_reason {
        eprintln!("Aborted: {}", reason);
    }
    Ok(!result.aborted)
}
