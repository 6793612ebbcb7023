mod cli;
mod logging;
mod orchestrator;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use common::catalog::Catalog;
use common::config::{self, ReviewDupePolicy};
use common::metadata;
use tracing::{info, warn};

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !metadata::is_exiftool_available() {
        eprintln!("fatal: exiftool was not found on PATH; install it and retry");
        std::process::exit(1);
    }

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var_os("PIXARR_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("PIXARR_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let default = data_dir.join("pixarr.toml");
            default.exists().then_some(default)
        });

    logging::init(&cli, &data_dir)?;

    let mut engine_config = config::load(config_path.as_deref(), data_dir);

    if let Some(heartbeat) = cli.heartbeat {
        engine_config.heartbeat_every = heartbeat;
    }
    if cli.allow_file_dates {
        engine_config.allow_file_dates = true;
    }
    if cli.allow_filename_dates {
        engine_config.allow_filename_dates = true;
    }
    if let Some(policy) = cli.on_review_dupe.as_deref() {
        match policy.to_lowercase().as_str() {
            "ignore" => engine_config.on_review_dupe = ReviewDupePolicy::Ignore,
            "quarantine" => engine_config.on_review_dupe = ReviewDupePolicy::Quarantine,
            "delete" => engine_config.on_review_dupe = ReviewDupePolicy::Delete,
            other => warn!(policy = other, "unrecognized --on-review-dupe value, keeping config default"),
        }
    }

    let catalog = Catalog::open(&engine_config.db_path)?;

    let write = if cli.write { true } else { !engine_config.dry_run_default };

    info!(sources = ?cli.sources, write, "starting ingest");
    let summary = orchestrator::run_batch(&engine_config, &catalog, &cli.sources, write, cli.note.as_deref())?;

    println!(
        "walked={} placed={} updated={} skipped_dup={} skipped={} quarantined={} fatal={}",
        summary.walked,
        summary.placed,
        summary.updated,
        summary.skipped_dup,
        summary.skipped,
        summary.quarantined,
        summary.fatal
    );

    Ok(())
}
