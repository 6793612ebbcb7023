use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Initialize the global tracing subscriber for a single ingest run.
///
/// Logs go to stderr and, simultaneously, to a timestamped file under
/// `<data_dir>/logs/`, so a run kicked off from a cron job still leaves a
/// durable record even when its stderr is discarded. `RUST_LOG` always
/// wins over `--log-level`/`-v`/`-q` when set.
pub fn init(cli: &Cli, data_dir: &Path) -> Result<()> {
    let level = resolve_level(cli);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = cli.logs_dir.clone().unwrap_or_else(|| data_dir.join("logs"));
    fs::create_dir_all(&log_dir).with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("pixarr-ingest-{}.log", chrono::Utc::now().format("%Y%m%d_%H%M%S")));
    let log_file = File::create(&log_path).with_context(|| format!("creating log file {}", log_path.display()))?;

    let writer = std::io::stderr.and(log_file);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

fn resolve_level(cli: &Cli) -> &'static str {
    let base = match cli.log_level.as_str() {
        "error" => 0i8,
        "warn" => 1,
        "info" => 2,
        "debug" => 3,
        "trace" => 4,
        _ => 2,
    };
    let adjusted = (base + cli.verbose as i8 - cli.quiet as i8).clamp(0, 4);
    match adjusted {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}
