use std::path::PathBuf;

use clap::Parser;

/// Walk one or more staging sources, hash and classify every file found,
/// and place new media into the Review queue (or the catalog's Library,
/// for files already promoted there under a matching hash).
#[derive(Debug, Parser)]
#[command(name = "pixarr-ingest", version, about)]
pub struct Cli {
    /// Staging source labels to ingest, e.g. `pc`, `icloud`, `Staging/sdcard`.
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Actually move files and write to the catalog. Without this flag the
    /// run is a dry run: every decision is logged and recorded as a batch,
    /// but no file is moved and no catalog row is written.
    #[arg(long)]
    pub write: bool,

    /// Root data directory (contains media/, db/, thumb-cache/). Overrides
    /// `paths.data_dir` from the config file.
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Path to the TOML config file. Defaults to `$PIXARR_CONFIG` if set,
    /// otherwise `<data-dir>/pixarr.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Free-text note stored with this ingest batch.
    #[arg(long)]
    pub note: Option<String>,

    /// Directory for log files. Overrides `<data-dir>/logs`.
    #[arg(long, value_name = "PATH")]
    pub logs_dir: Option<PathBuf>,

    /// Log a heartbeat line every N files processed within a source.
    /// Overrides the config file's heartbeat interval; 0 disables it.
    #[arg(long, value_name = "N")]
    pub heartbeat: Option<u64>,

    /// Duplicate-handling policy for files already sitting in Review
    /// (`ignore`, `quarantine`, `delete`). Overrides `ingest.on_review_dupe`
    /// from the config file. Has no effect on a duplicate already promoted
    /// to Library, which always quarantines.
    #[arg(long, value_name = "POLICY")]
    pub on_review_dupe: Option<String>,

    /// Allow a file's own modify-date tags to supply a capture date when no
    /// real capture-date tag is present.
    #[arg(long)]
    pub allow_file_dates: bool,

    /// Allow a date parsed out of the filename to supply a capture date
    /// when metadata carries no usable date at all.
    #[arg(long)]
    pub allow_filename_dates: bool,

    /// Minimum log level (error, warn, info, debug, trace). Overridden by
    /// RUST_LOG when that's set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Increase log verbosity; stackable (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease log verbosity; stackable (-q, -qq).
    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Emit structured JSON log lines instead of human-readable text.
    #[arg(long)]
    pub json_logs: bool,
}
