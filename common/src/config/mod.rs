use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument, warn, Level};

/// Duplicate-handling policy for files that land in Review a second time.
///
/// A duplicate already promoted to Library always quarantines (subject to
/// the `duplicate_in_library` toggle); this enum only governs the
/// Review-vs-Review case, gated by `duplicate_in_review`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDupePolicy {
    Ignore,
    Quarantine,
    Delete,
}

impl Default for ReviewDupePolicy {
    fn default() -> Self {
        ReviewDupePolicy::Quarantine
    }
}

/// Accepted file extensions, normalized to lowercase with a leading dot.
///
/// RAW extensions count as both `raw` and `image`: a legacy stats rule
/// carried over from the original implementation (see DESIGN.md), kept
/// intentionally rather than cleaned up.
#[derive(Clone, Debug)]
pub struct Formats {
    image: HashSet<String>,
    raw: HashSet<String>,
    video: HashSet<String>,
}

impl Formats {
    fn from_raw(image: &[String], raw: &[String], video: &[String]) -> Self {
        Formats {
            image: normalize_ext_list(image),
            raw: normalize_ext_list(raw),
            video: normalize_ext_list(video),
        }
    }

    pub fn is_image(&self, ext: &str) -> bool {
        self.image.contains(ext) || self.raw.contains(ext)
    }

    pub fn is_raw(&self, ext: &str) -> bool {
        self.raw.contains(ext)
    }

    pub fn is_video(&self, ext: &str) -> bool {
        self.video.contains(ext)
    }

    pub fn is_supported(&self, ext: &str) -> bool {
        self.image.contains(ext) || self.raw.contains(ext) || self.video.contains(ext)
    }
}

fn normalize_ext_list(exts: &[String]) -> HashSet<String> {
    exts.iter()
        .filter_map(|e| {
            let e = e.trim().to_lowercase();
            if e.is_empty() {
                return None;
            }
            Some(if e.starts_with('.') { e } else { format!(".{e}") })
        })
        .collect()
}

/// Per-reason quarantine toggles; unknown reasons default to enabled.
#[derive(Clone, Debug)]
pub struct QuarantineToggles {
    toggles: HashMap<String, bool>,
}

impl QuarantineToggles {
    pub fn enabled(&self, reason: &str) -> bool {
        *self.toggles.get(reason).unwrap_or(&true)
    }
}

/// Immutable, process-wide engine configuration.
///
/// Built once at startup from an optional TOML file and passed down by
/// reference; unlike the original's module-level config dict, nothing here
/// is mutated after construction.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub review_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub thumb_dir: PathBuf,
    pub db_path: PathBuf,
    pub staging_roots: HashMap<String, PathBuf>,
    pub formats: Formats,
    pub dry_run_default: bool,
    pub allow_file_dates: bool,
    pub allow_filename_dates: bool,
    pub on_review_dupe: ReviewDupePolicy,
    pub quarantine: QuarantineToggles,
    pub heartbeat_every: u64,
}

impl EngineConfig {
    pub fn quarantine_root(&self) -> PathBuf {
        self.data_dir.join("media").join("Quarantine")
    }

    /// Resolve a CLI-supplied source label against the configured staging
    /// roots, accepting either the bare root name or a `Staging/<name>`
    /// prefixed form.
    pub fn resolve_source(&self, label: &str) -> Option<(String, PathBuf)> {
        if let Some(path) = self.staging_roots.get(label) {
            return Some((label.to_owned(), path.clone()));
        }
        let short = label.strip_prefix("Staging/").unwrap_or(label);
        self.staging_roots
            .get(short)
            .map(|path| (format!("Staging/{short}"), path.clone()))
    }
}

// -------------------- on-disk document --------------------

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsSection,
    #[serde(default)]
    staging: StagingSection,
    #[serde(default)]
    formats: FormatsSection,
    #[serde(default)]
    ingest: IngestSection,
    #[serde(default)]
    quarantine: HashMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct PathsSection {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    review_subdir: Option<PathBuf>,
    #[serde(default)]
    staging_subdir: Option<PathBuf>,
    #[serde(default)]
    thumb_subdir: Option<PathBuf>,
    #[serde(default)]
    db_path: Option<PathBuf>,
    #[serde(default)]
    db_subdir: Option<PathBuf>,
    #[serde(default)]
    db_file: Option<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        PathsSection {
            data_dir: None,
            review_subdir: None,
            staging_subdir: None,
            thumb_subdir: None,
            db_path: None,
            db_subdir: None,
            db_file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StagingSection {
    #[serde(default)]
    roots: HashMap<String, PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FormatsSection {
    #[serde(default = "default_image_ext")]
    images: Vec<String>,
    #[serde(default = "default_raw_ext")]
    raw: Vec<String>,
    #[serde(default = "default_video_ext")]
    videos: Vec<String>,
}

impl Default for FormatsSection {
    fn default() -> Self {
        FormatsSection {
            images: default_image_ext(),
            raw: default_raw_ext(),
            videos: default_video_ext(),
        }
    }
}

fn default_image_ext() -> Vec<String> {
    ["jpg", "jpeg", "png", "tif", "tiff", "gif", "webp", "heic", "heif", "avif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_raw_ext() -> Vec<String> {
    ["dng", "cr2", "cr3", "nef", "arw", "raf", "rw2", "orf", "srw"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_video_ext() -> Vec<String> {
    ["mp4", "mov", "m4v", "avi", "webm", "mkv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize)]
struct IngestSection {
    #[serde(default = "default_true")]
    dry_run_default: bool,
    #[serde(default)]
    allow_file_dates: bool,
    #[serde(default)]
    allow_filename_dates: bool,
    #[serde(default)]
    on_review_dupe: ReviewDupePolicy,
}

impl Default for IngestSection {
    fn default() -> Self {
        IngestSection {
            dry_run_default: true,
            allow_file_dates: false,
            allow_filename_dates: false,
            on_review_dupe: ReviewDupePolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_staging_roots() -> HashMap<String, PathBuf> {
    [("pc", "pc"), ("other", "other"), ("icloud", "icloud"), ("sdcard", "sdcard")]
        .iter()
        .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
        .collect()
}

/// Load configuration from a TOML file. A missing file or a parse error
/// degrades to an all-defaults config and logs a warning; it never aborts
/// startup, mirroring the original's tolerant config loader.
#[instrument(level = Level::DEBUG, skip(data_dir))]
pub fn load(path: Option<&Path>, data_dir: PathBuf) -> EngineConfig {
    let parsed = path
        .and_then(|p| match std::fs::read_to_string(p) {
            Ok(doc) => match toml::from_str::<ConfigFile>(&doc) {
                Ok(cfg) => Some(cfg),
                Err(err) => {
                    warn!(path = %p.display(), error = %err, "failed to parse config file, using defaults");
                    None
                }
            },
            Err(err) => {
                warn!(path = %p.display(), error = %err, "failed to read config file, using defaults");
                None
            }
        })
        .unwrap_or_default();

    build(parsed, data_dir)
}

fn build(cfg: ConfigFile, default_data_dir: PathBuf) -> EngineConfig {
    let data_dir = cfg.paths.data_dir.clone().unwrap_or(default_data_dir);

    let review_dir = data_dir.join(
        cfg.paths
            .review_subdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("media/Review")),
    );
    let staging_dir = data_dir.join(
        cfg.paths
            .staging_subdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("media/Staging")),
    );
    let thumb_dir = data_dir.join(
        cfg.paths
            .thumb_subdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("thumb-cache")),
    );

    let db_path = match cfg.paths.db_path.clone() {
        Some(p) if p.is_absolute() => p,
        Some(p) => data_dir.join(p),
        None => {
            let subdir = cfg.paths.db_subdir.clone().unwrap_or_else(|| PathBuf::from("db"));
            let file = cfg.paths.db_file.clone().unwrap_or_else(|| PathBuf::from("app.sqlite3"));
            data_dir.join(subdir).join(file)
        }
    };

    let staging_roots: HashMap<String, PathBuf> = {
        let mut roots = default_staging_roots();
        roots.extend(cfg.staging.roots.clone());
        roots
            .into_iter()
            .map(|(name, sub)| {
                let resolved = if sub.is_absolute() { sub } else { staging_dir.join(sub) };
                (name, resolved)
            })
            .collect()
    };

    let formats = Formats::from_raw(&cfg.formats.images, &cfg.formats.raw, &cfg.formats.videos);

    let mut toggles = HashMap::new();
    for reason in [
        "junk",
        "unsupported_ext",
        "zero_bytes",
        "stat_error",
        "move_failed",
        "duplicate_in_library",
        "duplicate_in_review",
        "missing_datetime",
    ] {
        toggles.insert(reason.to_string(), true);
    }
    toggles.extend(cfg.quarantine);

    debug!(?data_dir, ?db_path, "engine config resolved");

    EngineConfig {
        data_dir,
        review_dir,
        staging_dir,
        thumb_dir,
        db_path,
        staging_roots,
        formats,
        dry_run_default: cfg.ingest.dry_run_default,
        allow_file_dates: cfg.ingest.allow_file_dates,
        allow_filename_dates: cfg.ingest.allow_filename_dates,
        on_review_dupe: cfg.ingest.on_review_dupe,
        quarantine: QuarantineToggles { toggles },
        heartbeat_every: 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_file() {
        let cfg = load(None, PathBuf::from("/tmp/pixarr-test-data"));
        assert_eq!(cfg.review_dir, PathBuf::from("/tmp/pixarr-test-data/media/Review"));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/pixarr-test-data/db/app.sqlite3"));
        assert!(cfg.dry_run_default);
        assert_eq!(cfg.on_review_dupe, ReviewDupePolicy::Quarantine);
        assert!(cfg.formats.is_image(".jpg"));
        assert!(cfg.formats.is_image(".dng")); // legacy stats rule
        assert!(cfg.formats.is_raw(".dng"));
        assert!(!cfg.formats.is_video(".dng"));
    }

    #[test]
    fn malformed_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixarr.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();

        let cfg = load(Some(&path), PathBuf::from("/tmp/pixarr-test-data"));
        assert!(cfg.dry_run_default);
    }

    #[test]
    fn explicit_db_path_overrides_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixarr.toml");
        std::fs::write(
            &path,
            r#"
            [paths]
            data_dir = "/data/pixarr"
            db_path = "custom/app.sqlite3"
            "#,
        )
        .unwrap();

        let cfg = load(Some(&path), PathBuf::from("/unused"));
        assert_eq!(cfg.db_path, PathBuf::from("/data/pixarr/custom/app.sqlite3"));
    }
}
