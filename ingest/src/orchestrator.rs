use std::path::Path;

use anyhow::Result;
use common::catalog::{Catalog, MediaState, MediaUpsert};
use common::classifier::{classify, Classification};
use common::config::{EngineConfig, ReviewDupePolicy};
use common::hash::{content_sha256, file_sha256};
use common::metadata::read_metadata;
use common::time_resolver::resolve_taken_at;
use common::{fsops, walker};
use serde_json::json;
use tracing::{info, instrument, warn};

/// What happened to a single candidate file, for the end-of-run summary.
#[derive(Debug)]
pub enum FileOutcome {
    Placed,
    Updated,
    SkippedDup,
    /// A would-be quarantine whose reason toggle is turned off in config;
    /// the file is simply left where it is.
    Skipped,
    Quarantined { reason: String },
    FatalPerFile { error: String },
}

/// Running totals across every source in a batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub walked: u64,
    pub junk: u64,
    pub unsupported: u64,
    pub zero_bytes: u64,
    pub placed: u64,
    pub updated: u64,
    pub skipped_dup: u64,
    pub skipped: u64,
    pub quarantined: u64,
    pub fatal: u64,
}

impl BatchSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Placed => self.placed += 1,
            FileOutcome::Updated => self.updated += 1,
            FileOutcome::SkippedDup => self.skipped_dup += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Quarantined { .. } => self.quarantined += 1,
            FileOutcome::FatalPerFile { .. } => self.fatal += 1,
        }
    }
}

/// Run an ingest batch over the given source labels.
///
/// Every per-file failure is caught and recorded rather than propagated:
/// one corrupt file or permission error must never abort a run over
/// thousands of others. Only batch-level setup (catalog open, unresolved
/// source label) returns an error.
#[instrument(skip_all, fields(sources = ?sources, dry_run = !write))]
pub fn run_batch(
    config: &EngineConfig,
    catalog: &Catalog,
    sources: &[String],
    write: bool,
    note: Option<&str>,
) -> Result<BatchSummary> {
    let dry_run = !write;
    let batch_id = catalog.begin_ingest(note, dry_run)?;
    let mut summary = BatchSummary::default();

    for label in sources {
        let Some((resolved_label, root)) = config.resolve_source(label) else {
            warn!(label, "unknown staging source, skipping");
            continue;
        };

        info!(source = %resolved_label, root = %root.display(), "walking source");
        let entries = walker::walk_source(&root);
        summary.walked += entries.len() as u64;

        for (i, entry) in entries.iter().enumerate() {
            if config.heartbeat_every > 0 && i > 0 && i as u64 % config.heartbeat_every == 0 {
                info!(source = %resolved_label, processed = i, total = entries.len(), "heartbeat");
            }

            let classification = classify(&entry.path, entry.size, &config.formats);
            let outcome = match classification {
                Classification::Junk => {
                    summary.junk += 1;
                    maybe_quarantine(config, &entry.path, "junk", &batch_id, dry_run)
                }
                Classification::UnsupportedExt => {
                    summary.unsupported += 1;
                    maybe_quarantine(config, &entry.path, "unsupported_ext", &batch_id, dry_run)
                }
                Classification::ZeroBytes => {
                    summary.zero_bytes += 1;
                    maybe_quarantine(config, &entry.path, "zero_bytes", &batch_id, dry_run)
                }
                Classification::Candidate => {
                    process_candidate(config, catalog, &entry.path, &resolved_label, &batch_id, dry_run)
                }
            };

            match &outcome {
                Ok(outcome) => summary.record(outcome),
                Err(err) => {
                    warn!(path = %entry.path.display(), %err, "fatal per-file error, skipping");
                    summary.fatal += 1;
                }
            }
        }
    }

    catalog.finish_ingest(&batch_id)?;
    info!(?summary, "ingest batch finished");
    Ok(summary)
}

fn maybe_quarantine(
    config: &EngineConfig,
    path: &Path,
    reason: &str,
    batch_id: &str,
    dry_run: bool,
) -> Result<FileOutcome> {
    if !config.quarantine.enabled(reason) {
        return Ok(FileOutcome::Skipped);
    }
    fsops::quarantine_file(&config.quarantine_root(), path, reason, batch_id, None, dry_run)?;
    Ok(FileOutcome::Quarantined { reason: reason.to_owned() })
}

/// Process a single already-classified media candidate: hash it, resolve
/// any duplicate against the catalog, and either place it in Review or
/// quarantine it per the configured duplicate policy.
fn process_candidate(
    config: &EngineConfig,
    catalog: &Catalog,
    path: &Path,
    source_label: &str,
    batch_id: &str,
    dry_run: bool,
) -> Result<FileOutcome> {
    let file_hash = match file_sha256(path) {
        Ok(hash) => hash,
        Err(err) => {
            warn!(path = %path.display(), %err, "stat/read error, quarantining");
            return maybe_quarantine(config, path, "stat_error", batch_id, dry_run);
        }
    };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    let content_hash = if config.formats.is_image(&ext) {
        content_sha256(path).ok()
    } else {
        None
    };

    if let Some(existing) = catalog.find_existing(&file_hash, content_hash.as_deref())? {
        // A hash match against a Review-state record whose canonical file
        // has since vanished from disk isn't a duplicate at all -- the
        // photo it pointed at is gone, so this copy is re-placed into
        // Review rather than quarantined or ignored. Library/Quarantined/
        // Deleted records never take this path: their canonical file is
        // either immutable or deliberately out of the catalog's care.
        let canon_missing = existing.state == MediaState::Review
            && !existing
                .canonical_path
                .as_deref()
                .map(|p| Path::new(p).exists())
                .unwrap_or(false);

        if !canon_missing {
            return handle_duplicate(config, catalog, path, source_label, batch_id, dry_run, existing);
        }
        info!(path = %path.display(), media_id = %existing.id, "review canonical file missing, re-placing");
    }

    let metadata = read_metadata(path).unwrap_or_default();
    let taken_at = resolve_taken_at(
        &metadata,
        path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
        config.allow_file_dates,
        config.allow_filename_dates,
    );

    let dest_name = fsops::canonical_name(taken_at, &file_hash, &ext);
    let dest_path = fsops::plan_nonclobber(&config.review_dir, &dest_name);

    if dry_run {
        return Ok(FileOutcome::Placed);
    }

    if let Err(err) = fsops::move_file(path, &dest_path) {
        warn!(path = %path.display(), %err, "move failed, quarantining");
        return quarantine_move_failure(config, catalog, path, &file_hash, content_hash, batch_id, source_label);
    }

    let upsert = MediaUpsert {
        hash_sha256: file_hash,
        content_hash,
        canonical_path: dest_path.display().to_string(),
        taken_at,
        width: None,
        height: None,
        gps_lat: None,
        gps_lon: None,
        state: MediaState::Review,
        quarantine_reason: None,
    };
    let media_id = catalog.upsert_media(&upsert)?;
    catalog.insert_sighting(&media_id, batch_id, source_label, &path.display().to_string())?;

    Ok(FileOutcome::Placed)
}

/// Route a file whose move into Review failed through the quarantiner,
/// recording a catalog row so the failure survives the run instead of
/// leaving the source file untouched with no trace.
fn quarantine_move_failure(
    config: &EngineConfig,
    catalog: &Catalog,
    path: &Path,
    file_hash: &str,
    content_hash: Option<String>,
    batch_id: &str,
    source_label: &str,
) -> Result<FileOutcome> {
    let reason = "move_failed";
    if !config.quarantine.enabled(reason) {
        return Ok(FileOutcome::Skipped);
    }

    let quarantined_to = fsops::quarantine_file(&config.quarantine_root(), path, reason, batch_id, None, false)?
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let upsert = MediaUpsert {
        hash_sha256: file_hash.to_owned(),
        content_hash,
        canonical_path: quarantined_to,
        taken_at: None,
        width: None,
        height: None,
        gps_lat: None,
        gps_lon: None,
        state: MediaState::Quarantined,
        quarantine_reason: Some(reason.to_owned()),
    };
    let media_id = catalog.upsert_media(&upsert)?;
    catalog.insert_sighting(&media_id, batch_id, source_label, &path.display().to_string())?;

    Ok(FileOutcome::Quarantined { reason: reason.to_owned() })
}

fn handle_duplicate(
    config: &EngineConfig,
    catalog: &Catalog,
    path: &Path,
    source_label: &str,
    batch_id: &str,
    dry_run: bool,
    existing: common::catalog::ExistingMedia,
) -> Result<FileOutcome> {
    let policy = match existing.state {
        MediaState::Library => ReviewDupePolicy::Quarantine,
        _ => config.on_review_dupe,
    };

    let reason = match existing.state {
        MediaState::Library => "duplicate_in_library",
        _ => "duplicate_in_review",
    };

    match policy {
        ReviewDupePolicy::Ignore => {
            // Still log this sighting: the file is a known duplicate, not
            // new media, but its provenance (this source, this path, this
            // batch) is worth keeping for later auditing.
            if !dry_run {
                catalog.insert_sighting(&existing.id, batch_id, source_label, &path.display().to_string())?;
            }
            Ok(FileOutcome::Updated)
        }
        ReviewDupePolicy::Quarantine => {
            if !config.quarantine.enabled(reason) {
                return Ok(FileOutcome::Skipped);
            }
            let extra = json!({ "basis": existing.basis.as_str(), "dupe_of": existing.id });
            fsops::quarantine_file(&config.quarantine_root(), path, reason, batch_id, Some(extra), dry_run)?;
            if !dry_run {
                catalog.insert_sighting(&existing.id, batch_id, source_label, &path.display().to_string())?;
            }
            Ok(FileOutcome::Quarantined { reason: reason.to_owned() })
        }
        ReviewDupePolicy::Delete => {
            if !dry_run {
                std::fs::remove_file(path)?;
                catalog.insert_sighting(&existing.id, batch_id, source_label, &path.display().to_string())?;
            }
            Ok(FileOutcome::SkippedDup)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::catalog::{DupeBasis, ExistingMedia};

    fn test_config(data_dir: &Path) -> EngineConfig {
        common::config::load(None, data_dir.to_path_buf())
    }

    #[test]
    fn review_duplicate_quarantines_under_collapsed_directory_with_basis_extra() {
        let data_dir = tempfile::tempdir().unwrap();
        let config = test_config(data_dir.path());
        let catalog = Catalog::open(&data_dir.path().join("catalog.sqlite3")).unwrap();

        let source_dir = tempfile::tempdir().unwrap();
        let src = source_dir.path().join("photo.jpg");
        std::fs::write(&src, b"data").unwrap();

        let existing = ExistingMedia {
            id: "media-1".to_owned(),
            state: MediaState::Review,
            canonical_path: Some("/review/photo.jpg".to_owned()),
            basis: DupeBasis::Content,
        };

        let outcome = handle_duplicate(&config, &catalog, &src, "pc", "batch-1", false, existing).unwrap();

        match outcome {
            FileOutcome::Quarantined { reason } => assert_eq!(reason, "duplicate_in_review"),
            other => panic!("expected Quarantined, got {other:?}"),
        }
        let dest_dir = config.quarantine_root().join("duplicate");
        assert!(dest_dir.join("photo.jpg").exists());
        let sidecar = std::fs::read_to_string(dest_dir.join("photo.jpg.quarantine.json")).unwrap();
        assert!(sidecar.contains("\"basis\": \"content\""));
        assert!(sidecar.contains("\"dupe_of\": \"media-1\""));
    }

    #[test]
    fn library_duplicate_always_quarantines_regardless_of_policy() {
        let data_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(data_dir.path());
        config.on_review_dupe = ReviewDupePolicy::Ignore;
        let catalog = Catalog::open(&data_dir.path().join("catalog.sqlite3")).unwrap();

        let source_dir = tempfile::tempdir().unwrap();
        let src = source_dir.path().join("photo.jpg");
        std::fs::write(&src, b"data").unwrap();

        let existing = ExistingMedia {
            id: "media-2".to_owned(),
            state: MediaState::Library,
            canonical_path: Some("/library/photo.jpg".to_owned()),
            basis: DupeBasis::File,
        };

        let outcome = handle_duplicate(&config, &catalog, &src, "pc", "batch-1", false, existing).unwrap();
        match outcome {
            FileOutcome::Quarantined { reason } => assert_eq!(reason, "duplicate_in_library"),
            other => panic!("expected Quarantined, got {other:?}"),
        }
    }

    #[test]
    fn delete_policy_removes_file_and_still_records_a_sighting() {
        let data_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(data_dir.path());
        config.on_review_dupe = ReviewDupePolicy::Delete;
        let catalog = Catalog::open(&data_dir.path().join("catalog.sqlite3")).unwrap();

        let upsert = MediaUpsert {
            hash_sha256: "hash-1".to_owned(),
            content_hash: None,
            canonical_path: "/review/photo.jpg".to_owned(),
            taken_at: None,
            width: None,
            height: None,
            gps_lat: None,
            gps_lon: None,
            state: MediaState::Review,
            quarantine_reason: None,
        };
        let media_id = catalog.upsert_media(&upsert).unwrap();

        let source_dir = tempfile::tempdir().unwrap();
        let src = source_dir.path().join("photo.jpg");
        std::fs::write(&src, b"data").unwrap();

        let existing = ExistingMedia {
            id: media_id,
            state: MediaState::Review,
            canonical_path: Some("/review/photo.jpg".to_owned()),
            basis: DupeBasis::File,
        };

        let outcome = handle_duplicate(&config, &catalog, &src, "pc", "batch-1", false, existing).unwrap();
        assert!(matches!(outcome, FileOutcome::SkippedDup));
        assert!(!src.exists());
    }

    #[test]
    fn move_failure_quarantines_and_records_quarantine_reason() {
        let data_dir = tempfile::tempdir().unwrap();
        let config = test_config(data_dir.path());
        let catalog = Catalog::open(&data_dir.path().join("catalog.sqlite3")).unwrap();

        let source_dir = tempfile::tempdir().unwrap();
        let src = source_dir.path().join("photo.jpg");
        std::fs::write(&src, b"data").unwrap();

        let outcome =
            quarantine_move_failure(&config, &catalog, &src, "hash-move-fail", None, "batch-1", "pc").unwrap();
        match outcome {
            FileOutcome::Quarantined { reason } => assert_eq!(reason, "move_failed"),
            other => panic!("expected Quarantined, got {other:?}"),
        }

        let existing = catalog.find_existing("hash-move-fail", None).unwrap().unwrap();
        assert_eq!(existing.state, MediaState::Quarantined);

        let dest_dir = config.quarantine_root().join("move_failed");
        assert!(fs_entries(&dest_dir).next().is_some());
    }

    fn fs_entries(dir: &Path) -> impl Iterator<Item = std::fs::DirEntry> {
        std::fs::read_dir(dir).unwrap().filter_map(|e| e.ok())
    }
}
