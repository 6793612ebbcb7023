use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

/// Build the canonical Review filename for a file: a sortable timestamp
/// followed by the first 8 hex characters of its content hash, which is
/// enough to disambiguate same-second bursts without making names
/// unreadably long.
pub fn canonical_name(taken_at: Option<NaiveDateTime>, hash: &str, ext: &str) -> String {
    let stamp = taken_at
        .unwrap_or_else(|| Utc::now().naive_utc())
        .format("%Y-%m-%d_%H-%M-%S");
    let short_hash = &hash[..hash.len().min(8)];
    format!("{stamp}_{short_hash}{ext}")
}

/// Find a destination path under `dir` that doesn't already exist, adding
/// `_2`, `_3`, ... before the extension as needed. `base_name` already
/// includes its extension.
#[instrument(skip_all, fields(dir = %dir.display(), base_name))]
pub fn plan_nonclobber(dir: &Path, base_name: &str) -> PathBuf {
    let candidate = dir.join(base_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(base_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(base_name);
    let ext = path.extension().and_then(|e| e.to_str());

    for n in 2.. {
        let name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = dir.join(&name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("directory listing is unbounded in practice")
}

/// Move a file into place, falling back to copy-then-remove when a plain
/// rename fails (typically because source and destination live on
/// different filesystems or mount points).
#[instrument(skip_all, fields(from = %from.display(), to = %to.display()))]
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    warn!("rename failed, falling back to copy + remove");
    std::fs::copy(from, to).with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
    std::fs::remove_file(from).with_context(|| format!("removing {} after copy", from.display()))?;
    Ok(())
}

/// Sidecar JSON written alongside every quarantined file, recording why it
/// was pulled aside and where it came from.
#[derive(Debug, Serialize)]
pub struct QuarantineSidecar<'a> {
    pub reason: &'a str,
    pub ingest_id: &'a str,
    pub original_path: String,
    pub quarantined_to: Option<String>,
    pub timestamp: String,
    pub extra: Option<serde_json::Value>,
}

/// Map a quarantine reason to the subdirectory it lands in. Every reason
/// gets its own directory except the two duplicate reasons, which collapse
/// into a single `duplicate/` directory -- the sidecar still records which
/// of the two actually applied.
fn quarantine_dir_name(reason: &str) -> &str {
    match reason {
        "duplicate_in_library" | "duplicate_in_review" => "duplicate",
        other => other,
    }
}

/// Move `from` into the quarantine directory, writing a `.quarantine.json`
/// sidecar describing why. In dry-run mode, neither the move nor the
/// sidecar write happens; the caller is expected to still record the
/// decision in the catalog so reports reflect what *would* happen.
#[instrument(skip_all, fields(from = %from.display(), reason))]
pub fn quarantine_file(
    quarantine_root: &Path,
    from: &Path,
    reason: &str,
    ingest_id: &str,
    extra: Option<serde_json::Value>,
    dry_run: bool,
) -> Result<Option<PathBuf>> {
    let file_name = from.file_name().context("quarantined path has no file name")?;
    let dest_dir = quarantine_root.join(quarantine_dir_name(reason));

    if dry_run {
        return Ok(None);
    }

    std::fs::create_dir_all(&dest_dir).with_context(|| format!("creating {}", dest_dir.display()))?;
    let dest = plan_nonclobber(&dest_dir, &file_name.to_string_lossy());

    move_file(from, &dest)?;

    let sidecar = QuarantineSidecar {
        reason,
        ingest_id,
        original_path: from.display().to_string(),
        quarantined_to: Some(dest.display().to_string()),
        timestamp: Utc::now().naive_utc().to_string(),
        extra,
    };

    let sidecar_path = dest.with_extension(format!(
        "{}.quarantine.json",
        dest.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    let body = serde_json::to_string_pretty(&sidecar).context("serializing quarantine sidecar")?;
    std::fs::write(&sidecar_path, body).with_context(|| format!("writing {}", sidecar_path.display()))?;

    Ok(Some(dest))
}
