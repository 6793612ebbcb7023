use std::path::{Path, PathBuf};

use tracing::{instrument, warn};
use walkdir::WalkDir;

use crate::classifier::is_ignored_dir;

/// A single file discovered under a source root, still unclassified.
#[derive(Clone, Debug)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Depth-first walk of `root`, skipping ignored directories and any entry
/// that resolves (via symlink) outside of `root`.
///
/// Per-entry I/O errors (permission denied, broken symlink, race with a
/// concurrent delete) are logged and skipped rather than aborting the whole
/// walk, matching the original's `os.walk` loop which never let one bad
/// entry kill a source scan.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn walk_source(root: &Path) -> Vec<WalkEntry> {
    let canonical_root = match std::fs::canonicalize(root) {
        Ok(p) => p,
        Err(err) => {
            warn!(%err, "source root does not resolve, skipping");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    let walker = WalkDir::new(root).follow_links(true).into_iter();

    for entry in walker.filter_entry(|e| {
        if e.file_type().is_dir() {
            e.file_name()
                .to_str()
                .map(|name| !is_ignored_dir(name))
                .unwrap_or(true)
        } else {
            true
        }
    }) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(%err, "error while walking source, skipping entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();

        match std::fs::canonicalize(path) {
            Ok(resolved) if !resolved.starts_with(&canonical_root) => {
                warn!(path = %path.display(), "symlink escapes source root, skipping");
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(path = %path.display(), %err, "stat error, skipping entry");
                continue;
            }
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!(path = %path.display(), %err, "stat error, skipping entry");
                continue;
            }
        };

        out.push(WalkEntry {
            path: path.to_path_buf(),
            size,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_nested_files_and_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"hello").unwrap();
        fs::write(dir.path().join("sub/b.jpg"), b"world").unwrap();
        fs::write(dir.path().join(".git/ignored.jpg"), b"nope").unwrap();

        let entries = walk_source(dir.path());
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();

        assert_eq!(entries.len(), 2);
        assert!(names.contains(&"a.jpg".to_owned()));
        assert!(names.contains(&"b.jpg".to_owned()));
    }

    #[test]
    fn missing_root_returns_empty() {
        let entries = walk_source(Path::new("/nonexistent/pixarr/source"));
        assert!(entries.is_empty());
    }
}
