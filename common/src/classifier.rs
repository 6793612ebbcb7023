use std::ffi::OsStr;
use std::path::Path;

use crate::config::Formats;

/// Filenames treated as junk regardless of extension.
const JUNK_FILES: &[&str] = &[".ds_store", "thumbs.db", "desktop.ini", ".nomedia"];

/// Filename prefixes treated as junk (editor/sync-tool scratch files).
const JUNK_PREFIXES: &[&str] = &["._", ".~", "~$"];

/// Directory names skipped entirely while walking a source.
pub const DIR_IGNORE: &[&str] = &[".git", "@eadir", ".thumbnails", "$recycle.bin", "system volume information"];

/// Outcome of classifying a single candidate file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Classification {
    /// Known junk by name (sync sidecar files, OS cruft); never ingested.
    Junk,
    /// Has an extension but it's not one of the configured media types.
    UnsupportedExt,
    /// A zero-byte file; never worth hashing or ingesting.
    ZeroBytes,
    /// Passed every filter; a real ingest candidate.
    Candidate,
}

/// Classify a file purely from its name and size, without touching content.
///
/// Mirrors the original ingest pass's ordering: junk-by-name first, then
/// extension support, then the zero-byte check.
pub fn classify(path: &Path, size: u64, formats: &Formats) -> Classification {
    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_lowercase();

    if JUNK_FILES.contains(&name.as_str()) || JUNK_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Classification::Junk;
    }

    let ext = path
        .extension()
        .and_then(OsStr::to_str)
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    if ext.is_empty() || !formats.is_supported(&ext) {
        return Classification::UnsupportedExt;
    }

    if size == 0 {
        return Classification::ZeroBytes;
    }

    Classification::Candidate
}

/// Whether a directory name should be skipped entirely while walking.
pub fn is_ignored_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    DIR_IGNORE.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use std::path::PathBuf;

    fn formats() -> Formats {
        config::load(None, PathBuf::from("/tmp")).formats
    }

    #[test]
    fn junk_by_name() {
        let f = formats();
        assert_eq!(
            classify(Path::new("/src/.DS_Store"), 100, &f),
            Classification::Junk
        );
        assert_eq!(
            classify(Path::new("/src/._IMG_0001.JPG"), 100, &f),
            Classification::Junk
        );
    }

    #[test]
    fn unsupported_extension() {
        let f = formats();
        assert_eq!(
            classify(Path::new("/src/notes.txt"), 100, &f),
            Classification::UnsupportedExt
        );
    }

    #[test]
    fn zero_byte_supported_file() {
        let f = formats();
        assert_eq!(
            classify(Path::new("/src/IMG_0001.JPG"), 0, &f),
            Classification::ZeroBytes
        );
    }

    #[test]
    fn valid_candidate() {
        let f = formats();
        assert_eq!(
            classify(Path::new("/src/IMG_0001.JPG"), 4096, &f),
            Classification::Candidate
        );
        assert_eq!(
            classify(Path::new("/src/clip.MP4"), 4096, &f),
            Classification::Candidate
        );
    }

    #[test]
    fn ignored_dirs_are_case_insensitive() {
        assert!(is_ignored_dir(".git"));
        assert!(is_ignored_dir("@eaDir"));
        assert!(!is_ignored_dir("Vacation 2023"));
    }
}
