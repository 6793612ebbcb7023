use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::metadata::Metadata;

/// Metadata tags checked for a capture date, in priority order. The first
/// tag present with a parseable, non-sentinel value wins. These are the
/// literal, unprefixed tag names exiftool reports with `-j -n` (no `-G`/`-G1`
/// group prefixing).
const DATE_KEYS: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "MediaCreateDate",
    "TrackCreateDate",
    "QuickTime:CreateDate",
    "QuickTime:CreationDate",
];

/// Appended to the tail of `DATE_KEYS` only when `allow_file_dates` is set --
/// a filesystem mtime is trivially wrong after any copy or re-export, so it's
/// never tried ahead of a real camera/container-supplied tag.
const FILE_DATE_KEYS: &[&str] = &["ModifyDate", "FileModifyDate"];

/// exiftool renders dates as `YYYY:MM:DD HH:MM:SS`, with an optional
/// fractional-second suffix and an optional trailing `+HH:MM`/`Z` offset
/// that this resolver ignores rather than converts (the catalog stores
/// naive local timestamps, matching the original).
static EXIFTOOL_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}):(\d{2}):(\d{2})[ T](\d{2}):(\d{2}):(\d{2})").unwrap()
});

/// A handful of zero/placeholder timestamps cameras are known to emit when
/// they have no real clock reading (e.g. a freshly reset camera body).
const SENTINEL_DATES: &[&str] = &["0000:00:00 00:00:00", "1970:01:01 00:00:00", "1904:01:01 00:00:00"];

struct FilenamePattern {
    re: &'static LazyLock<Regex>,
}

static IMG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIMG_(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})(\d{2})").unwrap());
static PXL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPXL_(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})(\d{2})\d*").unwrap());
static WHATSAPP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)WhatsApp Image (\d{4})-(\d{2})-(\d{2}) at (\d{2})\.(\d{2})\.(\d{2})").unwrap()
});
static PHOTO_DASH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPHOTO-(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})").unwrap()
});

fn filename_patterns() -> [FilenamePattern; 4] {
    [
        FilenamePattern { re: &IMG_PATTERN },
        FilenamePattern { re: &PXL_PATTERN },
        FilenamePattern { re: &WHATSAPP_PATTERN },
        FilenamePattern { re: &PHOTO_DASH_PATTERN },
    ]
}

fn parse_exiftool_date(raw: &str) -> Option<NaiveDateTime> {
    if SENTINEL_DATES.iter().any(|s| raw.starts_with(s)) {
        return None;
    }
    let caps = EXIFTOOL_DATE_RE.captures(raw)?;
    let ymd_hms: Vec<i32> = (1..=6).map(|i| caps[i].parse().unwrap_or(0)).collect();
    NaiveDateTime::parse_from_str(
        &format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            ymd_hms[0], ymd_hms[1], ymd_hms[2], ymd_hms[3], ymd_hms[4], ymd_hms[5]
        ),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()
}

/// Look for a capture date embedded in well-known device filename patterns
/// (`IMG_20230615_142233.jpg`, `PXL_20230615_142233042.jpg`, WhatsApp's
/// `WhatsApp Image 2023-06-15 at 14.22.33.jpg`, `PHOTO-2023-06-15-14-22-33`).
fn taken_from_filename(filename: &str) -> Option<NaiveDateTime> {
    for pattern in filename_patterns() {
        if let Some(caps) = pattern.re.captures(filename) {
            let parts: Vec<i32> = (1..=6).map(|i| caps[i].parse().unwrap_or(0)).collect();
            if let Ok(dt) = NaiveDateTime::parse_from_str(
                &format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]
                ),
                "%Y-%m-%d %H:%M:%S",
            ) {
                return Some(dt);
            }
        }
    }
    None
}

/// Resolve the best-known capture time for a file.
///
/// Metadata tags are checked first, in `DATE_KEYS` order; `File:FileModifyDate`
/// is only appended to that scan when `allow_file_dates` is set, and always
/// after every real capture-date tag. Only when nothing in metadata yields a
/// usable date, and `allow_filename_dates` is set, do we fall back to parsing
/// the filename itself. Filename dates are inherently riskier (a re-exported
/// or renamed file can easily carry a stale or wrong timestamp in its name)
/// which is why the engine ships with the fallback disabled by default.
pub fn resolve_taken_at(
    meta: &Metadata,
    filename: &str,
    allow_file_dates: bool,
    allow_filename_dates: bool,
) -> Option<NaiveDateTime> {
    for key in DATE_KEYS {
        if let Some(Value::String(raw)) = meta.get(*key) {
            if let Some(dt) = parse_exiftool_date(raw) {
                return Some(dt);
            }
        }
    }

    if allow_file_dates {
        for key in FILE_DATE_KEYS {
            if let Some(Value::String(raw)) = meta.get(*key) {
                if let Some(dt) = parse_exiftool_date(raw) {
                    return Some(dt);
                }
            }
        }
    }

    if allow_filename_dates {
        return taken_from_filename(filename);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta_with(key: &str, value: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(key.to_owned(), json!(value));
        m
    }

    #[test]
    fn exif_date_wins_over_filename() {
        let meta = meta_with("DateTimeOriginal", "2023:06:15 14:22:33");
        let resolved = resolve_taken_at(&meta, "IMG_20990101_000000.jpg", false, true).unwrap();
        assert_eq!(resolved.to_string(), "2023-06-15 14:22:33");
    }

    #[test]
    fn filename_fallback_disabled_by_default() {
        let meta = Metadata::new();
        assert!(resolve_taken_at(&meta, "IMG_20230615_142233.jpg", false, false).is_none());
    }

    #[test]
    fn filename_fallback_when_enabled() {
        let meta = Metadata::new();
        let resolved = resolve_taken_at(&meta, "IMG_20230615_142233.jpg", false, true).unwrap();
        assert_eq!(resolved.to_string(), "2023-06-15 14:22:33");
    }

    #[test]
    fn pxl_pattern_with_milliseconds_suffix() {
        let meta = Metadata::new();
        let resolved = resolve_taken_at(&meta, "PXL_20230615_142233042.jpg", false, true).unwrap();
        assert_eq!(resolved.to_string(), "2023-06-15 14:22:33");
    }

    #[test]
    fn whatsapp_pattern() {
        let meta = Metadata::new();
        let resolved = resolve_taken_at(&meta, "WhatsApp Image 2023-06-15 at 14.22.33.jpeg", false, true).unwrap();
        assert_eq!(resolved.to_string(), "2023-06-15 14:22:33");
    }

    #[test]
    fn file_modify_date_only_used_when_allowed() {
        let meta = meta_with("FileModifyDate", "2023:06:15 14:22:33");
        assert!(resolve_taken_at(&meta, "photo.jpg", false, false).is_none());
        let resolved = resolve_taken_at(&meta, "photo.jpg", true, false).unwrap();
        assert_eq!(resolved.to_string(), "2023-06-15 14:22:33");
    }

    #[test]
    fn file_modify_date_never_outranks_a_real_capture_tag() {
        let mut meta = meta_with("DateTimeOriginal", "2023:06:15 14:22:33");
        meta.insert("FileModifyDate".to_owned(), json!("2099:01:01 00:00:00"));
        let resolved = resolve_taken_at(&meta, "photo.jpg", true, false).unwrap();
        assert_eq!(resolved.to_string(), "2023-06-15 14:22:33");
    }

    #[test]
    fn sentinel_dates_are_rejected() {
        let meta = meta_with("DateTimeOriginal", "0000:00:00 00:00:00");
        assert!(resolve_taken_at(&meta, "photo.jpg", false, false).is_none());
    }
}
