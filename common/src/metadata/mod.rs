use std::collections::HashMap;
use std::io::{BufReader, Read as _};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{instrument, warn};
use wait_timeout::ChildExt;

/// Bound on how long a single `exiftool` invocation may run before it's
/// killed and treated as a metadata-read failure. Large RAW/video files on
/// slow network shares are the normal reason this ever triggers.
const EXIFTOOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Flat metadata extracted from a file, keyed by the tag names exiftool
/// reports (e.g. `DateTimeOriginal`, `GPSLatitude`). `-n` is passed without
/// `-G`/`-G1`, so these are unprefixed, not `EXIF:`/`Composite:`-qualified.
pub type Metadata = HashMap<String, Value>;

/// Check once, at startup, whether `exiftool` is reachable on PATH.
///
/// Unlike a missing-exiftool result from a single invocation (which falls
/// back to the decoder for that one file), a binary that's absent for the
/// whole run is a fatal setup error -- callers should exit rather than limp
/// through an entire batch on decoder fallbacks alone.
pub fn is_exiftool_available() -> bool {
    which::which("exiftool").is_ok()
}

/// Run `exiftool` against a file and return its flattened JSON tag map.
///
/// `-n` disables print conversion so numeric/date fields stay machine
/// readable, `-api largefilesupport=1` keeps very large video files from
/// being rejected, and the three `--MakerNotes`/`--PreviewImage`/
/// `--ThumbnailImage` excludes keep embedded binary blobs out of the JSON
/// response. Returns `Ok(None)` when exiftool isn't on PATH at all so callers
/// can fall back to the pure-Rust decoder path instead of failing the whole
/// ingest.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn exiftool_json(path: &Path) -> Result<Option<Metadata>> {
    let mut child = match Command::new("exiftool")
        .args([
            "-j",
            "-n",
            "-api",
            "largefilesupport=1",
            "--MakerNotes",
            "--PreviewImage",
            "--ThumbnailImage",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("exiftool not found on PATH, falling back to decoder metadata");
            return Ok(None);
        }
        Err(err) => return Err(err).context("spawning exiftool"),
    };

    let status = match child
        .wait_timeout(EXIFTOOL_TIMEOUT)
        .context("waiting on exiftool")?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            bail!("exiftool timed out after {:?}", EXIFTOOL_TIMEOUT);
        }
    };

    if !status.success() {
        bail!("exiftool exited with {status}");
    }

    let mut stdout = String::new();
    child
        .stdout
        .take()
        .context("exiftool produced no stdout handle")?
        .read_to_string(&mut stdout)
        .context("reading exiftool stdout")?;

    let mut rows: Vec<Value> = serde_json::from_str(&stdout).context("parsing exiftool JSON")?;
    let Some(Value::Object(obj)) = rows.pop() else {
        bail!("exiftool returned no metadata object");
    };

    Ok(Some(obj.into_iter().collect()))
}

/// Read `DateTimeOriginal` directly out of a file's EXIF block, independent
/// of exiftool. Used only by the decoder fallback path; it's a narrower read
/// than exiftool's (no GPS, no maker notes) but still a real camera-supplied
/// timestamp, not a guess, so it's safe to feed to the same resolver
/// exiftool's output goes through.
fn exif_date_time_original(path: &Path) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader).ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    Some(field.display_value().to_string())
}

/// Minimal metadata recovered by decoding the image ourselves, used only
/// when exiftool is unavailable. Dimensions and format always come from
/// the decoder; a capture date is only included when the file's own EXIF
/// block actually carries one -- no guessing from file mtime, which would
/// poison the catalog with a meaningless date.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn decoder_fallback_metadata(path: &Path) -> Result<Metadata> {
    let reader = image::ImageReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .with_guessed_format()
        .context("guessing image format")?;

    let format = reader
        .format()
        .map(|f| format!("{f:?}"))
        .unwrap_or_else(|| "Unknown".to_owned());
    let (width, height) = reader.into_dimensions().context("reading image dimensions")?;

    let mut meta = Metadata::new();
    meta.insert("FileType".to_owned(), Value::String(format));
    meta.insert("ImageWidth".to_owned(), Value::from(width));
    meta.insert("ImageHeight".to_owned(), Value::from(height));
    if let Some(date) = exif_date_time_original(path) {
        meta.insert("DateTimeOriginal".to_owned(), Value::String(date));
    }
    Ok(meta)
}

/// Read metadata for a file.
///
/// The decoder fallback is reserved for the one case where there's genuinely
/// no exiftool output to speak of: the binary isn't installed. A timeout or
/// nonzero exit from an *installed* exiftool is treated as empty metadata,
/// not silently upgraded to decoder output -- the decoder path must never
/// become the sole source of a capture date by accident.
pub fn read_metadata(path: &Path) -> Result<Metadata> {
    match exiftool_json(path) {
        Ok(Some(meta)) => Ok(meta),
        Ok(None) => decoder_fallback_metadata(path),
        Err(err) => {
            warn!(%err, "exiftool failed, proceeding with empty metadata");
            Ok(Metadata::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_fallback_reports_dimensions_and_never_a_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swatch.png");
        image::RgbImage::new(4, 3)
            .save(&path)
            .unwrap();

        let meta = decoder_fallback_metadata(&path).unwrap();
        assert_eq!(meta.get("ImageWidth").unwrap(), &Value::from(4));
        assert_eq!(meta.get("ImageHeight").unwrap(), &Value::from(3));
        assert!(!meta.contains_key("DateTimeOriginal"));
    }

    #[test]
    fn exiftool_failure_yields_empty_metadata_not_decoder_fallback() {
        // A file exiftool can't even open (wrong format for a real exiftool,
        // but present on PATH) must never silently upgrade to decoder
        // output; decoder fallback is reserved for "tool not installed".
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        if exiftool_json(&path).is_err() {
            let meta = read_metadata(&path).unwrap();
            assert!(meta.is_empty());
        }
    }
}
