//! Folder photo source
//!
//! Turns a directory of image files into [`Photo`] records: a stable id from
//! the canonical path, the capture time from EXIF (file mtime as fallback) and
//! the pixel dimensions from the image header.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use photo_quality::Photo;
use rayon::prelude::*;
use tracing::{debug, warn};
use weekly_picks::CaptureZone;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Photos found in a folder, plus the number of files that could not be read.
#[derive(Debug, Default)]
pub struct FolderScan {
    pub photos: Vec<Photo>,
    pub skipped: usize,
}

/// Scan `root` for supported images. EXIF wall-clock times are read in `zone`.
pub fn scan_folder(root: &Path, recursive: bool, zone: CaptureZone) -> Result<FolderScan> {
    if !root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", root.display());
    }

    let mut paths = Vec::new();
    collect_paths(root, recursive, &mut paths)?;
    paths.sort();

    let results: Vec<Result<Photo>> = paths
        .par_iter()
        .map(|path| photo_from_file(path, zone))
        .collect();

    let mut scan = FolderScan::default();
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(photo) => scan.photos.push(photo),
            Err(e) => {
                warn!(path = %path.display(), "skipping photo: {:#}", e);
                scan.skipped += 1;
            }
        }
    }
    Ok(scan)
}

fn collect_paths(dir: &Path, recursive: bool, paths: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_paths(&path, recursive, paths)?;
            }
        } else if is_supported(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn photo_from_file(path: &Path, zone: CaptureZone) -> Result<Photo> {
    let canonical = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve path: {}", path.display()))?;

    let taken_at = match exif_taken_at(&canonical, zone) {
        Some(taken_at) => taken_at,
        None => {
            debug!(path = %canonical.display(), "no EXIF capture time, using mtime");
            modified_at(&canonical)?
        }
    };

    let (width, height) = match image::image_dimensions(&canonical) {
        Ok((w, h)) => (Some(w), Some(h)),
        Err(_) => (None, None),
    };

    Ok(Photo {
        width,
        height,
        ..Photo::new(photo_id(&canonical), canonical, taken_at)
    })
}

/// FNV-1a hash of the path, stable across runs
pub fn photo_id(path: &Path) -> i64 {
    let mut hash: u64 = 0xcbf29ce484222325; // FNV offset basis
    for byte in path.to_string_lossy().bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3); // FNV prime
    }
    hash as i64
}

fn exif_taken_at(path: &Path, zone: CaptureZone) -> Option<i64> {
    let exif = rexif::parse_file(path).ok()?;
    let raw = exif.entries.iter().find_map(|entry| match (&entry.tag, &entry.value) {
        (rexif::ExifTag::DateTimeOriginal, rexif::TagValue::Ascii(value)) => Some(value.clone()),
        _ => None,
    })?;
    parse_exif_datetime(&raw, zone)
}

/// `YYYY:MM:DD HH:MM:SS` wall-clock time in `zone`, as epoch millis
pub fn parse_exif_datetime(raw: &str, zone: CaptureZone) -> Option<i64> {
    let trimmed = raw.trim_end_matches('\0').trim();
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S").ok()?;
    zone.wall_clock_millis(&naive)
}

fn modified_at(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("Failed to get file metadata: {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified).timestamp_millis())
}
