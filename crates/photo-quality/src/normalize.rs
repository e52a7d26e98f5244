//! Working-buffer preparation
//!
//! Loads a photo at a bounded resolution, applies the stored EXIF rotation and
//! keeps track of two resolutions: the working buffer every per-pixel pass runs
//! on, and the canonical (orientation-corrected original) resolution that face
//! boxes are reported in.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

/// Default bound for the working buffer's longer side
pub const DEFAULT_TARGET_MAX_SIDE: u32 = 1024;

/// Resolution of the downsampled, rotated working buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSize {
    pub width: u32,
    pub height: u32,
}

/// Orientation-corrected resolution of the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSize {
    pub width: u32,
    pub height: u32,
}

/// Clockwise rotation needed to display a photo upright.
///
/// Only the pure rotations are honoured; mirrored EXIF orientations are
/// treated as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    pub fn from_exif(value: u16) -> Self {
        match value {
            3 => Orientation::Rotate180,
            6 => Orientation::Rotate90,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    /// Read the EXIF orientation tag, defaulting to `Normal` when absent or unreadable
    pub fn read(path: &Path) -> Self {
        let exif = match rexif::parse_file(path) {
            Ok(exif) => exif,
            Err(_) => return Orientation::Normal,
        };

        exif.entries
            .iter()
            .find_map(|entry| match (&entry.tag, &entry.value) {
                (rexif::ExifTag::Orientation, rexif::TagValue::U16(values)) => {
                    values.first().copied()
                }
                _ => None,
            })
            .map(Orientation::from_exif)
            .unwrap_or(Orientation::Normal)
    }

    pub fn swaps_axes(&self) -> bool {
        matches!(self, Orientation::Rotate90 | Orientation::Rotate270)
    }

    fn apply(&self, img: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Normal => img,
            Orientation::Rotate90 => img.rotate90(),
            Orientation::Rotate180 => img.rotate180(),
            Orientation::Rotate270 => img.rotate270(),
        }
    }
}

/// An RGB working buffer plus the canonical resolution it stands in for.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub pixels: RgbImage,
    pub canonical: CanonicalSize,
}

impl NormalizedImage {
    pub fn working_size(&self) -> WorkingSize {
        WorkingSize {
            width: self.pixels.width(),
            height: self.pixels.height(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    target_max_side: u32,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_MAX_SIDE)
    }
}

impl ImageNormalizer {
    pub fn new(target_max_side: u32) -> Self {
        Self {
            target_max_side: target_max_side.max(1),
        }
    }

    /// Load a photo from disk into a bounded, upright working buffer
    pub fn load(&self, path: &Path) -> Result<NormalizedImage, NormalizeError> {
        // Header only: rejects broken files before paying for a full decode
        let (width, height) =
            image::image_dimensions(path).map_err(|source| NormalizeError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        if width == 0 || height == 0 {
            return Err(NormalizeError::ZeroDimensions(path.to_path_buf()));
        }

        let decoded = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| NormalizeError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .decode()
            .map_err(|source| NormalizeError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(self.normalize(decoded, Orientation::read(path)))
    }

    /// Downsample and rotate an already decoded image
    pub fn normalize(&self, decoded: DynamicImage, orientation: Orientation) -> NormalizedImage {
        let (width, height) = (decoded.width(), decoded.height());
        let factor = sample_factor(width, height, self.target_max_side);

        let sampled = if factor > 1 {
            decoded.resize_exact(
                (width / factor).max(1),
                (height / factor).max(1),
                FilterType::Triangle,
            )
        } else {
            decoded
        };

        let canonical = if orientation.swaps_axes() {
            CanonicalSize {
                width: height,
                height: width,
            }
        } else {
            CanonicalSize { width, height }
        };

        NormalizedImage {
            pixels: orientation.apply(sampled).to_rgb8(),
            canonical,
        }
    }
}

/// Smallest power-of-two divisor that brings both sides within `target`
pub fn sample_factor(width: u32, height: u32, target: u32) -> u32 {
    let mut factor = 1u32;
    while width / factor > target || height / factor > target {
        factor *= 2;
    }
    factor
}

/// Save `pixels` as a JPEG carrying a single IFD0 Orientation entry
#[cfg(test)]
pub(crate) fn write_jpeg_with_orientation(path: &Path, pixels: RgbImage, orientation: u16) {
    use std::io::Cursor;

    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(pixels)
        .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
        .unwrap();

    // Little-endian TIFF: header, one IFD entry (0x0112 SHORT x1), no next IFD
    let mut payload = b"Exif\0\0II*\0".to_vec();
    payload.extend_from_slice(&8u32.to_le_bytes());
    payload.extend_from_slice(&1u16.to_le_bytes());
    payload.extend_from_slice(&0x0112u16.to_le_bytes());
    payload.extend_from_slice(&3u16.to_le_bytes());
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(&orientation.to_le_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&0u32.to_le_bytes());

    let mut segment = vec![0xFF, 0xE1];
    segment.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    segment.extend_from_slice(&payload);

    // APP1 goes straight after SOI
    jpeg.splice(2..2, segment);
    std::fs::write(path, jpeg).unwrap();
}
