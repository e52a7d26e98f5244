//! Sub-score computation for photos that survived the cutoff tree
//!
//! All five sub-scores and the weighted total live on a 0–100 scale.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::cutoff::FaceDiagnostics;
use crate::faces::WorkingBox;
use crate::sharpness::sharpness_score;

/// Background is not derived from image content
pub const BACKGROUND_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub sharpness: f64,
    pub expression: f64,
    pub lighting: f64,
    pub composition: f64,
    pub background: f64,
}

impl SubScores {
    /// Weighted total, clamped to 0–100
    pub fn total(&self) -> f64 {
        let weights = [
            (self.sharpness, 0.30),
            (self.expression, 0.25),
            (self.lighting, 0.20),
            (self.composition, 0.15),
            (self.background, 0.10),
        ];

        weights
            .iter()
            .map(|(score, weight)| score * weight)
            .sum::<f64>()
            .clamp(0.0, 100.0)
    }
}

/// Scores an eligible photo from its working buffer and principal face.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        pixels: &RgbImage,
        raw_sharpness: f64,
        principal: &WorkingBox,
        diagnostics: &FaceDiagnostics,
    ) -> SubScores {
        SubScores {
            sharpness: sharpness_score(raw_sharpness),
            expression: expression_score(diagnostics.smile_prob, diagnostics.eye_open_prob),
            lighting: lighting_score(pixels, principal),
            composition: composition_score(pixels.width(), pixels.height(), principal),
            background: BACKGROUND_SCORE,
        }
    }
}

pub fn expression_score(smile_prob: f64, eye_open_prob: f64) -> f64 {
    ((smile_prob * 0.6 + eye_open_prob * 0.4) * 100.0).clamp(0.0, 100.0)
}

/// Closeness of the face crop's mean luma to mid-gray (unrounded luma)
pub fn lighting_score(pixels: &RgbImage, face: &WorkingBox) -> f64 {
    let (width, height) = (pixels.width() as i64, pixels.height() as i64);
    let left = (face.left as i64).clamp(0, width);
    let right = (face.right as i64).clamp(0, width);
    let top = (face.top as i64).clamp(0, height);
    let bottom = (face.bottom as i64).clamp(0, height);

    if right <= left || bottom <= top {
        return 0.0;
    }

    let mut total = 0.0f64;
    for y in top as u32..bottom as u32 {
        for x in left as u32..right as u32 {
            let [r, g, b] = pixels.get_pixel(x, y).0;
            total += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        }
    }
    let count = ((right - left) * (bottom - top)) as f64;
    let mean = total / count;

    ((1.0 - (mean - 128.0).abs() / 128.0) * 100.0).clamp(0.0, 100.0)
}

/// Rule-of-thirds placement of the face center within the whole buffer
pub fn composition_score(width: u32, height: u32, face: &WorkingBox) -> f64 {
    let (w, h) = (width as f64, height as f64);
    let (cx, cy) = face.center();

    let thirds = [
        (w / 3.0, h / 3.0),
        (w * 2.0 / 3.0, h / 3.0),
        (w / 3.0, h * 2.0 / 3.0),
        (w * 2.0 / 3.0, h * 2.0 / 3.0),
    ];
    let min_distance = thirds
        .iter()
        .map(|(px, py)| ((cx - px).powi(2) + (cy - py).powi(2)).sqrt())
        .fold(f64::INFINITY, f64::min);

    let half_diagonal = (w * w + h * h).sqrt() * 0.5;
    if half_diagonal == 0.0 {
        return 0.0;
    }

    ((1.0 - min_distance / half_diagonal) * 100.0).clamp(0.0, 100.0)
}
