//! Core value types shared across the Pickly pipeline

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cutoff::CutoffReason;

/// A single photo from the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    /// Stable identifier assigned by the photo source
    pub id: i64,
    pub file_path: PathBuf,
    /// Capture time (epoch millis)
    pub taken_at: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Analysis result; `None` until the photo has been scored
    pub recommendation_score: Option<RecommendationScore>,
}

impl Photo {
    /// Create an unscored photo with the minimal required fields
    pub fn new(id: i64, file_path: impl Into<PathBuf>, taken_at: i64) -> Self {
        Self {
            id,
            file_path: file_path.into(),
            taken_at,
            width: None,
            height: None,
            recommendation_score: None,
        }
    }

    /// Copy of this photo with `score` attached
    pub fn with_score(self, score: RecommendationScore) -> Self {
        Self {
            recommendation_score: Some(score),
            ..self
        }
    }

    /// True once scored and not cut off
    pub fn is_recommendable(&self) -> bool {
        self.recommendation_score
            .as_ref()
            .is_some_and(|score| !score.is_cutoff())
    }

    pub fn total_score(&self) -> f64 {
        self.recommendation_score
            .as_ref()
            .map(|score| score.total_score)
            .unwrap_or(0.0)
    }
}

/// Face rectangle in canonical (orientation-corrected, original resolution) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Outcome of analyzing one photo.
///
/// All scores are in `0.0..=100.0`. A cut-off photo carries its reason and
/// keeps every sub-score at zero; the diagnostics gathered before the exit
/// are still filled in so a UI can explain the exclusion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationScore {
    pub total_score: f64,

    pub sharpness_score: f64,
    pub expression_score: f64,
    pub lighting_score: f64,
    pub composition_score: f64,
    pub background_score: f64,

    pub face_count: u32,
    /// Present iff the photo was excluded from ranking
    pub cutoff_reason: Option<CutoffReason>,

    /// Laplacian variance of the working buffer
    pub raw_sharpness: f64,
    pub eye_open_prob: f64,
    pub left_eye_open_prob: f64,
    pub right_eye_open_prob: f64,
    pub smile_prob: f64,
    /// Absolute head pitch in degrees
    pub head_pitch: f64,
    /// Absolute head yaw in degrees
    pub head_yaw: f64,

    pub face_bounding_box: Option<FaceBoundingBox>,
    pub all_face_bounding_boxes: Vec<FaceBoundingBox>,

    /// Canonical resolution the face boxes refer to
    pub analyzed_width: u32,
    pub analyzed_height: u32,
}

impl RecommendationScore {
    /// A bare cutoff result with no diagnostics
    pub fn cutoff(reason: CutoffReason) -> Self {
        Self {
            cutoff_reason: Some(reason),
            ..Self::default()
        }
    }

    /// Turn a partially filled result into a cutoff, zeroing every score
    pub fn into_cutoff(self, reason: CutoffReason) -> Self {
        Self {
            total_score: 0.0,
            sharpness_score: 0.0,
            expression_score: 0.0,
            lighting_score: 0.0,
            composition_score: 0.0,
            background_score: 0.0,
            cutoff_reason: Some(reason),
            ..self
        }
    }

    pub fn is_cutoff(&self) -> bool {
        self.cutoff_reason.is_some()
    }
}
