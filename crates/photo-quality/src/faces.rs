//! Face detection capability and eligibility filtering
//!
//! The detector itself is an external collaborator behind [`FaceDetector`].
//! Everything it reports is in working-buffer coordinates; this module only
//! decides which of those faces count and which one is the principal face.

use anyhow::Result;
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::model::FaceBoundingBox;
use crate::normalize::{CanonicalSize, WorkingSize};

/// Default minimum face width, as a fraction of the working buffer width
pub const DEFAULT_MIN_FACE_WIDTH_RATIO: f64 = 0.05;

/// Face rectangle in working-buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl WorkingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left as f64 + self.right as f64) / 2.0,
            (self.top as f64 + self.bottom as f64) / 2.0,
        )
    }

    /// True when the box touches or crosses any edge of the working buffer
    pub fn touches_edge(&self, size: WorkingSize) -> bool {
        self.left <= 0
            || self.top <= 0
            || self.right >= size.width as i32
            || self.bottom >= size.height as i32
    }

    /// Rescale into canonical coordinates with independent X/Y factors
    pub fn to_canonical(&self, working: WorkingSize, canonical: CanonicalSize) -> FaceBoundingBox {
        let scale_x = canonical.width as f64 / working.width.max(1) as f64;
        let scale_y = canonical.height as f64 / working.height.max(1) as f64;
        FaceBoundingBox {
            left: (self.left as f64 * scale_x) as i32,
            top: (self.top as f64 * scale_y) as i32,
            right: (self.right as f64 * scale_x) as i32,
            bottom: (self.bottom as f64 * scale_y) as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftCheek,
    RightCheek,
    NoseBase,
    MouthLeft,
    MouthRight,
    MouthBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub kind: LandmarkKind,
    pub x: f32,
    pub y: f32,
}

/// One face as reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bounding_box: WorkingBox,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub left_eye_open_probability: Option<f32>,
    #[serde(default)]
    pub right_eye_open_probability: Option<f32>,
    #[serde(default)]
    pub smiling_probability: Option<f32>,
    /// Pitch in degrees (nodding up/down)
    #[serde(default)]
    pub head_euler_angle_x: f32,
    /// Yaw in degrees (turning left/right)
    #[serde(default)]
    pub head_euler_angle_y: f32,
}

impl DetectedFace {
    pub fn new(bounding_box: WorkingBox) -> Self {
        Self {
            bounding_box,
            landmarks: Vec::new(),
            left_eye_open_probability: None,
            right_eye_open_probability: None,
            smiling_probability: None,
            head_euler_angle_x: 0.0,
            head_euler_angle_y: 0.0,
        }
    }

    pub fn has_landmark(&self, kind: LandmarkKind) -> bool {
        self.landmarks.iter().any(|landmark| landmark.kind == kind)
    }
}

/// Pluggable face detection backend.
///
/// Implementations receive the upright working buffer and must report boxes in
/// that buffer's coordinate space. Errors are caught by the analyzer and turned
/// into a cutoff for that photo only.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>>;
}

/// Faces that passed the size filter, and the largest of them.
#[derive(Debug, Clone)]
pub struct EligibleFaces<'a> {
    pub eligible: Vec<&'a DetectedFace>,
    pub principal: Option<&'a DetectedFace>,
}

/// Keep faces at least `min_width_ratio` of the buffer width wide and pick the
/// largest-area one as principal. Ties keep the first reported face.
pub fn filter_eligible(
    faces: &[DetectedFace],
    working_width: u32,
    min_width_ratio: f64,
) -> EligibleFaces<'_> {
    let min_width = working_width as f64 * min_width_ratio;
    let eligible: Vec<&DetectedFace> = faces
        .iter()
        .filter(|face| face.bounding_box.width() as f64 >= min_width)
        .collect();

    let principal = eligible
        .iter()
        .copied()
        .fold(None, |best: Option<&DetectedFace>, face| match best {
            Some(current) if current.bounding_box.area() >= face.bounding_box.area() => {
                Some(current)
            }
            _ => Some(face),
        });

    EligibleFaces {
        eligible,
        principal,
    }
}
