//! Cutoff decision tree
//!
//! The checks run in a fixed order and the first match wins:
//!
//! 1. image load failed
//! 2. severe blur (before face detection, so the detector is never called on junk)
//! 3. no face detected
//! 4. no face wide enough
//! 5. principal face cropped at an edge
//! 6. principal face occluded (nose or mouth landmark missing)
//! 7. eyes closed, unless the subject is clearly smiling
//! 8. head turned too far
//!
//! Steps 1 and 2 are screened before detection; [`CutoffPolicy::screen_faces`]
//! covers the rest and returns a [`Verdict`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::faces::{DetectedFace, EligibleFaces, LandmarkKind};
use crate::normalize::WorkingSize;

const ANALYSIS_ERROR_PREFIX: &str = "Analysis error: ";

/// Why a photo was excluded from ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutoffReason {
    ImageLoadFailed,
    Blurry,
    NoFaceDetected,
    FacesTooSmall,
    FaceCropped,
    FaceOccluded,
    EyesClosed,
    HeadTurned,
    /// Detector failure or any other unexpected error while analyzing
    AnalysisError(String),
}

impl fmt::Display for CutoffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutoffReason::ImageLoadFailed => write!(f, "Image load failed"),
            CutoffReason::Blurry => write!(f, "Severe shaking (Blurry)"),
            CutoffReason::NoFaceDetected => write!(f, "No face detected"),
            CutoffReason::FacesTooSmall => write!(f, "Faces too small ( < 5% )"),
            CutoffReason::FaceCropped => write!(f, "Face cropped at edges"),
            CutoffReason::FaceOccluded => write!(f, "Face occluded (Nose/Mouth hidden)"),
            CutoffReason::EyesClosed => write!(f, "Eyes closed"),
            CutoffReason::HeadTurned => write!(f, "Head turned too much"),
            CutoffReason::AnalysisError(message) => {
                write!(f, "{}{}", ANALYSIS_ERROR_PREFIX, message)
            }
        }
    }
}

impl FromStr for CutoffReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reason = match s {
            "Image load failed" => CutoffReason::ImageLoadFailed,
            "Severe shaking (Blurry)" => CutoffReason::Blurry,
            "No face detected" => CutoffReason::NoFaceDetected,
            "Faces too small ( < 5% )" => CutoffReason::FacesTooSmall,
            "Face cropped at edges" => CutoffReason::FaceCropped,
            "Face occluded (Nose/Mouth hidden)" => CutoffReason::FaceOccluded,
            "Eyes closed" => CutoffReason::EyesClosed,
            "Head turned too much" => CutoffReason::HeadTurned,
            other => match other.strip_prefix(ANALYSIS_ERROR_PREFIX) {
                Some(message) => CutoffReason::AnalysisError(message.to_string()),
                None => return Err(format!("unknown cutoff reason: {}", other)),
            },
        };
        Ok(reason)
    }
}

// Serialized as the display text
impl Serialize for CutoffReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CutoffReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-face readings taken from the principal face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDiagnostics {
    pub smile_prob: f64,
    pub left_eye_open: f64,
    pub right_eye_open: f64,
    pub eye_open_prob: f64,
    /// |headEulerAngleX| in degrees
    pub head_pitch: f64,
    /// |headEulerAngleY| in degrees
    pub head_yaw: f64,
}

impl FaceDiagnostics {
    /// Missing classifier outputs count as 0.0
    pub fn from_face(face: &DetectedFace) -> Self {
        let left_eye_open = face.left_eye_open_probability.unwrap_or(0.0) as f64;
        let right_eye_open = face.right_eye_open_probability.unwrap_or(0.0) as f64;
        Self {
            smile_prob: face.smiling_probability.unwrap_or(0.0) as f64,
            left_eye_open,
            right_eye_open,
            eye_open_prob: (left_eye_open + right_eye_open) / 2.0,
            head_pitch: (face.head_euler_angle_x as f64).abs(),
            head_yaw: (face.head_euler_angle_y as f64).abs(),
        }
    }
}

/// Result of screening a photo's faces.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Proceed to scoring with these principal-face readings
    Eligible(FaceDiagnostics),
    /// Excluded; diagnostics are present once a principal face was chosen
    Cutoff {
        reason: CutoffReason,
        diagnostics: Option<FaceDiagnostics>,
    },
}

impl Verdict {
    fn cutoff(reason: CutoffReason, diagnostics: Option<FaceDiagnostics>) -> Self {
        Verdict::Cutoff {
            reason,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> Option<&FaceDiagnostics> {
        match self {
            Verdict::Eligible(diagnostics) => Some(diagnostics),
            Verdict::Cutoff { diagnostics, .. } => diagnostics.as_ref(),
        }
    }
}

const OCCLUSION_LANDMARKS: [LandmarkKind; 4] = [
    LandmarkKind::NoseBase,
    LandmarkKind::MouthLeft,
    LandmarkKind::MouthRight,
    LandmarkKind::MouthBottom,
];

/// Thresholds for the decision tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoffPolicy {
    /// Laplacian variance below this is severe blur
    pub blur_threshold: f64,
    /// Either eye below this counts as closed
    pub eyes_open_threshold: f64,
    /// A smile above this overrides closed eyes
    pub smile_override_threshold: f64,
    /// Max |pitch| or |yaw| in degrees
    pub head_rotation_limit: f64,
}

impl Default for CutoffPolicy {
    fn default() -> Self {
        Self {
            blur_threshold: 100.0,
            eyes_open_threshold: 0.5,
            smile_override_threshold: 0.7,
            head_rotation_limit: 30.0,
        }
    }
}

impl CutoffPolicy {
    /// Step 2: severe blur
    pub fn screen_sharpness(&self, raw_variance: f64) -> Option<CutoffReason> {
        (raw_variance < self.blur_threshold).then_some(CutoffReason::Blurry)
    }

    /// Steps 3–8, given the raw detector output and its eligible subset
    pub fn screen_faces(
        &self,
        raw: &[DetectedFace],
        faces: &EligibleFaces<'_>,
        working: WorkingSize,
    ) -> Verdict {
        if raw.is_empty() {
            return Verdict::cutoff(CutoffReason::NoFaceDetected, None);
        }

        let principal = match faces.principal {
            Some(face) => face,
            None => return Verdict::cutoff(CutoffReason::FacesTooSmall, None),
        };
        let diagnostics = FaceDiagnostics::from_face(principal);

        if principal.bounding_box.touches_edge(working) {
            return Verdict::cutoff(CutoffReason::FaceCropped, Some(diagnostics));
        }

        if OCCLUSION_LANDMARKS.iter().any(|kind| !principal.has_landmark(*kind)) {
            return Verdict::cutoff(CutoffReason::FaceOccluded, Some(diagnostics));
        }

        let eyes_closed = diagnostics.left_eye_open < self.eyes_open_threshold
            || diagnostics.right_eye_open < self.eyes_open_threshold;
        let smiling = diagnostics.smile_prob > self.smile_override_threshold;
        if eyes_closed && !smiling {
            return Verdict::cutoff(CutoffReason::EyesClosed, Some(diagnostics));
        }

        if diagnostics.head_pitch > self.head_rotation_limit
            || diagnostics.head_yaw > self.head_rotation_limit
        {
            return Verdict::cutoff(CutoffReason::HeadTurned, Some(diagnostics));
        }

        Verdict::Eligible(diagnostics)
    }
}
