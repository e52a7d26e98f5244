//! Photo quality analysis library for Pickly
//!
//! This crate scores a single photo for "best of the week" selection. A photo
//! goes through a fixed pipeline: normalize the pixels, measure sharpness, ask
//! the face detector for faces, screen the result against the cutoff policy and
//! finally compute the weighted quality score.

pub mod analyzer;
pub mod cutoff;
pub mod error;
pub mod faces;
pub mod model;
pub mod normalize;
pub mod scorer;
pub mod sharpness;

pub use analyzer::{AnalyzerConfig, QualityAnalyzer};
pub use cutoff::{CutoffPolicy, CutoffReason, FaceDiagnostics, Verdict};
pub use error::NormalizeError;
pub use faces::{DetectedFace, EligibleFaces, FaceDetector, Landmark, LandmarkKind, WorkingBox};
pub use model::{FaceBoundingBox, Photo, RecommendationScore};
pub use normalize::{CanonicalSize, ImageNormalizer, NormalizedImage, Orientation, WorkingSize};
pub use scorer::{QualityScorer, SubScores};
