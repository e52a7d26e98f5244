//! Per-photo analysis pipeline
//!
//! [`QualityAnalyzer::analyze`] always returns a score. Load failures, detector
//! errors and panics in the pixel passes all end up as cutoff results, so one
//! bad photo can never take down the rest of its week.
//!
//! Decoding, sharpness and scoring run on the rayon pool. The tokio blocking
//! pool is left to store I/O.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cutoff::{CutoffPolicy, CutoffReason, FaceDiagnostics, Verdict};
use crate::faces::{filter_eligible, FaceDetector, WorkingBox, DEFAULT_MIN_FACE_WIDTH_RATIO};
use crate::model::{Photo, RecommendationScore};
use crate::normalize::{ImageNormalizer, DEFAULT_TARGET_MAX_SIDE};
use crate::scorer::QualityScorer;
use crate::sharpness;

/// Tunable thresholds for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Longest side of the working buffer in pixels
    pub target_max_side: u32,
    /// Laplacian variance below which a photo is rejected as blurry
    pub blur_threshold: f64,
    /// Minimum face width as a fraction of the working buffer width
    pub min_face_width_ratio: f64,
    pub eyes_open_threshold: f64,
    pub smile_override_threshold: f64,
    /// Max absolute pitch/yaw in degrees
    pub head_rotation_limit_deg: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let policy = CutoffPolicy::default();
        Self {
            target_max_side: DEFAULT_TARGET_MAX_SIDE,
            blur_threshold: policy.blur_threshold,
            min_face_width_ratio: DEFAULT_MIN_FACE_WIDTH_RATIO,
            eyes_open_threshold: policy.eyes_open_threshold,
            smile_override_threshold: policy.smile_override_threshold,
            head_rotation_limit_deg: policy.head_rotation_limit,
        }
    }
}

impl AnalyzerConfig {
    pub fn policy(&self) -> CutoffPolicy {
        CutoffPolicy {
            blur_threshold: self.blur_threshold,
            eyes_open_threshold: self.eyes_open_threshold,
            smile_override_threshold: self.smile_override_threshold,
            head_rotation_limit: self.head_rotation_limit_deg,
        }
    }
}

pub struct QualityAnalyzer {
    detector: Arc<dyn FaceDetector>,
    normalizer: ImageNormalizer,
    policy: CutoffPolicy,
    scorer: QualityScorer,
    min_face_width_ratio: f64,
}

impl QualityAnalyzer {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self::with_config(detector, &AnalyzerConfig::default())
    }

    pub fn with_config(detector: Arc<dyn FaceDetector>, config: &AnalyzerConfig) -> Self {
        Self {
            detector,
            normalizer: ImageNormalizer::new(config.target_max_side),
            policy: config.policy(),
            scorer: QualityScorer::new(),
            min_face_width_ratio: config.min_face_width_ratio,
        }
    }

    /// Analyze one photo. Never fails: errors become an `Analysis error` cutoff.
    pub async fn analyze(&self, photo: &Photo) -> RecommendationScore {
        match self.try_analyze(photo).await {
            Ok(score) => score,
            Err(err) => {
                warn!(
                    photo_id = photo.id,
                    path = %photo.file_path.display(),
                    "analysis failed: {:#}",
                    err
                );
                RecommendationScore::cutoff(CutoffReason::AnalysisError(format!("{:#}", err)))
            }
        }
    }

    async fn try_analyze(&self, photo: &Photo) -> Result<RecommendationScore> {
        let normalizer = self.normalizer.clone();
        let path = photo.file_path.clone();
        let loaded = run_on_compute(move || {
            normalizer.load(&path).map(|image| {
                let variance = sharpness::estimate(&image.pixels);
                (image, variance)
            })
        })
        .await
        .context("image preparation failed")?;

        let (image, raw_sharpness) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                debug!(photo_id = photo.id, error = %err, "image load failed");
                return Ok(RecommendationScore::cutoff(CutoffReason::ImageLoadFailed));
            }
        };

        let working = image.working_size();
        let canonical = image.canonical;
        let base = RecommendationScore {
            raw_sharpness,
            analyzed_width: canonical.width,
            analyzed_height: canonical.height,
            ..RecommendationScore::default()
        };

        if let Some(reason) = self.policy.screen_sharpness(raw_sharpness) {
            debug!(photo_id = photo.id, variance = raw_sharpness, "cut off before detection");
            return Ok(base.into_cutoff(reason));
        }

        let faces = self
            .detector
            .detect(&image.pixels)
            .await
            .context("face detection failed")?;

        let eligible = filter_eligible(&faces, working.width, self.min_face_width_ratio);
        let verdict = self.policy.screen_faces(&faces, &eligible, working);
        let scale = |face: &WorkingBox| face.to_canonical(working, canonical);

        // Eligible faces when a principal exists, otherwise every raw face for diagnostics
        let with_faces = match eligible.principal {
            Some(principal) => RecommendationScore {
                face_count: eligible.eligible.len() as u32,
                face_bounding_box: Some(scale(&principal.bounding_box)),
                all_face_bounding_boxes: eligible
                    .eligible
                    .iter()
                    .map(|face| scale(&face.bounding_box))
                    .collect(),
                ..base
            },
            None => RecommendationScore {
                face_count: faces.len() as u32,
                all_face_bounding_boxes: faces
                    .iter()
                    .map(|face| scale(&face.bounding_box))
                    .collect(),
                ..base
            },
        };
        let principal_box = eligible.principal.map(|face| face.bounding_box);

        let partial = match verdict.diagnostics() {
            Some(diagnostics) => apply_diagnostics(with_faces, diagnostics),
            None => with_faces,
        };

        let (diagnostics, principal_box) = match (verdict, principal_box) {
            (Verdict::Eligible(diagnostics), Some(principal_box)) => (diagnostics, principal_box),
            (Verdict::Cutoff { reason, .. }, _) => {
                debug!(photo_id = photo.id, reason = %reason, faces = faces.len(), "photo cut off");
                return Ok(partial.into_cutoff(reason));
            }
            (Verdict::Eligible(_), None) => {
                anyhow::bail!("eligible verdict without a principal face")
            }
        };

        let scorer = self.scorer;
        let pixels = image.pixels;
        let sub_scores = run_on_compute(move || {
            scorer.score(&pixels, raw_sharpness, &principal_box, &diagnostics)
        })
        .await
        .context("scoring failed")?;

        let total_score = sub_scores.total();
        debug!(photo_id = photo.id, total = total_score, "photo scored");

        Ok(RecommendationScore {
            total_score,
            sharpness_score: sub_scores.sharpness,
            expression_score: sub_scores.expression,
            lighting_score: sub_scores.lighting,
            composition_score: sub_scores.composition,
            background_score: sub_scores.background,
            ..partial
        })
    }
}

/// Run CPU-bound work on the rayon pool and await its result.
/// A panic in `job` comes back as an error instead of aborting the process.
async fn run_on_compute<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    rayon::spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(job));
        let _ = tx.send(outcome);
    });

    match rx.await.context("compute pool dropped the job")? {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|msg| msg.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            anyhow::bail!("panicked: {}", message)
        }
    }
}

fn apply_diagnostics(
    score: RecommendationScore,
    diagnostics: &FaceDiagnostics,
) -> RecommendationScore {
    RecommendationScore {
        eye_open_prob: diagnostics.eye_open_prob,
        left_eye_open_prob: diagnostics.left_eye_open,
        right_eye_open_prob: diagnostics.right_eye_open,
        smile_prob: diagnostics.smile_prob,
        head_pitch: diagnostics.head_pitch,
        head_yaw: diagnostics.head_yaw,
        ..score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::{DetectedFace, Landmark, LandmarkKind};
    use crate::model::FaceBoundingBox;
    use crate::normalize::write_jpeg_with_orientation;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixtureDetector {
        faces: Vec<DetectedFace>,
        calls: AtomicUsize,
    }

    impl FixtureDetector {
        fn new(faces: Vec<DetectedFace>) -> Arc<Self> {
            Arc::new(Self {
                faces,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FaceDetector for FixtureDetector {
        async fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.faces.clone())
        }
    }

    /// Finds one face, but only in an upright portrait buffer
    struct PortraitDetector;

    #[async_trait]
    impl FaceDetector for PortraitDetector {
        async fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>> {
            if image.height() > image.width() {
                Ok(vec![face(200, 300, 400, 500)])
            } else {
                Ok(vec![])
            }
        }
    }

    struct FailingDetector;

    #[async_trait]
    impl FaceDetector for FailingDetector {
        async fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>> {
            anyhow::bail!("detector offline")
        }
    }

    fn face(left: i32, top: i32, right: i32, bottom: i32) -> DetectedFace {
        let landmarks = [
            LandmarkKind::NoseBase,
            LandmarkKind::MouthLeft,
            LandmarkKind::MouthRight,
            LandmarkKind::MouthBottom,
        ]
        .into_iter()
        .map(|kind| Landmark {
            kind,
            x: 0.0,
            y: 0.0,
        })
        .collect();

        DetectedFace {
            bounding_box: WorkingBox::new(left, top, right, bottom),
            landmarks,
            left_eye_open_probability: Some(0.9),
            right_eye_open_probability: Some(0.9),
            smiling_probability: Some(0.0),
            head_euler_angle_x: 2.0,
            head_euler_angle_y: -4.0,
        }
    }

    fn checkerboard(width: u32, height: u32, block: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / block + y / block) % 2 == 0 {
                Rgb([230, 230, 230])
            } else {
                Rgb([30, 30, 30])
            }
        })
    }

    fn write_checkerboard(dir: &Path, name: &str, width: u32, height: u32, block: u32) -> PathBuf {
        let path = dir.join(name);
        checkerboard(width, height, block).save(&path).unwrap();
        path
    }

    fn write_flat(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(320, 240, Rgb([120, 120, 120])).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_flat_image_is_blurry_and_skips_detection() {
        let dir = tempfile::tempdir().unwrap();
        let detector = FixtureDetector::new(vec![face(100, 60, 200, 160)]);
        let analyzer = QualityAnalyzer::new(detector.clone());

        let path = write_flat(dir.path(), "flat.png");

        let score = analyzer.analyze(&Photo::new(1, path, 0)).await;

        assert_eq!(score.cutoff_reason, Some(CutoffReason::Blurry));
        assert_eq!(score.raw_sharpness, 0.0);
        assert_eq!(score.total_score, 0.0);
        assert_eq!(score.analyzed_width, 320);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_load_failure() {
        let analyzer = QualityAnalyzer::new(FixtureDetector::new(vec![]));
        let photo = Photo::new(2, "/nonexistent/pickly/photo.jpg", 0);
        let score = analyzer.analyze(&photo).await;

        assert_eq!(score.cutoff_reason, Some(CutoffReason::ImageLoadFailed));
        assert_eq!(score.raw_sharpness, 0.0);
    }

    #[tokio::test]
    async fn test_sharp_photo_with_good_face_is_scored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "good.png", 640, 480, 4);
        let detector = FixtureDetector::new(vec![face(220, 140, 420, 340)]);
        let analyzer = QualityAnalyzer::new(detector);

        let score = analyzer.analyze(&Photo::new(3, path, 0)).await;

        assert!(!score.is_cutoff(), "unexpected cutoff: {:?}", score.cutoff_reason);
        assert!(score.raw_sharpness >= 100.0);
        assert_eq!(score.face_count, 1);
        assert_eq!(score.sharpness_score, 100.0);
        assert_eq!(score.background_score, 50.0);
        assert!((score.eye_open_prob - 0.9).abs() < 1e-6);
        assert_eq!(score.head_pitch, 2.0);
        assert_eq!(score.head_yaw, 4.0);
        assert!(score.total_score > 0.0 && score.total_score <= 100.0);
        for sub in [
            score.sharpness_score,
            score.expression_score,
            score.lighting_score,
            score.composition_score,
            score.background_score,
        ] {
            assert!((0.0..=100.0).contains(&sub));
        }
    }

    #[tokio::test]
    async fn test_face_boxes_are_reported_in_canonical_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        // 1600x1200 is sampled by 2 into an 800x600 working buffer
        let path = write_checkerboard(dir.path(), "large.png", 1600, 1200, 16);
        let detector = FixtureDetector::new(vec![face(300, 200, 500, 400)]);
        let analyzer = QualityAnalyzer::new(detector);

        let score = analyzer.analyze(&Photo::new(4, path, 0)).await;

        assert!(!score.is_cutoff(), "unexpected cutoff: {:?}", score.cutoff_reason);
        assert_eq!((score.analyzed_width, score.analyzed_height), (1600, 1200));
        assert_eq!(
            score.face_bounding_box,
            Some(FaceBoundingBox {
                left: 600,
                top: 400,
                right: 1000,
                bottom: 800
            })
        );
        assert_eq!(score.all_face_bounding_boxes.len(), 1);
    }

    #[tokio::test]
    async fn test_exif_rotated_jpeg_is_analyzed_upright() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.jpg");
        // Stored landscape, displayed portrait
        write_jpeg_with_orientation(&path, checkerboard(1600, 1200, 16), 6);
        let analyzer = QualityAnalyzer::new(Arc::new(PortraitDetector));

        let score = analyzer.analyze(&Photo::new(11, path, 0)).await;

        assert!(!score.is_cutoff(), "unexpected cutoff: {:?}", score.cutoff_reason);
        assert_eq!((score.analyzed_width, score.analyzed_height), (1200, 1600));
        assert_eq!(
            score.face_bounding_box,
            Some(FaceBoundingBox {
                left: 400,
                top: 600,
                right: 800,
                bottom: 1000
            })
        );
    }

    #[tokio::test]
    async fn test_face_at_left_edge_is_cropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "edge.png", 640, 480, 4);
        let analyzer = QualityAnalyzer::new(FixtureDetector::new(vec![face(0, 140, 200, 340)]));

        let score = analyzer.analyze(&Photo::new(5, path, 0)).await;

        assert_eq!(score.cutoff_reason, Some(CutoffReason::FaceCropped));
        assert_eq!(score.total_score, 0.0);
        assert_eq!(score.sharpness_score, 0.0);
        // Diagnostics gathered before the exit survive
        assert!((score.left_eye_open_prob - 0.9).abs() < 1e-6);
        assert!(score.face_bounding_box.is_some());
    }

    #[tokio::test]
    async fn test_no_faces_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "empty.png", 640, 480, 4);
        let analyzer = QualityAnalyzer::new(FixtureDetector::new(vec![]));

        let score = analyzer.analyze(&Photo::new(6, path, 0)).await;

        assert_eq!(score.cutoff_reason, Some(CutoffReason::NoFaceDetected));
        assert_eq!(score.face_count, 0);
        assert!(score.raw_sharpness >= 100.0);
    }

    #[tokio::test]
    async fn test_small_faces_keep_raw_count_and_boxes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "crowd.png", 640, 480, 4);
        // 5% of 640 = 32px
        let analyzer = QualityAnalyzer::new(FixtureDetector::new(vec![
            face(100, 100, 120, 120),
            face(300, 300, 330, 330),
        ]));

        let score = analyzer.analyze(&Photo::new(7, path, 0)).await;

        assert_eq!(score.cutoff_reason, Some(CutoffReason::FacesTooSmall));
        assert_eq!(score.face_count, 2);
        assert_eq!(score.all_face_bounding_boxes.len(), 2);
        assert!(score.face_bounding_box.is_none());
    }

    #[tokio::test]
    async fn test_smile_overrides_closed_eyes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "laugh.png", 640, 480, 4);
        let mut laughing = face(220, 140, 420, 340);
        laughing.left_eye_open_probability = Some(0.1);
        laughing.right_eye_open_probability = Some(0.1);
        laughing.smiling_probability = Some(0.9);
        let analyzer = QualityAnalyzer::new(FixtureDetector::new(vec![laughing]));

        let score = analyzer.analyze(&Photo::new(8, path, 0)).await;

        assert!(!score.is_cutoff());
        assert!(score.expression_score > 50.0);
    }

    #[tokio::test]
    async fn test_detector_failure_becomes_analysis_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "offline.png", 640, 480, 4);
        let analyzer = QualityAnalyzer::new(Arc::new(FailingDetector));

        let score = analyzer.analyze(&Photo::new(9, path, 0)).await;

        let expected = "face detection failed: detector offline".to_string();
        assert_eq!(score.cutoff_reason, Some(CutoffReason::AnalysisError(expected)));
        assert_eq!(score.total_score, 0.0);
    }

    #[tokio::test]
    async fn test_custom_blur_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkerboard(dir.path(), "strict.png", 640, 480, 4);
        let config = AnalyzerConfig {
            blur_threshold: f64::MAX,
            ..AnalyzerConfig::default()
        };
        let analyzer = QualityAnalyzer::with_config(FixtureDetector::new(vec![]), &config);

        let score = analyzer.analyze(&Photo::new(10, path, 0)).await;
        assert_eq!(score.cutoff_reason, Some(CutoffReason::Blurry));
    }

    #[tokio::test]
    async fn test_compute_panic_becomes_error() {
        let err = run_on_compute(|| -> u32 { panic!("bad pixels") }).await.unwrap_err();
        assert_eq!(err.to_string(), "panicked: bad pixels");

        assert_eq!(run_on_compute(|| 6 * 7).await.unwrap(), 42);
    }
}
