//! Face detection through an external process
//!
//! The working buffer is written to a temporary PNG and its path is appended
//! to the configured command line. The process must print a JSON array of
//! faces on stdout, for example:
//!
//! ```json
//! [{"bounding_box": {"left": 120, "top": 80, "right": 260, "bottom": 240},
//!   "landmarks": [{"kind": "nose_base", "x": 190.0, "y": 170.0}],
//!   "left_eye_open_probability": 0.93, "right_eye_open_probability": 0.91,
//!   "smiling_probability": 0.12,
//!   "head_euler_angle_x": 4.5, "head_euler_angle_y": -8.0}]
//! ```
//!
//! Coordinates refer to the PNG it was given.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use photo_quality::{DetectedFace, FaceDetector};
use tokio::process::Command;
use tracing::debug;

pub struct ExternalFaceDetector {
    command: String,
    args: Vec<String>,
}

impl ExternalFaceDetector {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl FaceDetector for ExternalFaceDetector {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>> {
        let file = tempfile::Builder::new()
            .prefix("pickly-")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temporary image")?;

        let path = file.path().to_path_buf();
        let pixels = image.clone();
        tokio::task::spawn_blocking(move || pixels.save_with_format(&path, ImageFormat::Png))
            .await
            .context("image encode task failed")?
            .context("Failed to write temporary image")?;

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(file.path())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run face detector `{}`", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("face detector exited with {}: {}", output.status, stderr.trim());
        }

        let faces = parse_faces(&output.stdout)?;
        debug!(faces = faces.len(), "external detector finished");
        Ok(faces)
    }
}

pub fn parse_faces(stdout: &[u8]) -> Result<Vec<DetectedFace>> {
    serde_json::from_slice(stdout).context("face detector returned invalid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use photo_quality::{LandmarkKind, WorkingBox};

    fn sh(script: &str) -> ExternalFaceDetector {
        let args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
        ExternalFaceDetector::new("sh", args)
    }

    fn tiny() -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
    }

    #[test]
    fn test_parse_faces() {
        let json = br#"[{"bounding_box":{"left":1,"top":2,"right":30,"bottom":40},
            "landmarks":[{"kind":"mouth_bottom","x":15.0,"y":35.0}],
            "smiling_probability":0.8}]"#;
        let faces = parse_faces(json).unwrap();

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bounding_box, WorkingBox::new(1, 2, 30, 40));
        assert!(faces[0].has_landmark(LandmarkKind::MouthBottom));
        assert_eq!(faces[0].smiling_probability, Some(0.8));
        assert_eq!(faces[0].left_eye_open_probability, None);

        assert!(parse_faces(b"[]").unwrap().is_empty());
        assert!(parse_faces(b"faces: none").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_receives_png_path() {
        // Only answers with a face when it was handed a non-empty file
        let face = r#"[{"bounding_box":{"left":1,"top":1,"right":5,"bottom":5}}]"#;
        let detector = sh(&format!(r#"test -s "$1" && echo '{}'"#, face));
        let faces = detector.detect(&tiny()).await.unwrap();
        assert_eq!(faces.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_failure_is_an_error() {
        let err = sh("echo broken >&2; exit 3").detect(&tiny()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_malformed_output_is_an_error() {
        assert!(sh("echo not-json").detect(&tiny()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_command_is_an_error() {
        let detector = ExternalFaceDetector::new("pickly-no-such-detector-binary", Vec::new());
        assert!(detector.detect(&tiny()).await.is_err());
    }
}
