//! Configuration for the pickly CLI
//!
//! Loaded from `~/.pickly/config.toml` (or `--config <path>`). Every section
//! and key is optional; missing values fall back to the built-in defaults.
//!
//! ```toml
//! log_level = "info"
//!
//! [analysis]
//! blur_threshold = 100.0
//!
//! [weeks]
//! first_day_of_week = "Sun"
//! minimal_days_in_first_week = 1
//!
//! [recommend]
//! picks_per_week = 2
//!
//! [store]
//! database_path = "/home/me/.pickly/scores.db"
//!
//! [detector]
//! command = "python3"
//! args = ["detect_faces.py"]
//! ```

use std::path::{Path, PathBuf};

use photo_quality::AnalyzerConfig;
use score_db::ScoreDb;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use weekly_picks::{RecommenderConfig, WeekConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicklyConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    pub analysis: AnalyzerConfig,
    pub weeks: WeekConfig,
    pub recommend: RecommenderConfig,
    pub store: StoreConfig,
    pub detector: DetectorConfig,
}

impl Default for PicklyConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            analysis: AnalyzerConfig::default(),
            weeks: WeekConfig::default(),
            recommend: RecommenderConfig::default(),
            store: StoreConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: ScoreDb::default_path(),
        }
    }
}

/// External face detector process. The working image path is appended to `args`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl PicklyConfig {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pickly")
            .join("config.toml")
    }

    /// Load an explicit config file, or the default one if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: PicklyConfig = toml::from_str("").unwrap();
        assert_eq!(config, PicklyConfig::default());
        assert_eq!(config.analysis.blur_threshold, 100.0);
        assert_eq!(config.recommend.picks_per_week, 2);
        assert!(config.detector.command.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: PicklyConfig = toml::from_str(
            r#"
            log_level = "debug"

            [analysis]
            blur_threshold = 150.0

            [weeks]
            first_day_of_week = "Sun"
            minimal_days_in_first_week = 1
            utc_offset_minutes = 540

            [recommend]
            picks_per_week = 3

            [store]
            database_path = "/tmp/pickly/scores.db"

            [detector]
            command = "python3"
            args = ["detect_faces.py", "--fast"]
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.analysis.blur_threshold, 150.0);
        assert_eq!(config.analysis.target_max_side, 1024);
        assert_eq!(config.weeks.first_day_of_week, Weekday::Sun);
        assert_eq!(config.weeks.utc_offset_minutes, Some(540));
        assert_eq!(config.recommend.picks_per_week, 3);
        assert_eq!(config.recommend.week_concurrency, 4);
        assert_eq!(config.store.database_path, PathBuf::from("/tmp/pickly/scores.db"));
        assert_eq!(config.detector.command.as_deref(), Some("python3"));
        assert_eq!(config.detector.args, vec!["detect_faces.py", "--fast"]);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = PicklyConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[analysis\nblur_threshold = ").unwrap();
        assert!(matches!(PicklyConfig::from_file(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[recommend]\npicks_per_week = 1\n").unwrap();

        let config = PicklyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.recommend.picks_per_week, 1);
    }
}
