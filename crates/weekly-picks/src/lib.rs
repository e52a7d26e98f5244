//! Weekly grouping and best-photo recommendation for Pickly
//!
//! Photos are bucketed into calendar weeks by [`WeekGrouper`]. The
//! [`Recommender`] then scores every photo of a week concurrently through the
//! [`ScoreCache`] and keeps the top picks.

pub mod cache;
pub mod error;
pub mod lru;
pub mod recommend;
pub mod week;

pub use cache::{CacheStats, ScoreCache};
pub use error::WeekError;
pub use recommend::{select_top, Recommender, RecommenderConfig};
pub use week::{CaptureZone, WeekConfig, WeekDefinition, WeekGrouper, WeekId, WeeklyGroup};
