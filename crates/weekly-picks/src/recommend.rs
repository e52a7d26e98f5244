//! Best-of-week selection
//!
//! Every photo of a week is scored in its own task (cache first, analyzer on a
//! miss). The week's picks are chosen only after all of them have finished.
//! A store error fails the week and aborts its remaining tasks.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::try_join_all;
use futures::{stream, StreamExt, TryStreamExt};
use photo_quality::{CutoffReason, Photo, QualityAnalyzer, RecommendationScore};
use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn};

use crate::cache::ScoreCache;
use crate::week::{WeekGrouper, WeekId, WeeklyGroup};

/// `[recommend]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Picks kept per week
    pub picks_per_week: usize,
    /// Weeks analyzed at the same time
    pub week_concurrency: usize,
    /// Scores kept in the memory tier of the cache
    pub memory_cache_entries: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            picks_per_week: 2,
            week_concurrency: 4,
            memory_cache_entries: 4096,
        }
    }
}

pub struct Recommender {
    analyzer: Arc<QualityAnalyzer>,
    cache: Arc<ScoreCache>,
    config: RecommenderConfig,
}

impl Recommender {
    pub fn new(analyzer: Arc<QualityAnalyzer>, cache: Arc<ScoreCache>) -> Self {
        Self::with_config(analyzer, cache, RecommenderConfig::default())
    }

    pub fn with_config(
        analyzer: Arc<QualityAnalyzer>,
        cache: Arc<ScoreCache>,
        config: RecommenderConfig,
    ) -> Self {
        Self {
            analyzer,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }

    /// Score and pick every group. Output order matches input order.
    pub async fn recommend(&self, groups: Vec<WeeklyGroup>) -> Result<Vec<WeeklyGroup>> {
        stream::iter(groups)
            .map(|group| self.recommend_group(group))
            .buffered(self.config.week_concurrency.max(1))
            .try_collect()
            .await
    }

    /// Group `photos` and recommend only the week `week_id`, if any photo falls in it
    pub async fn recommend_week_of(
        &self,
        grouper: &WeekGrouper,
        photos: Vec<Photo>,
        week_id: WeekId,
    ) -> Result<Option<WeeklyGroup>> {
        let group = grouper
            .group(photos)
            .into_iter()
            .find(|group| group.week_id == week_id);
        match group {
            Some(group) => Ok(Some(self.recommend_group(group).await?)),
            None => Ok(None),
        }
    }

    pub async fn recommend_group(&self, group: WeeklyGroup) -> Result<WeeklyGroup> {
        let WeeklyGroup {
            week_id,
            start_date,
            end_date,
            photos,
            ..
        } = group;

        let tasks: Vec<JoinHandle<Result<Photo>>> = photos
            .iter()
            .cloned()
            .map(|photo| {
                let analyzer = Arc::clone(&self.analyzer);
                let cache = Arc::clone(&self.cache);
                tokio::spawn(async move { score_photo(&analyzer, &cache, photo).await })
            })
            .collect();
        let _running = AbortOnDrop(tasks.iter().map(JoinHandle::abort_handle).collect());

        let outcomes = photos.into_iter().zip(tasks).map(|(original, task)| async move {
            match task.await {
                Ok(photo) => photo,
                Err(join_err) => {
                    // Not cached: the next run gets another attempt
                    warn!(photo_id = original.id, "analysis task failed: {}", join_err);
                    let reason = CutoffReason::AnalysisError(join_err.to_string());
                    Ok(original.with_score(RecommendationScore::cutoff(reason)))
                }
            }
        });
        // Fails on the first store error; dropping `_running` aborts the rest
        let scored = try_join_all(outcomes).await?;

        let recommended = select_top(&scored, self.config.picks_per_week);
        info!(
            week = %week_id,
            photos = scored.len(),
            cut_off = scored.iter().filter(|p| !p.is_recommendable()).count(),
            recommended = recommended.len(),
            "week scored"
        );

        Ok(WeeklyGroup {
            week_id,
            start_date,
            end_date,
            photos: scored,
            recommended,
        })
    }
}

/// Aborts the tasks it holds when dropped; finished tasks are unaffected
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

async fn score_photo(
    analyzer: &QualityAnalyzer,
    cache: &ScoreCache,
    photo: Photo,
) -> Result<Photo> {
    if let Some(score) = cache.get(photo.id).await? {
        return Ok(photo.with_score(score));
    }

    let score = analyzer.analyze(&photo).await;
    cache.put(photo.id, &score, Utc::now().timestamp_millis()).await?;
    Ok(photo.with_score(score))
}

/// Highest-scoring recommendable photos, at most `n`.
///
/// Equal totals prefer the more recent capture, then the lower id.
pub fn select_top(photos: &[Photo], n: usize) -> Vec<Photo> {
    let mut candidates: Vec<&Photo> = photos
        .iter()
        .filter(|photo| photo.is_recommendable())
        .collect();
    candidates.sort_by(|a, b| compare_for_pick(a, b));
    candidates.into_iter().take(n).cloned().collect()
}

fn compare_for_pick(a: &Photo, b: &Photo) -> Ordering {
    b.total_score()
        .total_cmp(&a.total_score())
        .then_with(|| b.taken_at.cmp(&a.taken_at))
        .then_with(|| a.id.cmp(&b.id))
}
