mod config;
mod detector;
mod library;
mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photo_quality::QualityAnalyzer;
use score_db::ScoreDb;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weekly_picks::{Recommender, ScoreCache, WeekId};

use crate::config::PicklyConfig;
use crate::detector::ExternalFaceDetector;

#[derive(Parser)]
#[command(name = "pickly")]
#[command(about = "Picks the best photos of every week")]
struct Cli {
    /// Config file (defaults to ~/.pickly/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group a folder of photos by week and pick the best of each week
    Recommend {
        /// Path to folder containing photos
        #[arg(short, long)]
        path: PathBuf,

        /// Only this week, e.g. 2025-W49
        #[arg(short, long)]
        week: Option<WeekId>,

        /// Output results to JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include subfolders
        #[arg(short, long)]
        recursive: bool,
    },

    /// Inspect or reset the stored scores
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show how many scores are stored
    Stats,
    /// Delete every stored score
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PicklyConfig::load(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Recommend { path, week, output, recursive } => {
            recommend_folder(config, path, week, output, recursive).await
        }
        Commands::Cache { action } => cache_command(&config, action),
    }
}

fn init_tracing(config: &PicklyConfig, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn recommend_folder(
    config: PicklyConfig,
    folder_path: PathBuf,
    week: Option<WeekId>,
    output_path: Option<PathBuf>,
    recursive: bool,
) -> Result<()> {
    println!("🔍 Scanning photos in: {}", folder_path.display());

    let grouper = config.weeks.grouper()?;
    let zone = grouper.zone();
    let scan_path = folder_path.clone();
    let scan =
        tokio::task::spawn_blocking(move || library::scan_folder(&scan_path, recursive, zone))
            .await
            .context("folder scan task failed")??;

    if scan.skipped > 0 {
        println!("⚠️  Skipped {} unreadable files", scan.skipped);
    }
    if scan.photos.is_empty() {
        println!("⚠️  No supported photos found in {}", folder_path.display());
        return Ok(());
    }
    println!("📸 Found {} photos", scan.photos.len());

    let command = config
        .detector
        .command
        .clone()
        .context("No face detector configured: set [detector] command in the config file")?;
    let detector = Arc::new(ExternalFaceDetector::new(command, config.detector.args.clone()));
    let analyzer = Arc::new(QualityAnalyzer::with_config(detector, &config.analysis));

    let store = Arc::new(ScoreDb::open(&config.store.database_path)?);
    info!(path = %store.path().display(), "score store opened");
    let cache = Arc::new(ScoreCache::new(store, config.recommend.memory_cache_entries));
    let recommender = Recommender::with_config(analyzer, cache, config.recommend.clone());

    println!("🎯 Picking the best photos...");
    let groups = match week {
        Some(week_id) => {
            let found = recommender.recommend_week_of(&grouper, scan.photos, week_id).await?;
            if found.is_none() {
                println!("⚠️  No photos taken in {}", week_id);
                return Ok(());
            }
            found.into_iter().collect()
        }
        None => recommender.recommend(grouper.group(scan.photos)).await?,
    };

    report::print_weeks(&groups);

    let stats = recommender.cache().stats();
    println!(
        "\n💾 Scores: {} from memory, {} from disk, {} analyzed",
        stats.memory_hits, stats.store_hits, stats.misses
    );

    if let Some(output_path) = output_path {
        report::write_json(&groups, &output_path)?;
        println!("💾 Results saved to: {}", output_path.display());
    }

    Ok(())
}

fn cache_command(config: &PicklyConfig, action: CacheAction) -> Result<()> {
    let db = ScoreDb::open(&config.store.database_path)?;
    match action {
        CacheAction::Stats => {
            println!("📊 Score store: {}", db.path().display());
            println!("Stored scores: {}", db.count()?);
        }
        CacheAction::Clear => {
            let removed = db.clear()?;
            println!("🧹 Removed {} stored scores", removed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_recommend_with_week() {
        let cli = Cli::parse_from([
            "pickly", "recommend", "--path", "/photos", "--week", "2025-W49", "-r",
        ]);
        match cli.command {
            Commands::Recommend { path, week, output, recursive } => {
                assert_eq!(path, PathBuf::from("/photos"));
                assert_eq!(week, Some(WeekId::new(2025, 49)));
                assert!(output.is_none());
                assert!(recursive);
            }
            Commands::Cache { .. } => panic!("expected recommend"),
        }
    }

    #[test]
    fn test_bad_week_is_rejected() {
        let result = Cli::try_parse_from(["pickly", "recommend", "--path", "/p", "--week", "49"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli = Cli::parse_from(["pickly", "-v", "cache", "clear"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Cache { action: CacheAction::Clear }));
    }
}
