//! SQLite persistence for Pickly recommendation scores.
//!
//! One row per photo id in `photo_scores`, holding the JSON-serialized
//! `RecommendationScore` and the time it was produced. Writes replace the
//! existing row, so the last write for an id wins. A cached score stays valid
//! until the schema version changes; there is no TTL.
//!
//! Default location: `~/.pickly/scores.db`. Uses WAL mode so a reader never
//! waits on a writer from another process.

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use photo_quality::RecommendationScore;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bump whenever scoring changes make stored scores incomparable.
pub const SCHEMA_VERSION: i64 = 1;

/// A persisted score and its analysis time (epoch millis).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredScore {
    pub photo_id: i64,
    pub score: RecommendationScore,
    pub analyzed_at: i64,
}

/// Durable keyed store: photo id → score.
///
/// Calls are blocking; async callers should run them on a blocking pool.
pub trait ScoreStore: Send + Sync {
    fn load(&self, photo_id: i64) -> Result<Option<StoredScore>>;
    fn save(&self, photo_id: i64, score: &RecommendationScore, analyzed_at: i64) -> Result<()>;
}

/// Score database handle.
pub struct ScoreDb {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl ScoreDb {
    /// Default database path under the user's home directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pickly")
            .join("scores.db")
    }

    /// Open or create a database at a specific path.
    /// Creates the parent directory if needed.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database dir: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // WAL mode for concurrent read/write
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        })
    }

    /// Get the database file path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // -- Schema --

    fn migrate(conn: &Connection) -> Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != SCHEMA_VERSION {
            if version != 0 {
                info!(
                    found = version,
                    expected = SCHEMA_VERSION,
                    "score schema changed, dropping cached scores"
                );
            }
            conn.execute_batch("DROP TABLE IF EXISTS photo_scores;")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS photo_scores (
                photo_id INTEGER PRIMARY KEY,
                score TEXT NOT NULL,
                analyzed_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // -- Maintenance --

    /// Number of stored scores.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM photo_scores", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Drop every stored score. Returns the number of rows removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.lock().execute("DELETE FROM photo_scores", [])?;
        Ok(removed)
    }
}

impl ScoreStore for ScoreDb {
    fn load(&self, photo_id: i64) -> Result<Option<StoredScore>> {
        let row: Option<(String, i64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT score, analyzed_at FROM photo_scores WHERE photo_id = ?1",
                params![photo_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("Failed to read score for photo {}", photo_id))?;

        let Some((json, analyzed_at)) = row else {
            return Ok(None);
        };

        // An unreadable row is a miss; the next save overwrites it
        match serde_json::from_str(&json) {
            Ok(score) => Ok(Some(StoredScore {
                photo_id,
                score,
                analyzed_at,
            })),
            Err(err) => {
                warn!(photo_id, error = %err, "discarding unreadable stored score");
                Ok(None)
            }
        }
    }

    fn save(&self, photo_id: i64, score: &RecommendationScore, analyzed_at: i64) -> Result<()> {
        let json = serde_json::to_string(score)?;
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO photo_scores (photo_id, score, analyzed_at)
                 VALUES (?1, ?2, ?3)",
                params![photo_id, json, analyzed_at],
            )
            .with_context(|| format!("Failed to write score for photo {}", photo_id))?;
        Ok(())
    }
}

/// Non-durable store for tests and one-off runs.
#[derive(Default)]
pub struct MemoryScoreStore {
    scores: RwLock<HashMap<i64, StoredScore>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.read().is_empty()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn load(&self, photo_id: i64) -> Result<Option<StoredScore>> {
        Ok(self.scores.read().get(&photo_id).cloned())
    }

    fn save(&self, photo_id: i64, score: &RecommendationScore, analyzed_at: i64) -> Result<()> {
        self.scores.write().insert(
            photo_id,
            StoredScore {
                photo_id,
                score: score.clone(),
                analyzed_at,
            },
        );
        Ok(())
    }
}
