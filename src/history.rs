use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::app_dirs::AppDirs;
use crate::stats::{Attempt, SessionStats};

/// One finished session as stored on disk
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: DateTime<Local>,
    pub duration_secs: f64,
    pub wpm: f64,
    pub attempts: u32,
    pub correct: u32,
    pub avg_latency_ms: Option<f64>,
}

/// Lifetime numbers for one character
#[derive(Debug, Clone, PartialEq)]
pub struct CharSummary {
    pub character: char,
    /// Mean latency over correct answers only
    pub avg_latency_ms: Option<f64>,
    /// Percentage of attempts answered wrong
    pub miss_rate: f64,
    pub attempts: i64,
    pub last_seen: Option<DateTime<Local>>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    duration_secs REAL NOT NULL,
    wpm REAL NOT NULL,
    attempts INTEGER NOT NULL,
    correct INTEGER NOT NULL,
    avg_latency_ms REAL
);
CREATE TABLE IF NOT EXISTS attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    character TEXT NOT NULL,
    pressed TEXT NOT NULL,
    correct BOOLEAN NOT NULL,
    latency_ms REAL NOT NULL,
    replay_count INTEGER NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attempts_char ON attempts(character);
CREATE INDEX IF NOT EXISTS idx_attempts_timestamp ON attempts(timestamp);
"#;

/// Session and attempt history in SQLite
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Opens the database under `$HOME/.local/state/dahdit`
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("dahdit_history.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        debug!(path = %path.display(), "opening history database");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(HistoryDb { conn })
    }

    /// Stores a session and all of its attempts in one transaction
    pub fn record_session(
        &mut self,
        started_at: DateTime<Local>,
        duration_secs: f64,
        wpm: f64,
        stats: &SessionStats,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO sessions
            (started_at, duration_secs, wpm, attempts, correct, avg_latency_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                started_at.to_rfc3339(),
                duration_secs,
                wpm,
                stats.total_attempts(),
                stats.total_correct(),
                stats.avg_latency_ms(),
            ],
        )?;
        let session_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO attempts
                (session_id, character, pressed, correct, latency_ms, replay_count, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for attempt in &stats.attempts {
                stmt.execute(params![
                    session_id,
                    attempt.character.to_string(),
                    attempt.pressed.to_string(),
                    attempt.correct,
                    attempt.latency_ms(),
                    attempt.replay_count,
                    attempt.timestamp.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            session_id,
            attempts = stats.attempts.len(),
            "session recorded"
        );
        Ok(session_id)
    }

    pub fn char_summary(&self) -> Result<Vec<CharSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                character,
                AVG(CASE WHEN correct = 1 THEN latency_ms END) as avg_latency,
                (SUM(CASE WHEN correct = 0 THEN 1 ELSE 0 END) * 100.0 / COUNT(*)) as miss_rate,
                COUNT(*) as total_attempts,
                MAX(timestamp) as last_seen
            FROM attempts
            GROUP BY character
            ORDER BY character
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let char_str: String = row.get(0)?;
            let last_seen: Option<String> = row.get(4)?;
            Ok(CharSummary {
                character: first_char(&char_str),
                avg_latency_ms: row.get(1)?,
                miss_rate: row.get(2)?,
                attempts: row.get(3)?,
                last_seen: last_seen.as_deref().and_then(|s| parse_timestamp(s).ok()),
            })
        })?;

        rows.collect()
    }

    /// Newest sessions first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, started_at, duration_secs, wpm, attempts, correct, avg_latency_ms
            FROM sessions
            ORDER BY started_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let started_at: String = row.get(1)?;
            Ok(SessionRecord {
                id: row.get(0)?,
                started_at: parse_timestamp(&started_at).map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        1,
                        "started_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?,
                duration_secs: row.get(2)?,
                wpm: row.get(3)?,
                attempts: row.get(4)?,
                correct: row.get(5)?,
                avg_latency_ms: row.get(6)?,
            })
        })?;

        rows.collect()
    }

    /// Every stored attempt, oldest first
    pub fn all_attempts(&self) -> Result<Vec<Attempt>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT character, pressed, correct, latency_ms, replay_count, timestamp
            FROM attempts
            ORDER BY timestamp ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let character: String = row.get(0)?;
            let pressed: String = row.get(1)?;
            let latency_ms: f64 = row.get(3)?;
            let timestamp: String = row.get(5)?;
            Ok(Attempt {
                character: first_char(&character),
                pressed: first_char(&pressed),
                correct: row.get(2)?,
                latency: Duration::from_micros((latency_ms.max(0.0) * 1000.0).round() as u64),
                replay_count: row.get(4)?,
                timestamp: parse_timestamp(&timestamp).map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        5,
                        "timestamp".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?,
            })
        })?;

        rows.collect()
    }

    pub fn session_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
    }

    pub fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM attempts; DELETE FROM sessions;")
    }
}

fn first_char(s: &str) -> char {
    s.chars().next().unwrap_or('\0')
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Local>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Local))
}
