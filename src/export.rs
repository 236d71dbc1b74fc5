use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::history::SessionRecord;
use crate::stats::Attempt;

#[derive(Debug, Serialize)]
struct AttemptRow {
    timestamp: String,
    character: char,
    pressed: char,
    correct: bool,
    latency_ms: u64,
    replay_count: u32,
}

impl From<&Attempt> for AttemptRow {
    fn from(a: &Attempt) -> Self {
        Self {
            timestamp: a.timestamp.to_rfc3339(),
            character: a.character,
            pressed: a.pressed,
            correct: a.correct,
            latency_ms: a.latency.as_millis() as u64,
            replay_count: a.replay_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionRow {
    started_at: String,
    duration_secs: f64,
    wpm: f64,
    attempts: u32,
    correct: u32,
    accuracy: f64,
    avg_latency_ms: Option<f64>,
}

impl From<&SessionRecord> for SessionRow {
    fn from(s: &SessionRecord) -> Self {
        let accuracy = if s.attempts == 0 {
            0.0
        } else {
            (s.correct as f64 / s.attempts as f64 * 100.0).round()
        };
        Self {
            started_at: s.started_at.to_rfc3339(),
            duration_secs: s.duration_secs,
            wpm: s.wpm,
            attempts: s.attempts,
            correct: s.correct,
            accuracy,
            avg_latency_ms: s.avg_latency_ms.map(|ms| (ms * 100.0).round() / 100.0),
        }
    }
}

/// Writes one CSV row per attempt, header first
pub fn write_attempts<W: Write>(writer: W, attempts: &[Attempt]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for attempt in attempts {
        wtr.serialize(AttemptRow::from(attempt))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_sessions<W: Write>(writer: W, sessions: &[SessionRecord]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for session in sessions {
        wtr.serialize(SessionRow::from(session))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Exports attempts to `path`, replacing any existing file
pub fn export_attempts<P: AsRef<Path>>(path: P, attempts: &[Attempt]) -> csv::Result<usize> {
    let file = std::fs::File::create(path)?;
    write_attempts(file, attempts)?;
    Ok(attempts.len())
}

/// Appends a session summary to a running log, emitting the header only for a new file
pub fn append_session_log<P: AsRef<Path>>(path: P, session: &SessionRecord) -> csv::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let needs_header = !path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    wtr.serialize(SessionRow::from(session))?;
    wtr.flush()?;
    Ok(())
}
