use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::util::{mean, millis, running_mean, std_dev};

/// One scored keystroke against a prompted character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub character: char,
    pub pressed: char,
    pub correct: bool,
    pub latency: Duration,
    pub replay_count: u32,
    pub timestamp: DateTime<Local>,
}

impl Attempt {
    pub fn latency_ms(&self) -> f64 {
        millis(self.latency)
    }
}

/// Per-character counters for a single session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CharTally {
    pub attempts: u32,
    pub correct: u32,
    /// Sum of latencies of correct answers only
    pub total_latency: Duration,
}

impl CharTally {
    pub fn avg_latency(&self) -> Option<Duration> {
        if self.correct == 0 {
            None
        } else {
            Some(self.total_latency / self.correct)
        }
    }

    pub fn miss_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            (self.attempts - self.correct) as f64 / self.attempts as f64 * 100.0
        }
    }
}

/// Everything scored during one session.
///
/// Owned by the session engine while running; a clone is handed out at the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub per_character: BTreeMap<char, CharTally>,
    pub attempts: Vec<Attempt>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attempt: Attempt) {
        let tally = self.per_character.entry(attempt.character).or_default();
        tally.attempts += 1;
        if attempt.correct {
            tally.correct += 1;
            tally.total_latency += attempt.latency;
        }
        self.attempts.push(attempt);
    }

    pub fn tally(&self, c: char) -> CharTally {
        self.per_character.get(&c).copied().unwrap_or_default()
    }

    pub fn total_attempts(&self) -> u32 {
        self.per_character.values().map(|t| t.attempts).sum()
    }

    pub fn total_correct(&self) -> u32 {
        self.per_character.values().map(|t| t.correct).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Percentage of keystrokes that were correct
    pub fn accuracy(&self) -> f64 {
        let attempts = self.total_attempts();
        if attempts == 0 {
            0.0
        } else {
            (self.total_correct() as f64 / attempts as f64 * 100.0).round()
        }
    }

    fn correct_latencies_ms(&self) -> Vec<f64> {
        self.attempts
            .iter()
            .filter(|a| a.correct)
            .map(Attempt::latency_ms)
            .collect()
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        mean(&self.correct_latencies_ms())
    }

    pub fn best_latency_ms(&self) -> Option<f64> {
        self.correct_latencies_ms()
            .into_iter()
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn latency_std_dev_ms(&self) -> Option<f64> {
        std_dev(&self.correct_latencies_ms())
    }

    /// Average response time after each correct answer, for the trend chart
    pub fn average_latency_series(&self) -> Vec<f64> {
        running_mean(&self.correct_latencies_ms())
    }

    /// Most recent attempts first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter().rev().take(n)
    }
}
