//! Playback history.
//!
//! Stores one record per played item as daily JSONL files in
//! ~/.podcast-streamer-history/.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error};

/// Record of a single played item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRecord {
    pub timestamp: String,
    pub queue: String,
    pub text: String,
    pub chars: usize,
    pub synth_ms: i64,
    pub success: bool,
}

impl PlaybackRecord {
    pub fn now(queue: &str, text: &str, synth_ms: i64, success: bool) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            queue: queue.to_string(),
            text: text.to_string(),
            chars: text.chars().count(),
            synth_ms,
            success,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackHistory {
    dir: PathBuf,
}

impl PlaybackHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// ~/.podcast-streamer-history, if a home directory exists.
    pub fn in_home() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".podcast-streamer-history")))
    }

    /// History file path for a date (`YYYY-MM-DD` or "today").
    fn file_for(&self, date: &str) -> PathBuf {
        let date_str = if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        };
        self.dir.join(format!("{date_str}.jsonl"))
    }

    /// Append a record to today's file. Failures are logged.
    pub fn append(&self, record: &PlaybackRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create history dir: {e}");
            return;
        }

        let path = self.file_for("today");
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize record: {e}");
                return;
            }
        };

        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{json}") {
                    error!("Failed to write history record: {e}");
                } else {
                    debug!("Saved playback record to {}", path.display());
                }
            }
            Err(e) => error!("Failed to open history file: {e}"),
        }
    }

    /// Load all records for a date, skipping malformed lines.
    pub fn load(&self, date: &str) -> Vec<PlaybackRecord> {
        let path = self.file_for(date);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };

        std::io::BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<PlaybackRecord>(line.trim()) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed history line: {e}");
                    None
                }
            })
            .collect()
    }
}
