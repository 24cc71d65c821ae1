//! On-disk layout for downloaded events and meeting notes.
//!
//! ```text
//! <root>/<attended|rejected|unacknowledged>/<YYYY-MM-DD>/<title>.json
//! <root>/<attended|rejected|unacknowledged>/<YYYY-MM-DD>/<title>.note.json
//! ```
//!
//! `analyze-themes` reads notes back from the `attended` tree. Plain `.txt`
//! exports named `... - Notes by Gemini.txt` dropped into a date directory
//! are picked up as well.

use crate::error::{AppError, ConfigError, Result};
use crate::models::{AttendanceStatus, CalendarEvent, MeetingNote};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Suffix Google gives generated note documents.
pub const NOTES_TITLE_SUFFIX: &str = " - Notes by Gemini";

const MAX_FILENAME_CHARS: usize = 200;
const EVENT_EXTENSION: &str = "json";
const NOTE_EXTENSION: &str = "note.json";

/// Make a string safe to use as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            '\n' | '\r' | '\t' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    let trimmed = replaced.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Events and notes written per attendance status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub events: BTreeMap<AttendanceStatus, usize>,
    pub notes: BTreeMap<AttendanceStatus, usize>,
}

impl DownloadSummary {
    pub fn record(&mut self, status: AttendanceStatus, with_note: bool) {
        *self.events.entry(status).or_default() += 1;
        if with_note {
            *self.notes.entry(status).or_default() += 1;
        }
    }

    pub fn events_for(&self, status: AttendanceStatus) -> usize {
        self.events.get(&status).copied().unwrap_or(0)
    }

    pub fn notes_for(&self, status: AttendanceStatus) -> usize {
        self.notes.get(&status).copied().unwrap_or(0)
    }

    pub fn total_events(&self) -> usize {
        self.events.values().sum()
    }

    pub fn total_notes(&self) -> usize {
        self.notes.values().sum()
    }
}

/// Root directory holding downloaded events and notes.
pub struct NoteStore {
    root: PathBuf,
}

impl NoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_dir(&self, status: AttendanceStatus, date: NaiveDate) -> PathBuf {
        self.root
            .join(status.dir_name())
            .join(date.format("%Y-%m-%d").to_string())
    }

    /// Save an event and, if present, its note. Returns the event file path.
    pub fn save_event(
        &self,
        event: &CalendarEvent,
        status: AttendanceStatus,
        note: Option<&MeetingNote>,
    ) -> Result<PathBuf> {
        let dir = self.day_dir(status, event.date());
        fs::create_dir_all(&dir)?;

        let stem = unique_stem(&dir, &sanitize_filename(&event.title));
        let event_path = dir.join(format!("{}.{}", stem, EVENT_EXTENSION));
        fs::write(&event_path, serde_json::to_string_pretty(event)?)?;
        debug!("Saved event to {}", event_path.display());

        if let Some(note) = note {
            let note_path = dir.join(format!("{}.{}", stem, NOTE_EXTENSION));
            fs::write(&note_path, serde_json::to_string_pretty(note)?)?;
            debug!("Saved note to {}", note_path.display());
        }

        Ok(event_path)
    }

    /// Load notes of attended meetings from the last `days` days up to `today`.
    pub fn load_notes(&self, days: u32, today: NaiveDate) -> Result<Vec<MeetingNote>> {
        let attended = self.root.join(AttendanceStatus::Attended.dir_name());
        if !attended.is_dir() {
            return Err(AppError::Notes(format!(
                "Attended meetings directory not found: {}. Run download-notes first.",
                attended.display()
            )));
        }

        let cutoff = today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| ConfigError::Invalid(format!("cannot go back {} days", days)))?;
        let mut notes = Vec::new();

        let walker = WalkDir::new(&attended)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(date) = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .and_then(|n| NaiveDate::parse_from_str(n, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if date < cutoff || date > today {
                continue;
            }

            match read_note(path, date) {
                Ok(Some(note)) => notes.push(note),
                Ok(None) => {}
                Err(e) => warn!("Could not read {}: {}", path.display(), e),
            }
        }

        if notes.is_empty() {
            return Err(AppError::Notes(format!(
                "No meeting notes found in {} for the last {} days",
                attended.display(),
                days
            )));
        }

        debug!("Loaded {} notes from {}", notes.len(), attended.display());
        Ok(notes)
    }
}

/// First `stem`, `stem_1`, `stem_2`... whose event file does not exist yet.
fn unique_stem(dir: &Path, stem: &str) -> String {
    let taken = |candidate: &str| dir.join(format!("{}.{}", candidate, EVENT_EXTENSION)).exists();

    if !taken(stem) {
        return stem.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", stem, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| stem.to_string())
}

fn read_note(path: &Path, date: NaiveDate) -> Result<Option<MeetingNote>> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    if name.ends_with(&format!(".{}", NOTE_EXTENSION)) {
        let note: MeetingNote = serde_json::from_str(&fs::read_to_string(path)?)?;
        return Ok(Some(note));
    }

    if path.extension().and_then(|e| e.to_str()) == Some("txt") {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if !stem.contains(NOTES_TITLE_SUFFIX) {
            return Ok(None);
        }
        let body = fs::read_to_string(path)?;
        let title = stem.replace(NOTES_TITLE_SUFFIX, "").replace('_', " ");
        return Ok(Some(MeetingNote::new(title, date, vec![], body)));
    }

    Ok(None)
}
