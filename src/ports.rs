//! Collaborator interfaces.
//!
//! The aggregator and the commands only talk to the outside world through
//! these traits. Google-backed implementations live in `crate::google`, file
//! output in `crate::report`.

use crate::dates::DateRange;
use crate::error::Result;
use crate::models::{
    CalendarEvent, CalendarInfo, MeetingNote, QuestionReport, ThemeFinding, ThemeReport,
};
use async_trait::async_trait;
use std::path::Path;

/// Lists calendars and their events.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>>;

    /// All single (expanded) events in `range`, ordered by start time.
    async fn list_events(&self, range: &DateRange) -> Result<Vec<CalendarEvent>>;
}

/// Resolves and downloads the note document linked to an event.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// `Ok(None)` when the event has no linked note document.
    async fn fetch_notes_for(&self, event: &CalendarEvent) -> Result<Option<MeetingNote>>;
}

/// Extracts recurring themes from a block of meeting notes.
#[async_trait]
pub trait SummarizationService: Send + Sync {
    /// Fails with `AppError::AnalysisUnavailable` on network, auth or quota
    /// errors and on output that cannot be parsed.
    async fn summarize(&self, text: &str, max_output_tokens: u32) -> Result<Vec<ThemeFinding>>;

    fn model_name(&self) -> &str;
}

/// Answers a free-form question about a block of meeting notes.
#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Same failure contract as `SummarizationService::summarize`.
    async fn answer(&self, question: &str, text: &str, max_output_tokens: u32) -> Result<String>;
}

/// Supplies OAuth access tokens to the Google clients.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// What a report sink can write.
#[derive(Debug, Clone, Copy)]
pub enum ReportContent<'a> {
    Themes(&'a ThemeReport),
    Events(&'a [CalendarEvent]),
    Answers(&'a QuestionReport),
}

/// Serializes reports to disk.
pub trait ReportSink {
    fn write(&self, report: ReportContent<'_>, destination: &Path) -> Result<()>;
}
