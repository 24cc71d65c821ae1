//! Data models.
//!
//! Meeting notes, batches and theme findings consumed by the aggregator, plus
//! the calendar types returned by the Google collaborators.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A meeting's note document, tagged with the meeting it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingNote {
    /// Meeting title.
    pub title: String,
    /// Day the meeting took place.
    pub date: NaiveDate,
    /// Attendees in calendar order.
    #[serde(default)]
    pub attendees: Vec<String>,
    /// Note text.
    pub body: String,
    /// Set when the body was cut to fit a single batch.
    #[serde(default)]
    pub truncated: bool,
}

impl MeetingNote {
    pub fn new(
        title: impl Into<String>,
        date: NaiveDate,
        attendees: Vec<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            date,
            attendees,
            body: body.into(),
            truncated: false,
        }
    }

    /// Reference to the meeting this note belongs to.
    pub fn meeting_ref(&self) -> MeetingRef {
        MeetingRef {
            date: self.date,
            title: self.title.clone(),
        }
    }
}

/// A group of notes sent together in one summarization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub documents: Vec<MeetingNote>,
    pub approximate_token_count: usize,
}

impl Batch {
    pub fn has_truncated(&self) -> bool {
        self.documents.iter().any(|d| d.truncated)
    }
}

/// Confidence attached to a theme finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

impl From<&str> for Confidence {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" | "med" | "moderate" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// A meeting identified by date and title.
///
/// Ordered by date first so the smallest element of a set is the earliest
/// meeting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeetingRef {
    pub date: NaiveDate,
    pub title: String,
}

impl fmt::Display for MeetingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.date.format("%Y-%m-%d"), self.title)
    }
}

/// A recurring theme and the meetings it was observed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeFinding {
    pub theme_label: String,
    pub supporting_meetings: BTreeSet<MeetingRef>,
    pub confidence: Confidence,
}

impl ThemeFinding {
    /// Date of the earliest supporting meeting, if any.
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.supporting_meetings.iter().next().map(|m| m.date)
    }
}

/// What happened to one batch during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    Completed { findings: usize },
    Failed { reason: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// 1-based batch number.
    pub index: usize,
    pub documents: usize,
    pub approximate_tokens: usize,
    #[serde(flatten)]
    pub status: BatchStatus,
}

impl BatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, BatchStatus::Completed { .. })
    }
}

/// Metadata about a theme report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
    pub notes_analyzed: usize,
    pub batches: usize,
    pub batches_failed: usize,
    pub duration_seconds: f64,
}

/// Merged theme findings plus per-batch outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeReport {
    pub metadata: ReportMetadata,
    pub findings: Vec<ThemeFinding>,
    pub outcomes: Vec<BatchOutcome>,
    /// True when the run timeout expired before every batch finished.
    pub partial: bool,
}

impl ThemeReport {
    pub fn failed_outcomes(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_completed())
    }
}

/// Result of asking the question against one batch of notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered { text: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnswer {
    /// 1-based batch number.
    pub index: usize,
    pub documents: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub status: AnswerStatus,
}

impl BatchAnswer {
    pub fn is_answered(&self) -> bool {
        matches!(self.status, AnswerStatus::Answered { .. })
    }
}

/// A free-form question and the answers drawn from each batch of notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReport {
    pub metadata: ReportMetadata,
    pub question: String,
    pub answers: Vec<BatchAnswer>,
}

/// A calendar visible to the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub primary: bool,
}

/// An attendee's reply to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
}

impl From<&str> for ResponseStatus {
    fn from(s: &str) -> Self {
        match s {
            "accepted" => ResponseStatus::Accepted,
            "declined" => ResponseStatus::Declined,
            "tentative" => ResponseStatus::Tentative,
            _ => ResponseStatus::NeedsAction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub response: ResponseStatus,
}

impl Attendee {
    /// Display name, falling back to the email address.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// A file attached to a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: Option<String>,
    pub title: String,
    pub mime_type: String,
}

/// Where a user stands with respect to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttendanceStatus {
    Attended,
    Rejected,
    Unacknowledged,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [
        AttendanceStatus::Attended,
        AttendanceStatus::Rejected,
        AttendanceStatus::Unacknowledged,
    ];

    /// Directory name used in the download layout.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AttendanceStatus::Attended => "attended",
            AttendanceStatus::Rejected => "rejected",
            AttendanceStatus::Unacknowledged => "unacknowledged",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Attended => write!(f, "Attended"),
            AttendanceStatus::Rejected => write!(f, "Rejected"),
            AttendanceStatus::Unacknowledged => write!(f, "Unacknowledged"),
        }
    }
}

/// A single calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// All-day events carry a date only; `start`/`end` are midnight UTC.
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl CalendarEvent {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Day the event starts on, in the event's own offset.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Names of attendees who accepted.
    pub fn accepted_attendees(&self) -> Vec<String> {
        self.attendees
            .iter()
            .filter(|a| a.response == ResponseStatus::Accepted)
            .map(|a| a.name().to_string())
            .collect()
    }

    /// Whether `email` is among the attendees who accepted.
    pub fn is_accepted_by(&self, email: &str) -> bool {
        self.attendees
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(email) && a.response == ResponseStatus::Accepted)
    }

    /// Attendance of `email`; users missing from the attendee list are unacknowledged.
    pub fn attendance_for(&self, email: &str) -> AttendanceStatus {
        match self
            .attendees
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .map(|a| a.response)
        {
            Some(ResponseStatus::Accepted) => AttendanceStatus::Attended,
            Some(ResponseStatus::Declined) => AttendanceStatus::Rejected,
            _ => AttendanceStatus::Unacknowledged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendee(email: &str, response: ResponseStatus) -> Attendee {
        Attendee {
            email: email.to_string(),
            display_name: None,
            response,
        }
    }

    fn event_with(attendees: Vec<Attendee>) -> CalendarEvent {
        let start = DateTime::parse_from_rfc3339("2024-03-04T10:00:00-05:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2024-03-04T11:30:00-05:00").unwrap();
        CalendarEvent {
            id: "evt1".to_string(),
            title: "Planning".to_string(),
            start,
            end,
            all_day: false,
            attendees,
            creator: None,
            attachments: vec![],
        }
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
    }

    #[test]
    fn test_confidence_from_str() {
        assert_eq!(Confidence::from("HIGH"), Confidence::High);
        assert_eq!(Confidence::from(" medium "), Confidence::Medium);
        assert_eq!(Confidence::from("unsure"), Confidence::Low);
    }

    #[test]
    fn test_meeting_ref_orders_by_date_first() {
        let early = MeetingRef {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            title: "Zebra".to_string(),
        };
        let late = MeetingRef {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            title: "Alpha".to_string(),
        };
        assert!(early < late);
    }

    #[test]
    fn test_attendance_for() {
        let event = event_with(vec![
            attendee("me@example.com", ResponseStatus::Declined),
            attendee("you@example.com", ResponseStatus::Accepted),
        ]);
        assert_eq!(event.attendance_for("ME@example.com"), AttendanceStatus::Rejected);
        assert_eq!(event.attendance_for("you@example.com"), AttendanceStatus::Attended);
        assert_eq!(
            event.attendance_for("nobody@example.com"),
            AttendanceStatus::Unacknowledged
        );
    }

    #[test]
    fn test_event_duration_and_date() {
        let event = event_with(vec![]);
        assert_eq!(event.duration(), chrono::Duration::minutes(90));
        assert_eq!(event.date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn test_accepted_attendees_use_display_name() {
        let mut named = attendee("a@example.com", ResponseStatus::Accepted);
        named.display_name = Some("Ada".to_string());
        let event = event_with(vec![
            named,
            attendee("b@example.com", ResponseStatus::Accepted),
            attendee("c@example.com", ResponseStatus::Tentative),
        ]);
        assert_eq!(event.accepted_attendees(), vec!["Ada", "b@example.com"]);
        assert!(event.is_accepted_by("b@example.com"));
        assert!(!event.is_accepted_by("c@example.com"));
    }
}
