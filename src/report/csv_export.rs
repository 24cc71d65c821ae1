//! CSV export for meetings, daily statistics, theme findings and answers.
//!
//! Meeting and statistics files use `^` as delimiter and `|` as quote so
//! titles and attendee lists with commas survive spreadsheet import.

use crate::dates::format_duration;
use crate::error::Result;
use crate::models::{AnswerStatus, BatchStatus, CalendarEvent, QuestionReport, ThemeReport};
use chrono::{Duration, NaiveDate};
use csv::{Writer, WriterBuilder};
use std::io::Write;

const MEETING_DELIMITER: u8 = b'^';
const MEETING_QUOTE: u8 = b'|';

fn meeting_writer<W: Write>(writer: W) -> Writer<W> {
    WriterBuilder::new()
        .delimiter(MEETING_DELIMITER)
        .quote(MEETING_QUOTE)
        .from_writer(writer)
}

/// Timed events with more than one attendee that `email` accepted.
pub fn accepted_meetings<'a>(events: &'a [CalendarEvent], email: &str) -> Vec<&'a CalendarEvent> {
    events
        .iter()
        .filter(|e| !e.all_day && e.attendees.len() > 1 && e.is_accepted_by(email))
        .collect()
}

/// Meeting time and count for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub time: Duration,
    pub count: usize,
}

/// Per-day totals, in order of first appearance.
pub fn daily_stats(events: &[&CalendarEvent]) -> Vec<DailyStats> {
    let mut stats: Vec<DailyStats> = Vec::new();

    for event in events {
        match stats.last_mut() {
            Some(day) if day.date == event.date() => {
                day.time = day.time + event.duration();
                day.count += 1;
            }
            _ => stats.push(DailyStats {
                date: event.date(),
                time: event.duration(),
                count: 1,
            }),
        }
    }

    stats
}

/// Write the meeting listing.
pub fn write_events_csv<W: Write>(events: &[&CalendarEvent], writer: W) -> Result<()> {
    let mut wtr = meeting_writer(writer);
    wtr.write_record([
        "Date",
        "Summary",
        "Duration",
        "Creator",
        "Accepted Count",
        "Accepted Attendees",
    ])?;

    for event in events {
        let accepted = event.accepted_attendees();
        wtr.write_record([
            event.date().format("%Y-%m-%d").to_string(),
            event.title.clone(),
            format_duration(event.duration()),
            event.creator.clone().unwrap_or_default(),
            accepted.len().to_string(),
            accepted.join(", "),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write per-day statistics followed by an `Averages` row.
pub fn write_stats_csv<W: Write>(stats: &[DailyStats], writer: W) -> Result<()> {
    let mut wtr = meeting_writer(writer);
    wtr.write_record(["Date", "Cumulative Time", "Meeting Count"])?;

    for day in stats {
        wtr.write_record([
            day.date.format("%Y-%m-%d").to_string(),
            format_duration(day.time),
            day.count.to_string(),
        ])?;
    }

    if !stats.is_empty() {
        let days = stats.len() as i64;
        let total_time: i64 = stats.iter().map(|d| d.time.num_seconds()).sum();
        let total_count: usize = stats.iter().map(|d| d.count).sum();
        wtr.write_record([
            "Averages".to_string(),
            format_duration(Duration::seconds(total_time / days)),
            format!("{:.2}", total_count as f64 / days as f64),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// One row per merged theme, then a marker row per unfinished batch and a
/// `Partial` row when the run timed out.
pub fn write_themes_csv<W: Write>(report: &ThemeReport, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record([
        "Theme",
        "Confidence",
        "Meeting Count",
        "First Seen",
        "Supporting Meetings",
    ])?;

    for finding in &report.findings {
        let meetings: Vec<String> = finding
            .supporting_meetings
            .iter()
            .map(|m| m.to_string())
            .collect();
        wtr.write_record([
            finding.theme_label.clone(),
            finding.confidence.to_string(),
            meetings.len().to_string(),
            finding
                .earliest_date()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            meetings.join("; "),
        ])?;
    }

    for outcome in report.failed_outcomes() {
        let status = match outcome.status {
            BatchStatus::Failed { ref reason } => format!("FAILED: {}", reason),
            BatchStatus::TimedOut => "TIMED OUT".to_string(),
            BatchStatus::Completed { .. } => continue,
        };
        wtr.write_record([
            format!("Batch {}", outcome.index),
            status,
            String::new(),
            String::new(),
            String::new(),
        ])?;
    }

    if report.partial {
        wtr.write_record([
            "Partial",
            "run timeout reached; themes cover completed batches only",
            "",
            "",
            "",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// One row per batch the question was asked against.
pub fn write_answers_csv<W: Write>(report: &QuestionReport, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["Question", "Batch", "Notes", "First Date", "Last Date", "Status", "Answer"])?;

    let date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
    for answer in &report.answers {
        let (status, text) = match answer.status {
            AnswerStatus::Answered { ref text } => ("answered".to_string(), text.clone()),
            AnswerStatus::Failed { ref reason } => (format!("FAILED: {}", reason), String::new()),
        };
        wtr.write_record([
            report.question.clone(),
            answer.index.to_string(),
            answer.documents.to_string(),
            date(answer.first_date),
            date(answer.last_date),
            status,
            text,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Attendee, BatchAnswer, BatchOutcome, Confidence, MeetingRef, ReportMetadata,
        ResponseStatus, ThemeFinding,
    };
    use chrono::DateTime;

    fn attendee(email: &str, name: Option<&str>, response: ResponseStatus) -> Attendee {
        Attendee {
            email: email.to_string(),
            display_name: name.map(String::from),
            response,
        }
    }

    fn event(title: &str, start: &str, minutes: i64, attendees: Vec<Attendee>) -> CalendarEvent {
        let start = DateTime::parse_from_rfc3339(start).unwrap();
        CalendarEvent {
            id: title.to_string(),
            title: title.to_string(),
            start,
            end: start + Duration::minutes(minutes),
            all_day: false,
            attendees,
            creator: Some("Boss".to_string()),
            attachments: vec![],
        }
    }

    fn sample() -> Vec<CalendarEvent> {
        let me = || attendee("me@example.com", Some("Me"), ResponseStatus::Accepted);
        vec![
            event(
                "Sync, weekly",
                "2024-06-03T09:00:00+00:00",
                30,
                vec![me(), attendee("ana@example.com", Some("Ana"), ResponseStatus::Accepted)],
            ),
            event(
                "Design",
                "2024-06-03T14:00:00+00:00",
                60,
                vec![me(), attendee("bob@example.com", None, ResponseStatus::Declined)],
            ),
            event("Focus time", "2024-06-04T09:00:00+00:00", 120, vec![me()]),
            event(
                "Declined",
                "2024-06-04T11:00:00+00:00",
                30,
                vec![
                    attendee("me@example.com", None, ResponseStatus::Declined),
                    attendee("ana@example.com", None, ResponseStatus::Accepted),
                ],
            ),
            event(
                "Retro",
                "2024-06-05T16:00:00+00:00",
                45,
                vec![me(), attendee("ana@example.com", None, ResponseStatus::Accepted)],
            ),
        ]
    }

    #[test]
    fn test_accepted_meetings_filter() {
        let events = sample();
        let accepted = accepted_meetings(&events, "ME@example.com");
        let titles: Vec<_> = accepted.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Sync, weekly", "Design", "Retro"]);
    }

    #[test]
    fn test_events_csv_uses_caret_delimiter() {
        let events = sample();
        let accepted = accepted_meetings(&events, "me@example.com");
        let mut out = Vec::new();
        write_events_csv(&accepted, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Date^Summary^Duration^Creator^Accepted Count^Accepted Attendees"
        );
        assert_eq!(lines[1], "2024-06-03^Sync, weekly^0:30:00^Boss^2^Me, Ana");
        assert_eq!(lines[2], "2024-06-03^Design^1:00:00^Boss^1^Me");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_daily_stats_and_averages() {
        let events = sample();
        let accepted = accepted_meetings(&events, "me@example.com");
        let stats = daily_stats(&accepted);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].time, Duration::minutes(90));
        assert_eq!(stats[0].count, 2);

        let mut out = Vec::new();
        write_stats_csv(&stats, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "Date^Cumulative Time^Meeting Count");
        assert_eq!(lines[1], "2024-06-03^1:30:00^2");
        assert_eq!(lines[2], "2024-06-05^0:45:00^1");
        assert_eq!(lines[3], "Averages^1:07:30^1.50");
    }

    #[test]
    fn test_stats_without_meetings_has_no_averages() {
        let mut out = Vec::new();
        write_stats_csv(&[], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_field_with_delimiter_is_quoted() {
        let events = vec![event(
            "Q3 ^ planning",
            "2024-06-03T09:00:00+00:00",
            30,
            vec![
                attendee("me@example.com", None, ResponseStatus::Accepted),
                attendee("ana@example.com", None, ResponseStatus::Accepted),
            ],
        )];
        let accepted = accepted_meetings(&events, "me@example.com");
        let mut out = Vec::new();
        write_events_csv(&accepted, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("|Q3 ^ planning|"));
    }

    fn theme_report(outcomes: Vec<BatchOutcome>, partial: bool) -> ThemeReport {
        ThemeReport {
            metadata: ReportMetadata {
                generated_at: chrono::Utc::now(),
                model_used: "test-model".to_string(),
                notes_analyzed: 4,
                batches: outcomes.len(),
                batches_failed: outcomes.iter().filter(|o| !o.is_completed()).count(),
                duration_seconds: 1.0,
            },
            findings: vec![ThemeFinding {
                theme_label: "Hiring, pipeline".to_string(),
                supporting_meetings: [MeetingRef {
                    date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                    title: "Staff sync".to_string(),
                }]
                .into_iter()
                .collect(),
                confidence: Confidence::High,
            }],
            outcomes,
            partial,
        }
    }

    fn outcome(index: usize, status: BatchStatus) -> BatchOutcome {
        BatchOutcome {
            index,
            documents: 1,
            approximate_tokens: 100,
            status,
        }
    }

    #[test]
    fn test_themes_csv_marks_unfinished_batches() {
        let report = theme_report(
            vec![
                outcome(1, BatchStatus::Completed { findings: 1 }),
                outcome(
                    2,
                    BatchStatus::Failed {
                        reason: "quota exceeded".to_string(),
                    },
                ),
                outcome(3, BatchStatus::TimedOut),
            ],
            true,
        );

        let mut buf = Vec::new();
        write_themes_csv(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Theme,Confidence,Meeting Count,First Seen,Supporting Meetings"
        );
        assert_eq!(lines[1], "\"Hiring, pipeline\",high,1,2024-06-03,2024-06-03: Staff sync");
        assert_eq!(lines[2], "Batch 2,FAILED: quota exceeded,,,");
        assert_eq!(lines[3], "Batch 3,TIMED OUT,,,");
        assert!(lines[4].starts_with("Partial,"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_themes_csv_without_failures_has_no_markers() {
        let report = theme_report(vec![outcome(1, BatchStatus::Completed { findings: 1 })], false);

        let mut buf = Vec::new();
        write_themes_csv(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains("FAILED"));
        assert!(!text.contains("Partial"));
    }

    #[test]
    fn test_answers_csv_rows() {
        let report = QuestionReport {
            metadata: theme_report(vec![], false).metadata,
            question: "Who owns launch?".to_string(),
            answers: vec![
                BatchAnswer {
                    index: 1,
                    documents: 2,
                    first_date: NaiveDate::from_ymd_opt(2024, 6, 3),
                    last_date: NaiveDate::from_ymd_opt(2024, 6, 4),
                    status: AnswerStatus::Answered {
                        text: "Dana, then Lee.".to_string(),
                    },
                },
                BatchAnswer {
                    index: 2,
                    documents: 1,
                    first_date: None,
                    last_date: None,
                    status: AnswerStatus::Failed {
                        reason: "quota exceeded".to_string(),
                    },
                },
            ],
        };

        let mut buf = Vec::new();
        write_answers_csv(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Question,Batch,Notes,First Date,Last Date,Status,Answer");
        assert_eq!(
            lines[1],
            "Who owns launch?,1,2,2024-06-03,2024-06-04,answered,\"Dana, then Lee.\""
        );
        assert_eq!(lines[2], "Who owns launch?,2,1,,,FAILED: quota exceeded,");
    }
}
