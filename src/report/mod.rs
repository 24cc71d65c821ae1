//! Report output.
//!
//! `generator` renders Markdown/JSON, `csv_export` the CSV files. The
//! `FileReportSink` picks between them by format and writes to disk.

pub mod csv_export;
pub mod generator;

pub use csv_export::{accepted_meetings, daily_stats, write_stats_csv};

use crate::cli::ReportFormat;
use crate::error::Result;
use crate::models::CalendarEvent;
use crate::ports::{ReportContent, ReportSink};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Writes reports to files in one format.
#[derive(Debug, Clone, Copy)]
pub struct FileReportSink {
    format: ReportFormat,
}

impl FileReportSink {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }
}

impl ReportSink for FileReportSink {
    fn write(&self, report: ReportContent<'_>, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = BufWriter::new(File::create(destination)?);

        match (report, self.format) {
            (ReportContent::Themes(themes), ReportFormat::Text) => {
                file.write_all(generator::generate_markdown_report(themes).as_bytes())?;
            }
            (ReportContent::Themes(themes), ReportFormat::Json) => {
                file.write_all(generator::generate_json_report(themes)?.as_bytes())?;
            }
            (ReportContent::Themes(themes), ReportFormat::Csv) => {
                csv_export::write_themes_csv(themes, &mut file)?;
            }
            (ReportContent::Events(events), ReportFormat::Text) => {
                file.write_all(generator::generate_events_text(events).as_bytes())?;
            }
            (ReportContent::Events(events), ReportFormat::Json) => {
                file.write_all(serde_json::to_string_pretty(events)?.as_bytes())?;
            }
            (ReportContent::Events(events), ReportFormat::Csv) => {
                let events: Vec<&CalendarEvent> = events.iter().collect();
                csv_export::write_events_csv(&events, &mut file)?;
            }
            (ReportContent::Answers(answers), ReportFormat::Text) => {
                file.write_all(generator::generate_answer_markdown(answers).as_bytes())?;
            }
            (ReportContent::Answers(answers), ReportFormat::Json) => {
                file.write_all(generator::generate_answer_json(answers)?.as_bytes())?;
            }
            (ReportContent::Answers(answers), ReportFormat::Csv) => {
                csv_export::write_answers_csv(answers, &mut file)?;
            }
        }

        file.flush()?;
        info!("Report written to: {}", destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerStatus, BatchAnswer, QuestionReport, ReportMetadata, ThemeReport};
    use chrono::Utc;

    fn empty_report() -> ThemeReport {
        ThemeReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                model_used: "m".to_string(),
                notes_analyzed: 0,
                batches: 0,
                batches_failed: 0,
                duration_seconds: 0.0,
            },
            findings: vec![],
            outcomes: vec![],
            partial: false,
        }
    }

    #[test]
    fn test_sink_writes_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let report = empty_report();

        for (format, name, needle) in [
            (ReportFormat::Text, "themes.md", "# Meeting Theme Analysis"),
            (ReportFormat::Json, "themes.json", "\"findings\""),
            (ReportFormat::Csv, "themes.csv", "Theme,Confidence"),
        ] {
            let path = dir.path().join("nested").join(name);
            FileReportSink::new(format)
                .write(ReportContent::Themes(&report), &path)
                .unwrap();
            assert!(std::fs::read_to_string(&path).unwrap().contains(needle));
        }
    }

    #[test]
    fn test_sink_writes_answers() {
        let dir = tempfile::tempdir().unwrap();
        let report = QuestionReport {
            metadata: empty_report().metadata,
            question: "What changed?".to_string(),
            answers: vec![BatchAnswer {
                index: 1,
                documents: 1,
                first_date: None,
                last_date: None,
                status: AnswerStatus::Answered {
                    text: "The roadmap.".to_string(),
                },
            }],
        };

        for (format, name, needle) in [
            (ReportFormat::Text, "answer.md", "The roadmap."),
            (ReportFormat::Json, "answer.json", "\"answered\""),
            (ReportFormat::Csv, "answer.csv", "Question,Batch"),
        ] {
            let path = dir.path().join(name);
            FileReportSink::new(format)
                .write(ReportContent::Answers(&report), &path)
                .unwrap();
            assert!(std::fs::read_to_string(&path).unwrap().contains(needle));
        }
    }

    #[test]
    fn test_sink_writes_events_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetings.csv");
        FileReportSink::new(ReportFormat::Csv)
            .write(ReportContent::Events(&[]), &path)
            .unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("Date^Summary^Duration"));
    }
}
