//! Markdown and JSON rendering of theme reports, question answers and event
//! listings.

use crate::dates::format_duration;
use crate::error::Result;
use crate::models::{
    AnswerStatus, BatchAnswer, BatchStatus, CalendarEvent, QuestionReport, ReportMetadata,
    ThemeFinding, ThemeReport,
};

/// Generate a complete Markdown theme report.
pub fn generate_markdown_report(report: &ThemeReport) -> String {
    let mut output = String::new();

    output.push_str("# Meeting Theme Analysis\n\n");

    if report.partial {
        output.push_str(
            "> **Partial report:** the run timeout was reached before every batch \
             finished. Themes below cover completed batches only.\n\n",
        );
    }

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_themes_section(&report.findings));
    output.push_str(&generate_batches_section(report));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Notes Analyzed:** {}\n", metadata.notes_analyzed));
    section.push_str(&format!("- **Batches:** {}\n", metadata.batches));
    if metadata.batches_failed > 0 {
        section.push_str(&format!(
            "- **Batches Not Completed:** {}\n",
            metadata.batches_failed
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_themes_section(findings: &[ThemeFinding]) -> String {
    let mut section = String::new();

    section.push_str("## Recurring Themes\n\n");

    if findings.is_empty() {
        section.push_str("No themes were identified in the analyzed notes.\n\n");
        return section;
    }

    section.push_str("| Theme | Meetings | Confidence | First Seen |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for finding in findings {
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            finding.theme_label.replace('|', "\\|"),
            finding.supporting_meetings.len(),
            finding.confidence,
            finding
                .earliest_date()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    section.push('\n');

    for (i, finding) in findings.iter().enumerate() {
        section.push_str(&generate_finding_block(i + 1, finding));
    }

    section
}

/// Generate a single theme block.
fn generate_finding_block(rank: usize, finding: &ThemeFinding) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {}. {} ({} confidence)\n\n",
        rank, finding.theme_label, finding.confidence
    ));

    if finding.supporting_meetings.is_empty() {
        block.push_str("*No supporting meetings could be matched to the notes.*\n\n");
        return block;
    }

    for meeting in &finding.supporting_meetings {
        block.push_str(&format!("- {}\n", meeting));
    }
    block.push('\n');

    block
}

/// Failed and timed-out batches, if any.
fn generate_batches_section(report: &ThemeReport) -> String {
    let mut section = String::new();

    let unfinished: Vec<_> = report.failed_outcomes().collect();
    if unfinished.is_empty() {
        return section;
    }

    section.push_str("## Incomplete Batches\n\n");
    section.push_str("| Batch | Notes | ~Tokens | Status |\n");
    section.push_str("|:---:|:---:|:---:|:---|\n");
    for outcome in unfinished {
        let status = match outcome.status {
            BatchStatus::Failed { ref reason } => format!("FAILED: {}", reason.replace('|', "\\|")),
            BatchStatus::TimedOut => "TIMED OUT".to_string(),
            BatchStatus::Completed { .. } => continue,
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            outcome.index, outcome.documents, outcome.approximate_tokens, status
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by cadence*\n".to_string()
}

/// Generate a JSON theme report.
pub fn generate_json_report(report: &ThemeReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Markdown answer to a question, one section per batch when notes were split.
pub fn generate_answer_markdown(report: &QuestionReport) -> String {
    let mut output = String::new();

    output.push_str("# Meeting Notes Q&A\n\n");
    output.push_str(&format!("> {}\n\n", report.question.replace('\n', "\n> ")));
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str("## Answer\n\n");

    let single = report.answers.len() == 1;
    for answer in &report.answers {
        if !single {
            output.push_str(&format!("### {}\n\n", answer_heading(answer)));
        }
        match answer.status {
            AnswerStatus::Answered { ref text } => output.push_str(text.trim()),
            AnswerStatus::Failed { ref reason } => {
                output.push_str(&format!("*FAILED: {}*", reason))
            }
        }
        output.push_str("\n\n");
    }

    output.push_str(&generate_footer());
    output
}

fn answer_heading(answer: &BatchAnswer) -> String {
    let notes = if answer.documents == 1 { "note" } else { "notes" };
    match (answer.first_date, answer.last_date) {
        (Some(first), Some(last)) if first != last => format!(
            "Batch {}: {} {}, {} to {}",
            answer.index, answer.documents, notes, first, last
        ),
        (Some(first), _) => format!(
            "Batch {}: {} {}, {}",
            answer.index, answer.documents, notes, first
        ),
        _ => format!("Batch {}: {} {}", answer.index, answer.documents, notes),
    }
}

/// Generate a JSON question report.
pub fn generate_answer_json(report: &QuestionReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Plain-text event listing, one line per event.
pub fn generate_events_text(events: &[CalendarEvent]) -> String {
    let mut output = String::new();

    for event in events {
        output.push_str(&format!(
            "{}  {:>8}  {}",
            event.start.format("%Y-%m-%d %H:%M"),
            format_duration(event.duration()),
            event.title
        ));
        let accepted = event.accepted_attendees();
        if !accepted.is_empty() {
            output.push_str(&format!("  ({})", accepted.join(", ")));
        }
        output.push('\n');
    }
    output.push_str(&format!("\n{} events\n", events.len()));

    output
}
