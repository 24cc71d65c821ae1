//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Cadence - calendar and meeting-note insights
///
/// Export calendar events, download meeting notes, and summarize recurring
/// themes across meetings with Gemini.
///
/// Examples:
///   cadence list-calendars
///   cadence list-events --months 3 --output meetings.csv
///   cadence download-notes --days 30 --output-dir calendar_events
///   cadence analyze-themes --input-dir calendar_events --output themes.md
///   cadence ask "What did we decide about pricing?" --output pricing.md
///   cadence init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .cadence.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List all calendars available to the configured account
    ListCalendars,

    /// Export accepted meetings to CSV along with daily statistics
    ListEvents(ListEventsArgs),

    /// Save events and their meeting notes, organized by attendance and date
    DownloadNotes(DownloadNotesArgs),

    /// Summarize recurring themes across downloaded meeting notes
    AnalyzeThemes(AnalyzeThemesArgs),

    /// Ask a question about downloaded meeting notes
    Ask(AskArgs),

    /// Generate a default .cadence.toml configuration file
    InitConfig,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListEventsArgs {
    /// Number of months to look back, counting the current month
    #[arg(long, default_value = "3", value_name = "N")]
    pub months: u32,

    /// Output file for the events
    #[arg(short, long, default_value = "meetings.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// Output file for the daily statistics (CSV)
    #[arg(long, default_value = "stats.csv", value_name = "FILE")]
    pub stats_output: PathBuf,

    /// Output format for the events file
    #[arg(long, default_value = "csv", value_name = "FORMAT")]
    pub format: ReportFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DownloadNotesArgs {
    /// Number of days to look back from today
    #[arg(long, default_value = "30", value_name = "N")]
    pub days: u32,

    /// Base directory for saved events and notes
    #[arg(long, default_value = "calendar_events", value_name = "DIR")]
    pub output_dir: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnalyzeThemesArgs {
    /// Directory produced by download-notes
    #[arg(long, default_value = "calendar_events", value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Output file for the theme report
    #[arg(short, long, default_value = "theme_report.md", value_name = "FILE")]
    pub output: PathBuf,

    /// Output format (text, csv, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// Number of days of notes to include (default: from config or 30)
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Gemini model to use
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// File describing you and your role, added to the prompt
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Token budget per batch (default: derived from the model context window)
    #[arg(long, value_name = "TOKENS")]
    pub max_batch_tokens: Option<usize>,

    /// Number of batches analyzed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Overall run timeout in seconds; completed batches are still reported
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AskArgs {
    /// Question to answer from the notes
    #[arg(value_name = "QUESTION")]
    pub question: String,

    /// Directory produced by download-notes
    #[arg(long, default_value = "calendar_events", value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Output file for the answer
    #[arg(short, long, default_value = "answer.md", value_name = "FILE")]
    pub output: PathBuf,

    /// Output format (text, csv, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// Number of days of notes to include (default: from config or 30)
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Gemini model to use
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// File describing you and your role, added to the prompt
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Token budget per batch (default: derived from the model context window)
    #[arg(long, value_name = "TOKENS")]
    pub max_batch_tokens: Option<usize>,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    /// Plain text / Markdown (default)
    #[default]
    Text,
    /// CSV
    Csv,
    /// JSON
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::ListEvents(list) => {
                if list.months == 0 {
                    return Err("Months must be at least 1".to_string());
                }
                if list.output == list.stats_output {
                    return Err("--output and --stats-output must be different files".to_string());
                }
            }
            Command::AnalyzeThemes(analyze) => {
                if analyze.concurrency == Some(0) {
                    return Err("Concurrency must be at least 1".to_string());
                }
                if analyze.timeout == Some(0) {
                    return Err("Timeout must be at least 1 second".to_string());
                }
                if analyze.max_batch_tokens == Some(0) {
                    return Err("Max batch tokens must be at least 1".to_string());
                }
                if !analyze.input_dir.is_dir() {
                    return Err(format!(
                        "Input directory does not exist: {}",
                        analyze.input_dir.display()
                    ));
                }
                if let Some(ref profile) = analyze.profile {
                    if !profile.is_file() {
                        return Err(format!("Profile file not found: {}", profile.display()));
                    }
                }
            }
            Command::Ask(ask) => {
                if ask.question.trim().is_empty() {
                    return Err("Question must not be empty".to_string());
                }
                if ask.max_batch_tokens == Some(0) {
                    return Err("Max batch tokens must be at least 1".to_string());
                }
                if !ask.input_dir.is_dir() {
                    return Err(format!(
                        "Input directory does not exist: {}",
                        ask.input_dir.display()
                    ));
                }
                if let Some(ref profile) = ask.profile {
                    if !profile.is_file() {
                        return Err(format!("Profile file not found: {}", profile.display()));
                    }
                }
            }
            Command::ListCalendars | Command::DownloadNotes(_) | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("cadence").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_list_events_defaults() {
        let args = parse(&["list-events"]);
        match args.command {
            Command::ListEvents(list) => {
                assert_eq!(list.months, 3);
                assert_eq!(list.output, PathBuf::from("meetings.csv"));
                assert_eq!(list.stats_output, PathBuf::from("stats.csv"));
                assert_eq!(list.format, ReportFormat::Csv);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_download_notes_flags() {
        let args = parse(&["download-notes", "--days", "7", "--output-dir", "out"]);
        match args.command {
            Command::DownloadNotes(download) => {
                assert_eq!(download.days, 7);
                assert_eq!(download.output_dir, PathBuf::from("out"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["list-calendars", "--verbose"]);
        assert!(args.verbose);
        assert!(matches!(args.command, Command::ListCalendars));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["list-calendars", "-v", "-q"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_months() {
        let args = parse(&["list-events", "--months", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_analyze_themes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_str().unwrap();

        let ok = parse(&["analyze-themes", "--input-dir", input]);
        assert!(ok.validate().is_ok());

        let zero = parse(&["analyze-themes", "--input-dir", input, "--concurrency", "0"]);
        assert!(zero.validate().is_err());

        let missing = parse(&["analyze-themes", "--input-dir", "/no/such/dir"]);
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_ask_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_str().unwrap();

        let args = parse(&["ask", "Who owns launch?", "--input-dir", input, "--days", "14"]);
        match args.command {
            Command::Ask(ref ask) => {
                assert_eq!(ask.question, "Who owns launch?");
                assert_eq!(ask.days, Some(14));
                assert_eq!(ask.output, PathBuf::from("answer.md"));
                assert_eq!(ask.format, ReportFormat::Text);
            }
            ref other => panic!("unexpected command: {:?}", other),
        }
        assert!(args.validate().is_ok());

        let blank = parse(&["ask", "   ", "--input-dir", input]);
        assert!(blank.validate().is_err());

        assert!(Args::try_parse_from(["cadence", "ask"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["list-calendars"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
