//! Subcommand implementations.
//!
//! Each command validates the configuration it needs before touching the
//! network, builds the Google collaborators, and hands them to a `*_with`
//! function that only sees the collaborator traits.

use crate::analysis::{answer_question, AnalysisOptions, NoteAggregator, ThemeAnalyzer};
use crate::cli::{AnalyzeThemesArgs, AskArgs, DownloadNotesArgs, ListEventsArgs, ReportFormat};
use crate::config::{Config, CONFIG_FILE_NAME};
use crate::dates::DateRange;
use crate::error::{AppError, ConfigError};
use crate::google::{
    GeminiClient, GoogleCalendarClient, GoogleDriveClient, OAuthCredentials, StaticToken,
};
use crate::models::{
    AnswerStatus, AttendanceStatus, CalendarEvent, CalendarInfo, MeetingNote, QuestionReport,
    ThemeReport,
};
use crate::notes::{DownloadSummary, NoteStore};
use crate::ports::{
    CalendarSource, CredentialProvider, DocumentSource, QuestionService, ReportContent,
    ReportSink, SummarizationService,
};
use crate::report::{self, FileReportSink};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Generate a default `.cadence.toml` in the working directory.
pub fn init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        return Err(AppError::Configuration(ConfigError::Invalid(format!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        )))
        .into());
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Set EMAIL, GOOGLE_CREDS_PATH and GEMINI_API_KEY, or edit the file.");
    Ok(())
}

fn credentials(config: &Config) -> Result<Arc<dyn CredentialProvider>> {
    if let Some(ref token) = config.google.access_token {
        debug!("Using access token from GOOGLE_ACCESS_TOKEN");
        return Ok(Arc::new(StaticToken::new(token.clone())));
    }

    let credentials_path = config
        .google
        .credentials_path
        .clone()
        .ok_or(ConfigError::MissingCredentialsPath)?;
    let token_path = config
        .token_path()
        .ok_or(ConfigError::MissingCredentialsPath)?;

    Ok(Arc::new(OAuthCredentials::new(
        credentials_path,
        token_path,
        config.google.scopes.clone(),
    )?))
}

fn calendar_client(config: &Config, credentials: Arc<dyn CredentialProvider>) -> Result<GoogleCalendarClient> {
    Ok(GoogleCalendarClient::new(
        credentials,
        config.google.calendar_id.clone(),
        config.google.page_size,
    )?)
}

fn configured_email(config: &Config) -> Result<&str> {
    Ok(config
        .general
        .email
        .as_deref()
        .ok_or(ConfigError::MissingEmail)?)
}

/// `list-calendars`
pub async fn list_calendars(config: &Config) -> Result<()> {
    config.validate_google()?;
    let client = calendar_client(config, credentials(config)?)?;

    let calendars = list_calendars_with(&client).await?;
    for calendar in &calendars {
        let marker = if calendar.primary { " (primary)" } else { "" };
        println!("{}: {}{}", calendar.summary, calendar.id, marker);
    }
    println!("\nTotal calendars: {}", calendars.len());
    Ok(())
}

pub async fn list_calendars_with(source: &dyn CalendarSource) -> Result<Vec<CalendarInfo>> {
    Ok(source
        .list_calendars()
        .await
        .context("Failed to list calendars")?)
}

/// `list-events`
pub async fn list_events(config: &Config, args: &ListEventsArgs) -> Result<()> {
    config.validate_google()?;
    let email = configured_email(config)?;
    let range = DateRange::last_months(Utc::now(), args.months)?;
    let client = calendar_client(config, credentials(config)?)?;

    println!("📅 Fetching events {}", range);
    let events = client
        .list_events(&range)
        .await
        .context("Failed to list events")?;

    let meetings = report::accepted_meetings(&events, email);
    for event in &meetings {
        println!("{}: {}", event.start.format("%Y-%m-%d %H:%M"), event.title);
    }

    let owned: Vec<CalendarEvent> = meetings.iter().map(|e| (*e).clone()).collect();
    FileReportSink::new(args.format)
        .write(ReportContent::Events(&owned), &args.output)
        .with_context(|| format!("Failed to write events to {}", args.output.display()))?;

    let stats = report::daily_stats(&meetings);
    let file = File::create(&args.stats_output)
        .with_context(|| format!("Failed to create {}", args.stats_output.display()))?;
    report::write_stats_csv(&stats, BufWriter::new(file))?;

    println!(
        "\n✅ {} meetings written to {}. Stats written to {}",
        meetings.len(),
        args.output.display(),
        args.stats_output.display()
    );
    Ok(())
}

/// `download-notes`
pub async fn download_notes(config: &Config, args: &DownloadNotesArgs) -> Result<()> {
    config.validate_google()?;
    let email = configured_email(config)?;
    let range = DateRange::last_days(Utc::now(), args.days)?;

    let credentials = credentials(config)?;
    let calendar = calendar_client(config, credentials.clone())?;
    let drive = GoogleDriveClient::new(credentials)?;
    let store = NoteStore::new(&args.output_dir);

    println!("📥 Downloading events and notes {}", range);
    let summary = download_with(&calendar, &drive, &store, email, &range).await?;

    println!("\n📊 Download Summary:");
    for status in AttendanceStatus::ALL {
        println!(
            "   {}: {} events, {} notes",
            status,
            summary.events_for(status),
            summary.notes_for(status)
        );
    }
    println!(
        "\n✅ {} events and {} notes saved under {}",
        summary.total_events(),
        summary.total_notes(),
        store.root().display()
    );
    Ok(())
}

/// Save every event in `range` under its attendance status, with its notes.
pub async fn download_with(
    calendar: &dyn CalendarSource,
    documents: &dyn DocumentSource,
    store: &NoteStore,
    email: &str,
    range: &DateRange,
) -> Result<DownloadSummary> {
    let events = calendar
        .list_events(range)
        .await
        .context("Failed to list events")?;
    info!("Found {} events", events.len());

    let mut summary = DownloadSummary::default();
    for event in &events {
        let status = event.attendance_for(email);
        let note = documents
            .fetch_notes_for(event)
            .await
            .with_context(|| format!("Failed to fetch notes for '{}'", event.title))?;

        let path = store
            .save_event(event, status, note.as_ref())
            .with_context(|| format!("Failed to save '{}'", event.title))?;
        debug!("{} -> {}", event.title, path.display());

        summary.record(status, note.is_some());
    }

    Ok(summary)
}

/// `analyze-themes`
pub async fn analyze_themes(
    config: &Config,
    args: &AnalyzeThemesArgs,
    show_progress: bool,
) -> Result<()> {
    config.validate_model()?;
    let profile = read_profile(config)?;
    let notes = load_notes(config, &args.input_dir)?;

    let service: Arc<dyn SummarizationService> = Arc::new(GeminiClient::new(&config.model, profile)?);
    println!("🤖 Analyzing with {}...", config.model.name);

    let report = analyze_with(config, notes, service, show_progress).await?;

    FileReportSink::new(args.format)
        .write(ReportContent::Themes(&report), &args.output)
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;

    print_summary(&report, args.format, &args.output);
    Ok(())
}

fn read_profile(config: &Config) -> Result<Option<String>> {
    match config.analysis.profile_path {
        Some(ref path) => Ok(Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile {}", path.display()))?,
        )),
        None => Ok(None),
    }
}

fn load_notes(config: &Config, input_dir: &Path) -> Result<Vec<MeetingNote>> {
    let store = NoteStore::new(input_dir);
    let notes = store.load_notes(config.analysis.days, Utc::now().date_naive())?;
    println!(
        "📚 Loaded {} meeting notes from the last {} days",
        notes.len(),
        config.analysis.days
    );
    Ok(notes)
}

/// `ask`
pub async fn ask(config: &Config, args: &AskArgs) -> Result<()> {
    config.validate_model()?;
    let profile = read_profile(config)?;
    let notes = load_notes(config, &args.input_dir)?;

    let client = GeminiClient::new(&config.model, profile)?;
    println!("🤖 Asking {}...", config.model.name);

    let report = ask_with(config, notes, &args.question, &client).await?;

    FileReportSink::new(args.format)
        .write(ReportContent::Answers(&report), &args.output)
        .with_context(|| format!("Failed to write answer to {}", args.output.display()))?;

    for answer in &report.answers {
        if let AnswerStatus::Answered { ref text } = answer.status {
            println!("\n{}", text);
        }
    }
    if report.metadata.batches_failed > 0 {
        println!(
            "\n⚠️  {} of {} batches could not be answered.",
            report.metadata.batches_failed, report.metadata.batches
        );
    }
    println!("\n✅ Answer saved to: {}", args.output.display());
    Ok(())
}

/// Answer `question` over `notes` with the configured batch budget.
pub async fn ask_with(
    config: &Config,
    notes: Vec<MeetingNote>,
    question: &str,
    service: &dyn QuestionService,
) -> Result<QuestionReport> {
    let aggregator = NoteAggregator::new(config.max_tokens_per_batch()?);
    Ok(answer_question(
        &aggregator,
        notes,
        question,
        service,
        &config.model.name,
        config.model.max_output_tokens,
    )
    .await
    .context("Failed to answer the question")?)
}

/// Run the theme pipeline over `notes` with the configured knobs.
pub async fn analyze_with(
    config: &Config,
    notes: Vec<MeetingNote>,
    service: Arc<dyn SummarizationService>,
    show_progress: bool,
) -> Result<ThemeReport> {
    let aggregator = NoteAggregator::new(config.max_tokens_per_batch()?);
    let options = AnalysisOptions {
        concurrency: config.general.concurrency,
        run_timeout: Some(Duration::from_secs(config.analysis.run_timeout_seconds)),
        max_output_tokens: config.model.max_output_tokens,
        show_progress,
    };

    Ok(ThemeAnalyzer::new(aggregator, service, options).run(notes).await)
}

fn print_summary(report: &ThemeReport, format: ReportFormat, output: &Path) {
    println!("\n📊 Analysis Summary:");
    println!("   Notes analyzed: {}", report.metadata.notes_analyzed);
    println!(
        "   Batches: {} ({} not completed)",
        report.metadata.batches, report.metadata.batches_failed
    );
    println!("   Themes: {}", report.findings.len());
    for finding in report.findings.iter().take(5) {
        println!(
            "   - {} ({} meetings)",
            finding.theme_label,
            finding.supporting_meetings.len()
        );
    }
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);

    if report.partial {
        println!("\n⚠️  Run timeout reached; the report covers completed batches only.");
    }
    println!(
        "\n✅ Analysis complete! {:?} report saved to: {}",
        format,
        output.display()
    );
}
