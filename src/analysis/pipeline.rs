//! Batch execution against the summarization service.
//!
//! Batches run with bounded parallelism under one overall deadline. A failed
//! batch is recorded and skipped; when the deadline passes, whatever has
//! completed is merged and the report is flagged partial.

use crate::analysis::aggregator::{merge, normalize, NoteAggregator};
use crate::models::{
    Batch, BatchOutcome, BatchStatus, MeetingNote, ReportMetadata, ThemeFinding, ThemeReport,
};
use crate::ports::SummarizationService;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Knobs for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Maximum batches in flight at once.
    pub concurrency: usize,
    /// Overall deadline for all batches.
    pub run_timeout: Option<Duration>,
    /// Response budget passed to each summarization call.
    pub max_output_tokens: u32,
    pub show_progress: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_timeout: None,
            max_output_tokens: 2048,
            show_progress: false,
        }
    }
}

/// Runs normalize → batch → extract → merge once.
pub struct ThemeAnalyzer {
    aggregator: NoteAggregator,
    service: Arc<dyn SummarizationService>,
    options: AnalysisOptions,
}

impl ThemeAnalyzer {
    pub fn new(
        aggregator: NoteAggregator,
        service: Arc<dyn SummarizationService>,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            aggregator,
            service,
            options,
        }
    }

    /// Analyze `notes` and build the final report. Never fails: per-batch
    /// errors and the run timeout show up as batch outcomes.
    pub async fn run(&self, notes: Vec<MeetingNote>) -> ThemeReport {
        let started = Instant::now();
        let notes = normalize(notes);
        let batches: Vec<Batch> = self.aggregator.batch(&notes).collect();

        info!(
            "Analyzing {} notes in {} batches (budget {} tokens, concurrency {})",
            notes.len(),
            batches.len(),
            self.aggregator.max_tokens_per_batch(),
            self.options.concurrency
        );

        let (results, partial) = self.execute(&batches).await;

        let mut per_batch = Vec::new();
        let mut outcomes = Vec::with_capacity(batches.len());
        for (i, (batch, result)) in batches.iter().zip(results).enumerate() {
            let status = match result {
                Some(Ok(findings)) => {
                    let count = findings.len();
                    per_batch.push(findings);
                    BatchStatus::Completed { findings: count }
                }
                Some(Err(reason)) => BatchStatus::Failed { reason },
                None => BatchStatus::TimedOut,
            };
            outcomes.push(BatchOutcome {
                index: i + 1,
                documents: batch.documents.len(),
                approximate_tokens: batch.approximate_token_count,
                status,
            });
        }

        let findings = merge(per_batch);
        let batches_failed = outcomes.iter().filter(|o| !o.is_completed()).count();

        ThemeReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                model_used: self.service.model_name().to_string(),
                notes_analyzed: notes.len(),
                batches: batches.len(),
                batches_failed,
                duration_seconds: started.elapsed().as_secs_f64(),
            },
            findings,
            outcomes,
            partial,
        }
    }

    /// Extract themes for every batch. Slot `i` holds batch `i`'s result, or
    /// `None` if the deadline passed first. The flag is true on timeout.
    async fn execute(
        &self,
        batches: &[Batch],
    ) -> (Vec<Option<Result<Vec<ThemeFinding>, String>>>, bool) {
        let mut results: Vec<Option<Result<Vec<ThemeFinding>, String>>> = vec![None; batches.len()];
        let progress = self.progress_bar(batches.len() as u64);

        let mut pending = stream::iter(batches.iter().enumerate())
            .map(|(i, batch)| async move {
                debug!(
                    "Batch {} started: {} notes, ~{} tokens",
                    i + 1,
                    batch.documents.len(),
                    batch.approximate_token_count
                );
                if batch.has_truncated() {
                    debug!("Batch {} carries a truncated note", i + 1);
                }
                let result = self
                    .aggregator
                    .extract_themes(batch, self.service.as_ref(), self.options.max_output_tokens)
                    .await;
                (i, result)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        let deadline = self
            .options
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => pending.next().await,
            };

            let Some((i, result)) = next else {
                break;
            };

            match &result {
                Ok(findings) => debug!("Batch {} produced {} findings", i + 1, findings.len()),
                Err(e) => warn!("Batch {} failed: {}", i + 1, e),
            }
            results[i] = Some(result.map_err(|e| e.to_string()));
            progress.inc(1);
        }

        progress.finish_and_clear();

        if timed_out {
            let done = results.iter().filter(|r| r.is_some()).count();
            warn!(
                "Run timeout reached: {} of {} batches completed, reporting partial results",
                done,
                batches.len()
            );
        }

        (results, timed_out)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::{Confidence, MeetingRef};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn note(title: &str, day: u32, body: &str) -> MeetingNote {
        MeetingNote::new(
            title,
            NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            vec![],
            body,
        )
    }

    /// Returns one finding per meeting in the context, labelled by the first
    /// body word. Fails for contexts containing "FAIL" and stalls on "SLOW".
    struct ScriptedService;

    #[async_trait]
    impl SummarizationService for ScriptedService {
        async fn summarize(&self, text: &str, _max_output_tokens: u32) -> Result<Vec<ThemeFinding>> {
            if text.contains("FAIL") {
                return Err(AppError::AnalysisUnavailable("quota exceeded".to_string()));
            }
            if text.contains("SLOW") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }

            let mut findings = Vec::new();
            let mut lines = text.lines();
            while let Some(line) = lines.next() {
                let Some(title) = line
                    .strip_prefix("=== MEETING: ")
                    .and_then(|l| l.strip_suffix(" ==="))
                else {
                    continue;
                };
                let date = lines
                    .next()
                    .and_then(|l| l.strip_prefix("DATE: "))
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                    .unwrap();
                let body = lines.next().unwrap_or_default();
                let label = body.split_whitespace().next().unwrap_or("misc");
                findings.push(ThemeFinding {
                    theme_label: label.to_string(),
                    supporting_meetings: [MeetingRef {
                        date,
                        title: title.to_string(),
                    }]
                    .into_iter()
                    .collect(),
                    confidence: Confidence::Medium,
                });
            }
            Ok(findings)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn analyzer(budget: usize, run_timeout: Option<Duration>) -> ThemeAnalyzer {
        ThemeAnalyzer::new(
            NoteAggregator::new(budget),
            Arc::new(ScriptedService),
            AnalysisOptions {
                concurrency: 2,
                run_timeout,
                ..AnalysisOptions::default()
            },
        )
    }

    // Each body is ~10 tokens, so a budget of 12 gives one note per batch.
    fn padded(word: &str) -> String {
        format!("{} {}", word, "z".repeat(40 - word.len() - 1))
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported_not_fatal() {
        let notes = vec![
            note("Kickoff", 1, &padded("hiring")),
            note("Outage review", 2, &padded("FAIL")),
            note("Retro", 3, &padded("Hiring")),
        ];

        let report = analyzer(12, None).run(notes).await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].is_completed());
        assert!(matches!(
            &report.outcomes[1].status,
            BatchStatus::Failed { reason } if reason.contains("quota exceeded")
        ));
        assert!(report.outcomes[2].is_completed());
        assert!(!report.partial);

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].theme_label, "Hiring");
        assert_eq!(report.findings[0].supporting_meetings.len(), 2);
        assert_eq!(report.metadata.batches_failed, 1);
        assert_eq!(report.metadata.model_used, "scripted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_completed_batches() {
        let notes = vec![
            note("Standup", 1, &padded("velocity")),
            note("Planning", 2, &padded("SLOW")),
        ];

        let report = analyzer(12, Some(Duration::from_secs(5))).run(notes).await;

        assert!(report.partial);
        assert!(report.outcomes[0].is_completed());
        assert_eq!(report.outcomes[1].status, BatchStatus::TimedOut);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].theme_label, "velocity");
    }

    #[tokio::test]
    async fn test_oversized_note_does_not_fail_run() {
        let notes = vec![note("Offsite", 1, &"x".repeat(10_000))];

        let report = analyzer(100, None).run(notes).await;

        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].is_completed());
        assert!(report.outcomes[0].approximate_tokens <= 100);
        assert_eq!(report.metadata.notes_analyzed, 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_stable() {
        let notes = vec![
            note("A", 1, &padded("alpha")),
            note("B", 2, &padded("beta")),
            note("C", 3, &padded("Alpha")),
            note("D", 4, &padded("gamma")),
        ];

        let first = analyzer(12, None).run(notes.clone()).await;
        let second = analyzer(12, None).run(notes).await;
        assert_eq!(first.findings, second.findings);
        assert_eq!(first.findings[0].theme_label, "Alpha");
    }

    #[test]
    fn test_empty_input_produces_empty_report() {
        let report = tokio_test::block_on(analyzer(100, None).run(vec![]));
        assert!(report.findings.is_empty());
        assert!(report.outcomes.is_empty());
        assert!(!report.partial);
    }
}
