//! Free-form questions over meeting notes.
//!
//! Notes are normalized and batched exactly like theme analysis; the question
//! is asked once per batch, in order. A failed batch is recorded, and the run
//! only fails when no batch produced an answer.

use crate::analysis::aggregator::{normalize, render_batch, NoteAggregator};
use crate::error::{AppError, Result};
use crate::models::{AnswerStatus, Batch, BatchAnswer, MeetingNote, QuestionReport, ReportMetadata};
use crate::ports::QuestionService;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Ask `question` against every batch of `notes`.
pub async fn answer_question(
    aggregator: &NoteAggregator,
    notes: Vec<MeetingNote>,
    question: &str,
    service: &dyn QuestionService,
    model: &str,
    max_output_tokens: u32,
) -> Result<QuestionReport> {
    let started = Instant::now();
    let notes = normalize(notes);
    let batches: Vec<Batch> = aggregator.batch(&notes).collect();
    if batches.is_empty() {
        return Err(AppError::Notes("No meeting notes to ask about".to_string()));
    }

    info!(
        "Asking over {} notes in {} batches (budget {} tokens)",
        notes.len(),
        batches.len(),
        aggregator.max_tokens_per_batch()
    );

    let mut answers = Vec::with_capacity(batches.len());
    for (i, batch) in batches.iter().enumerate() {
        let status = match service
            .answer(question, &render_batch(batch), max_output_tokens)
            .await
        {
            Ok(text) => {
                debug!("Batch {} answered ({} chars)", i + 1, text.len());
                AnswerStatus::Answered { text }
            }
            Err(e) => {
                warn!("Batch {} failed: {}", i + 1, e);
                AnswerStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        answers.push(BatchAnswer {
            index: i + 1,
            documents: batch.documents.len(),
            first_date: batch.documents.iter().map(|d| d.date).min(),
            last_date: batch.documents.iter().map(|d| d.date).max(),
            status,
        });
    }

    let failed = answers.iter().filter(|a| !a.is_answered()).count();
    if failed == answers.len() {
        let reason = match answers[0].status {
            AnswerStatus::Failed { ref reason } => reason.clone(),
            AnswerStatus::Answered { .. } => String::new(),
        };
        return Err(AppError::AnalysisUnavailable(format!(
            "no batch could be answered; first failure: {}",
            reason
        )));
    }

    Ok(QuestionReport {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            model_used: model.to_string(),
            notes_analyzed: notes.len(),
            batches: answers.len(),
            batches_failed: failed,
            duration_seconds: started.elapsed().as_secs_f64(),
        },
        question: question.trim().to_string(),
        answers,
    })
}
