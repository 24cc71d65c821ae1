//! Note normalization, batching and theme merging.
//!
//! Notes flow through `normalize` → `batch` → `extract_themes` (once per
//! batch) → `merge`. Everything here except `extract_themes` is pure.

use crate::analysis::tokens::{CharRatioEstimator, TokenEstimator};
use crate::error::Result;
use crate::models::{Batch, MeetingNote, MeetingRef, ThemeFinding};
use crate::ports::SummarizationService;
use std::cmp::Ordering;
use std::collections::{btree_map::Entry, BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters removed from note bodies on top of whitespace collapsing.
const INVISIBLE_CHARS: [char; 4] = ['\u{feff}', '\u{200b}', '\u{200c}', '\u{200d}'];

/// Collapse runs of whitespace to a single space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    let visible: String = text.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect();
    visible.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean up transcription artifacts in every note body.
pub fn normalize(notes: Vec<MeetingNote>) -> Vec<MeetingNote> {
    notes
        .into_iter()
        .map(|note| MeetingNote {
            body: normalize_text(&note.body),
            ..note
        })
        .collect()
}

/// Grouping key for theme labels.
pub fn normalize_label(label: &str) -> String {
    normalize_text(label).to_lowercase()
}

/// Splits notes into context-window-sized batches.
#[derive(Clone)]
pub struct NoteAggregator {
    estimator: Arc<dyn TokenEstimator>,
    max_tokens_per_batch: usize,
}

impl NoteAggregator {
    /// Aggregator using the default `chars / 4` estimate.
    pub fn new(max_tokens_per_batch: usize) -> Self {
        Self::with_estimator(max_tokens_per_batch, Arc::new(CharRatioEstimator::default()))
    }

    pub fn with_estimator(max_tokens_per_batch: usize, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            max_tokens_per_batch: max_tokens_per_batch.max(1),
        }
    }

    pub fn max_tokens_per_batch(&self) -> usize {
        self.max_tokens_per_batch
    }

    /// Greedy, in-order packing of `notes` into batches.
    ///
    /// The returned iterator is lazy and can be recreated at will; it always
    /// yields the same batches for the same input.
    pub fn batch<'a>(&'a self, notes: &'a [MeetingNote]) -> Batches<'a> {
        Batches {
            notes,
            position: 0,
            estimator: self.estimator.as_ref(),
            budget: self.max_tokens_per_batch,
        }
    }

    /// Ask the summarization service for the themes of one batch.
    ///
    /// Supporting meetings are resolved against the batch's own documents;
    /// references to meetings that are not in the batch are dropped.
    pub async fn extract_themes(
        &self,
        batch: &Batch,
        service: &dyn SummarizationService,
        max_output_tokens: u32,
    ) -> Result<Vec<ThemeFinding>> {
        let context = render_batch(batch);
        let raw = service.summarize(&context, max_output_tokens).await?;

        let known: HashMap<(String, chrono::NaiveDate), MeetingRef> = batch
            .documents
            .iter()
            .map(|doc| ((normalize_label(&doc.title), doc.date), doc.meeting_ref()))
            .collect();

        let findings = raw
            .into_iter()
            .filter(|f| !normalize_label(&f.theme_label).is_empty())
            .map(|finding| {
                let supporting_meetings = finding
                    .supporting_meetings
                    .iter()
                    .filter_map(|m| {
                        let resolved = known.get(&(normalize_label(&m.title), m.date)).cloned();
                        if resolved.is_none() {
                            debug!("Dropping reference to unknown meeting {}", m);
                        }
                        resolved
                    })
                    .collect();
                ThemeFinding {
                    theme_label: normalize_text(&finding.theme_label),
                    supporting_meetings,
                    confidence: finding.confidence,
                }
            })
            .collect();

        Ok(findings)
    }
}

/// Iterator over the batches of a note sequence.
#[derive(Clone)]
pub struct Batches<'a> {
    notes: &'a [MeetingNote],
    position: usize,
    estimator: &'a dyn TokenEstimator,
    budget: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let mut documents = Vec::new();
        let mut tokens = 0;

        while let Some(note) = self.notes.get(self.position) {
            let estimate = self.estimator.estimate(&note.body);

            if estimate > self.budget {
                // Oversized notes get a batch of their own.
                if !documents.is_empty() {
                    break;
                }
                self.position += 1;

                let body = self.estimator.truncate(&note.body, self.budget).to_string();
                let kept = self.estimator.estimate(&body);
                warn!(
                    "Note '{}' ({}) is ~{} tokens, over the {} token budget; truncated to ~{}",
                    note.title, note.date, estimate, self.budget, kept
                );
                return Some(Batch {
                    documents: vec![MeetingNote {
                        body,
                        truncated: true,
                        ..note.clone()
                    }],
                    approximate_token_count: kept,
                });
            }

            if tokens + estimate > self.budget {
                break;
            }

            tokens += estimate;
            documents.push(note.clone());
            self.position += 1;
        }

        if documents.is_empty() {
            None
        } else {
            Some(Batch {
                documents,
                approximate_token_count: tokens,
            })
        }
    }
}

/// Concatenate a batch's documents into one context block.
pub fn render_batch(batch: &Batch) -> String {
    let mut context = String::new();

    for doc in &batch.documents {
        context.push_str(&format!("=== MEETING: {} ===\n", doc.title));
        context.push_str(&format!("DATE: {}\n", doc.date.format("%Y-%m-%d")));
        if !doc.attendees.is_empty() {
            context.push_str(&format!("ATTENDEES: {}\n", doc.attendees.join(", ")));
        }
        if doc.truncated {
            context.push_str("NOTE: text truncated to fit the context window\n");
        }
        context.push_str(&doc.body);
        context.push_str("\n==========================\n\n");
    }

    context
}

/// Merge per-batch findings into one ordered list.
///
/// Findings whose labels match case-insensitively are combined: supporting
/// meetings are unioned and the highest confidence wins. The merged label is
/// the smallest contributing label, so the result does not depend on the
/// order findings arrive in.
pub fn merge<I>(per_batch: I) -> Vec<ThemeFinding>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = ThemeFinding>,
{
    let mut groups: BTreeMap<String, ThemeFinding> = BTreeMap::new();

    for finding in per_batch.into_iter().flatten() {
        let key = normalize_label(&finding.theme_label);
        if key.is_empty() {
            continue;
        }
        let label = normalize_text(&finding.theme_label);

        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(ThemeFinding {
                    theme_label: label,
                    ..finding
                });
            }
            Entry::Occupied(mut slot) => {
                let merged = slot.get_mut();
                if label < merged.theme_label {
                    merged.theme_label = label;
                }
                merged.supporting_meetings.extend(finding.supporting_meetings);
                merged.confidence = merged.confidence.max(finding.confidence);
            }
        }
    }

    let mut merged: Vec<ThemeFinding> = groups.into_values().collect();
    merged.sort_by(compare_findings);
    merged
}

/// Report order: most supported first, then earliest meeting, then label.
fn compare_findings(a: &ThemeFinding, b: &ThemeFinding) -> Ordering {
    b.supporting_meetings
        .len()
        .cmp(&a.supporting_meetings.len())
        .then_with(|| match (a.earliest_date(), b.earliest_date()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| normalize_label(&a.theme_label).cmp(&normalize_label(&b.theme_label)))
        .then_with(|| a.theme_label.cmp(&b.theme_label))
}
