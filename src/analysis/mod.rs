//! Theme analysis over meeting notes.
//!
//! `aggregator` holds the pure normalize/batch/merge steps, `tokens` the
//! pluggable token estimate, and `pipeline` runs batches against the
//! summarization service. `question` reuses the batching to answer a
//! free-form question.

pub mod aggregator;
pub mod pipeline;
pub mod question;
pub mod tokens;

pub use aggregator::NoteAggregator;
pub use pipeline::{AnalysisOptions, ThemeAnalyzer};
pub use question::answer_question;
