//! Token estimation.
//!
//! Batching only needs an approximate token count. The default estimator
//! uses the usual four-characters-per-token heuristic; an exact tokenizer can
//! be plugged in by implementing [`TokenEstimator`].

/// Estimates how many model tokens a piece of text occupies.
pub trait TokenEstimator: Send + Sync {
    /// Approximate token count of `text`. Must be 0 for the empty string and
    /// must not decrease as text is appended.
    fn estimate(&self, text: &str) -> usize;

    /// Longest prefix of `text` (on a char boundary) whose estimate fits
    /// within `budget`.
    fn truncate<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if self.estimate(text) <= budget {
            return text;
        }

        // Binary search over the number of chars kept.
        let mut lo = 0;
        let mut hi = text.chars().count();
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            if self.estimate(prefix_chars(text, mid)) <= budget {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        prefix_chars(text, lo)
    }
}

/// `chars / chars_per_token`, rounded down.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }

    fn truncate<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        let max_chars = budget
            .saturating_mul(self.chars_per_token)
            .saturating_add(self.chars_per_token - 1);
        prefix_chars(text, max_chars)
    }
}

/// The first `n` chars of `text`.
fn prefix_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
