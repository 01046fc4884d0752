//! Content length estimation.
//!
//! # Responsibility
//! - Turn block content into the length metric consumed by budgeting.
//!
//! # Invariants
//! - Estimation is deterministic for the same content.
//! - Empty or whitespace-only content estimates to zero.

use once_cell::sync::Lazy;
use regex::Regex;

static PIECE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+|[^\w\s]").expect("valid token piece regex"));

/// Characters of one word that roughly make up one token.
const CHARS_PER_TOKEN: usize = 4;

/// Length metric collaborator.
pub trait LengthEstimator {
    /// Returns the estimated token length of `content`.
    fn estimate(&self, content: &str) -> u64;
}

/// Word-piece heuristic: every punctuation mark is one token, every word is
/// one token per started `CHARS_PER_TOKEN` characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl LengthEstimator for HeuristicEstimator {
    fn estimate(&self, content: &str) -> u64 {
        PIECE_RE
            .find_iter(content)
            .map(|piece| piece.as_str().chars().count().div_ceil(CHARS_PER_TOKEN) as u64)
            .sum()
    }
}

impl<F> LengthEstimator for F
where
    F: Fn(&str) -> u64,
{
    fn estimate(&self, content: &str) -> u64 {
        self(content)
    }
}

#[cfg(test)]
mod tests {
    use super::{HeuristicEstimator, LengthEstimator};

    #[test]
    fn blank_content_is_free() {
        assert_eq!(HeuristicEstimator.estimate(""), 0);
        assert_eq!(HeuristicEstimator.estimate(" \n\t "), 0);
    }

    #[test]
    fn counts_words_and_punctuation() {
        // "hello"=2, ","=1, "world"=2, "!"=1
        assert_eq!(HeuristicEstimator.estimate("hello, world!"), 6);
        assert_eq!(HeuristicEstimator.estimate("a b c"), 3);
    }

    #[test]
    fn closures_act_as_estimators() {
        let by_bytes = |content: &str| content.len() as u64;
        assert_eq!(by_bytes.estimate("abcd"), 4);
    }
}
