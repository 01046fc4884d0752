//! Fractional position index.
//!
//! # Responsibility
//! - Compute a new order key from the keys of the would-be neighbors.
//! - Refuse to produce a key that does not sort strictly between them.
//!
//! # Invariants
//! - Functions are pure; no state is kept between calls.
//! - A returned key `p` satisfies `before < p < after` for every present bound.
//! - Precision exhaustion is reported as `PositionError::Degenerate`, never
//!   papered over with a duplicate key.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key assigned to the first block of an empty zone.
pub const SEED_POSITION: f64 = 1.0;

/// Spacing used when appending after the last key.
pub const APPEND_STEP: f64 = 1.0;

pub type PositionResult<T> = Result<T, PositionError>;

/// Errors from position computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionError {
    /// No key fits strictly between the neighbors.
    Degenerate {
        before: Option<f64>,
        after: Option<f64>,
    },
    /// Relative placement referenced an element missing from the sequence.
    UnknownTarget,
}

impl Display for PositionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Degenerate { before, after } => write!(
                f,
                "no position fits between {} and {}",
                fmt_bound(*before),
                fmt_bound(*after)
            ),
            Self::UnknownTarget => write!(f, "placement target is not in the sequence"),
        }
    }
}

impl Error for PositionError {}

fn fmt_bound(value: Option<f64>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "<open>".to_string(),
    }
}

/// Returns a key that sorts strictly between `before` and `after`.
///
/// - both absent: `SEED_POSITION`
/// - only `after`: `after / 2`
/// - only `before`: `before + APPEND_STEP`
/// - both: the midpoint
///
/// # Errors
/// - `Degenerate` when the bounds are equal or inverted, or when floating-point
///   precision leaves no representable value between them.
pub fn between(before: Option<f64>, after: Option<f64>) -> PositionResult<f64> {
    let degenerate = PositionError::Degenerate { before, after };
    let candidate = match (before, after) {
        (None, None) => return Ok(SEED_POSITION),
        (None, Some(after)) => after / 2.0,
        (Some(before), None) => before + APPEND_STEP,
        (Some(before), Some(after)) => {
            if before >= after {
                return Err(degenerate);
            }
            before + (after - before) / 2.0
        }
    };

    if !candidate.is_finite() || candidate <= 0.0 {
        return Err(degenerate);
    }
    if before.is_some_and(|before| candidate <= before) {
        return Err(degenerate);
    }
    if after.is_some_and(|after| candidate >= after) {
        return Err(degenerate);
    }
    Ok(candidate)
}

/// Returns the keys flanking slot `target_index` of an ascending sequence.
///
/// `target_index` is clamped to `[0, sorted.len()]`.
pub fn flanking(sorted: &[f64], target_index: usize) -> (Option<f64>, Option<f64>) {
    let index = target_index.min(sorted.len());
    let before = index.checked_sub(1).map(|i| sorted[i]);
    let after = sorted.get(index).copied();
    (before, after)
}

/// Returns a key for slot `target_index` of an ascending sequence.
pub fn at_index(sorted: &[f64], target_index: usize) -> PositionResult<f64> {
    let (before, after) = flanking(sorted, target_index);
    between(before, after)
}

/// Returns the keys flanking the slot before or after `target`.
///
/// # Errors
/// - `UnknownTarget` when `target` is not present in `sorted`.
pub fn flanking_relative<K: PartialEq>(
    sorted: &[(K, f64)],
    target: &K,
    insert_before: bool,
) -> PositionResult<(Option<f64>, Option<f64>)> {
    let index = sorted
        .iter()
        .position(|(key, _)| key == target)
        .ok_or(PositionError::UnknownTarget)?;
    let slot = if insert_before { index } else { index + 1 };
    let before = slot.checked_sub(1).map(|i| sorted[i].1);
    let after = sorted.get(slot).map(|(_, position)| *position);
    Ok((before, after))
}

/// Returns a key placing a new element immediately before or after `target`.
pub fn relative_to<K: PartialEq>(
    sorted: &[(K, f64)],
    target: &K,
    insert_before: bool,
) -> PositionResult<f64> {
    let (before, after) = flanking_relative(sorted, target, insert_before)?;
    between(before, after)
}

#[cfg(test)]
mod tests {
    use super::{at_index, between, flanking, relative_to, PositionError, SEED_POSITION};

    #[test]
    fn between_covers_open_and_closed_bounds() {
        assert_eq!(between(None, None), Ok(SEED_POSITION));
        assert_eq!(between(None, Some(1.0)), Ok(0.5));
        assert_eq!(between(Some(2.0), None), Ok(3.0));
        assert_eq!(between(Some(1.0), Some(2.0)), Ok(1.5));
    }

    #[test]
    fn between_rejects_equal_and_inverted_bounds() {
        assert!(matches!(
            between(Some(1.0), Some(1.0)),
            Err(PositionError::Degenerate { .. })
        ));
        assert!(matches!(
            between(Some(2.0), Some(1.0)),
            Err(PositionError::Degenerate { .. })
        ));
    }

    #[test]
    fn between_detects_precision_exhaustion() {
        let before = 1.0_f64;
        let after = f64::from_bits(before.to_bits() + 1);
        let err = between(Some(before), Some(after)).unwrap_err();
        assert_eq!(
            err,
            PositionError::Degenerate {
                before: Some(before),
                after: Some(after)
            }
        );
    }

    #[test]
    fn between_rejects_underflow_at_front() {
        let tiny = f64::from_bits(1);
        assert!(between(None, Some(tiny)).is_err());
    }

    #[test]
    fn at_index_clamps_to_sequence_bounds() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(at_index(&sorted, 0), Ok(0.5));
        assert_eq!(at_index(&sorted, 1), Ok(1.5));
        assert_eq!(at_index(&sorted, 3), Ok(4.0));
        assert_eq!(at_index(&sorted, 99), Ok(4.0));
        assert_eq!(at_index(&[], 5), Ok(SEED_POSITION));
        assert_eq!(flanking(&sorted, 99), (Some(3.0), None));
    }

    #[test]
    fn relative_to_resolves_both_sides() {
        let sorted = [("a", 1.0), ("b", 2.0)];
        assert_eq!(relative_to(&sorted, &"a", true), Ok(0.5));
        assert_eq!(relative_to(&sorted, &"a", false), Ok(1.5));
        assert_eq!(relative_to(&sorted, &"b", false), Ok(3.0));
        assert_eq!(
            relative_to(&sorted, &"missing", true),
            Err(PositionError::UnknownTarget)
        );
    }
}
