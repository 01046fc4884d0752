//! Zone token-budget tracking.
//!
//! # Responsibility
//! - Derive per-zone utilization (`used / budget`) from stored blocks.
//! - Classify utilization into fixed threshold bands.
//!
//! # Invariants
//! - Tracking never mutates blocks; it is a read-model only.
//! - Going over budget is a classification, never a rejected mutation.
//! - Reordering inside a zone cannot change its utilization.

use crate::model::block::Zone;
use crate::repo::block_repo::{BlockStore, StoreResult};
use serde::Serialize;

/// Ratio at or below which a zone is `Normal`.
pub const WARNING_THRESHOLD: f64 = 0.80;
/// Ratio at or below which a zone is at most `Warning`.
pub const DANGER_THRESHOLD: f64 = 0.95;

/// Utilization band of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    Normal,
    Warning,
    Danger,
}

impl BudgetLevel {
    /// `ratio <= 0.80` Normal, `<= 0.95` Warning, above Danger.
    pub fn classify(ratio: f64) -> Self {
        if ratio <= WARNING_THRESHOLD {
            Self::Normal
        } else if ratio <= DANGER_THRESHOLD {
            Self::Warning
        } else {
            Self::Danger
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// Utilization snapshot of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneUtilization {
    pub zone: Zone,
    pub used: u64,
    pub budget: u64,
    pub ratio: f64,
    pub level: BudgetLevel,
}

impl ZoneUtilization {
    /// Builds a snapshot from raw totals.
    ///
    /// A zero budget yields ratio `0.0` while empty and `+inf` otherwise.
    pub fn from_totals(zone: Zone, used: u64, budget: u64) -> Self {
        let ratio = match (used, budget) {
            (0, _) => 0.0,
            (_, 0) => f64::INFINITY,
            (used, budget) => used as f64 / budget as f64,
        };
        Self {
            zone,
            used,
            budget,
            ratio,
            level: BudgetLevel::classify(ratio),
        }
    }
}

/// Read-only budget tracker over a block store.
pub struct ZoneBudgetTracker<'s, S: BlockStore> {
    store: &'s S,
}

impl<'s, S: BlockStore> ZoneBudgetTracker<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Recomputes utilization of one zone from committed state.
    pub fn utilization(&self, zone: Zone) -> StoreResult<ZoneUtilization> {
        let budget = self.store.zone(zone)?.token_budget;
        let used = self.store.zone_usage(zone)?;
        Ok(ZoneUtilization::from_totals(zone, used, budget))
    }

    /// Recomputes every zone touched by a mutation, in the given order.
    ///
    /// Duplicates are recomputed again rather than skipped.
    pub fn recompute(&self, zones: &[Zone]) -> StoreResult<Vec<ZoneUtilization>> {
        zones.iter().map(|zone| self.utilization(*zone)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{BudgetLevel, ZoneUtilization};
    use crate::model::block::Zone;

    #[test]
    fn classification_bands_are_inclusive_at_upper_edge() {
        assert_eq!(BudgetLevel::classify(0.0), BudgetLevel::Normal);
        assert_eq!(BudgetLevel::classify(0.80), BudgetLevel::Normal);
        assert_eq!(BudgetLevel::classify(0.85), BudgetLevel::Warning);
        assert_eq!(BudgetLevel::classify(0.95), BudgetLevel::Warning);
        assert_eq!(BudgetLevel::classify(0.951), BudgetLevel::Danger);
        assert_eq!(BudgetLevel::classify(3.0), BudgetLevel::Danger);
    }

    #[test]
    fn zero_budget_is_danger_only_when_used() {
        let empty = ZoneUtilization::from_totals(Zone::Stable, 0, 0);
        assert_eq!(empty.ratio, 0.0);
        assert_eq!(empty.level, BudgetLevel::Normal);

        let used = ZoneUtilization::from_totals(Zone::Stable, 1, 0);
        assert!(used.ratio.is_infinite());
        assert_eq!(used.level, BudgetLevel::Danger);
    }

    #[test]
    fn ratio_is_used_over_budget() {
        let utilization = ZoneUtilization::from_totals(Zone::Working, 850, 1000);
        assert!((utilization.ratio - 0.85).abs() < f64::EPSILON);
        assert_eq!(utilization.level, BudgetLevel::Warning);
    }
}
