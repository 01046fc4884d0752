//! Ordered-collection engine for zoned content blocks.
//! This crate is the single source of truth for ordering and budget invariants.

pub mod config;
pub mod db;
pub mod estimate;
pub mod interaction;
pub mod logging;
pub mod model;
pub mod position;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use estimate::{HeuristicEstimator, LengthEstimator};
pub use interaction::drag::{
    DragError, DragInteractionAdapter, DragSession, DragState, HoverTarget, MoveExecutor,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::block::{Block, BlockId, BlockKind, Zone, ZoneRecord};
pub use model::intent::{MoveIntent, MoveTarget};
pub use position::PositionError;
pub use repo::block_repo::{
    BlockStore, SqliteBlockStore, StoreError, StoreResult, WriteBatch, WriteOp,
};
pub use service::block_service::BlockService;
pub use service::budget::{BudgetLevel, ZoneBudgetTracker, ZoneUtilization};
pub use service::move_coordinator::{BlockDraft, MoveCoordinator, MoveError, MoveOutcome};
pub use service::zone_store::{Neighbors, OrderedZoneStore, Placement, ZoneSnapshot};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
