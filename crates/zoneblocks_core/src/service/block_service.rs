//! Block use-case service.
//!
//! # Responsibility
//! - Provide the caller-facing block API: create, insert, move, delete,
//!   content update, zone views and utilization.
//! - Feed content through the length estimator before it reaches the store.
//!
//! # Invariants
//! - All placements go through `MoveCoordinator`.
//! - Every mutation returns the recomputed utilization of the zones it touched.
//! - Over-budget zones are reported, never refused.

use crate::config::EngineConfig;
use crate::estimate::{HeuristicEstimator, LengthEstimator};
use crate::model::block::{Block, BlockId, BlockKind, Zone};
use crate::model::intent::{MoveIntent, MoveTarget};
use crate::repo::block_repo::{BlockStore, StoreError, StoreResult, WriteBatch, WriteOp};
use crate::service::budget::{ZoneBudgetTracker, ZoneUtilization};
use crate::service::move_coordinator::{BlockDraft, MoveCoordinator, MoveError, MoveOutcome};
use crate::service::zone_store::OrderedZoneStore;
use log::info;

/// Use-case facade over a block store.
pub struct BlockService<S: BlockStore, E: LengthEstimator = HeuristicEstimator> {
    store: S,
    estimator: E,
    config: EngineConfig,
}

impl<S: BlockStore> BlockService<S> {
    /// Creates a service with the default estimator and config.
    pub fn new(store: S) -> Self {
        Self::with_parts(store, HeuristicEstimator, EngineConfig::default())
    }
}

impl<S: BlockStore, E: LengthEstimator> BlockService<S, E> {
    /// Creates a service from explicit collaborators.
    pub fn with_parts(store: S, estimator: E, config: EngineConfig) -> Self {
        Self {
            store,
            estimator,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Writes the configured budget overrides to the store.
    pub fn apply_config(&self) -> StoreResult<()> {
        for (zone, budget) in &self.config.budgets {
            self.store.set_zone_budget(*zone, *budget)?;
        }
        Ok(())
    }

    /// Creates a block at the end of `zone`.
    pub fn create_block(
        &self,
        zone: Zone,
        content: impl Into<String>,
        kind: BlockKind,
    ) -> Result<MoveOutcome, MoveError> {
        self.insert_block(zone, content, kind, MoveTarget::End)
    }

    /// Creates a block at `target` inside `zone`.
    pub fn insert_block(
        &self,
        zone: Zone,
        content: impl Into<String>,
        kind: BlockKind,
        target: MoveTarget,
    ) -> Result<MoveOutcome, MoveError> {
        let content = content.into();
        let draft = BlockDraft {
            zone,
            kind,
            token_estimate: self.estimator.estimate(&content),
            content,
        };
        self.coordinator().insert_block(&draft, &target)
    }

    /// Moves a block to `target` inside `destination`.
    pub fn move_block(
        &self,
        block_id: BlockId,
        destination: Zone,
        target: MoveTarget,
    ) -> Result<MoveOutcome, MoveError> {
        self.coordinator().move_block(&MoveIntent {
            block_id,
            destination,
            target,
        })
    }

    /// Deletes a block and returns the new utilization of its zone.
    pub fn delete_block(&self, block_id: BlockId) -> StoreResult<ZoneUtilization> {
        let zone = self.zones().remove(block_id)?;
        info!(
            "event=block_delete module=block_service status=ok block={} zone={}",
            block_id, zone
        );
        self.zone_utilization(zone)
    }

    /// Replaces a block's content and re-estimates its length.
    pub fn update_content(
        &self,
        block_id: BlockId,
        content: impl Into<String>,
    ) -> StoreResult<(Block, ZoneUtilization)> {
        let content = content.into();
        let token_estimate = self.estimator.estimate(&content);
        self.store.apply(&WriteBatch::new().with(WriteOp::UpdateContent {
            id: block_id,
            content,
            token_estimate,
        }))?;
        let block = self
            .store
            .get_block(block_id)?
            .ok_or(StoreError::BlockNotFound(block_id))?;
        let utilization = self.zone_utilization(block.zone)?;
        Ok((block, utilization))
    }

    /// Returns one block by id.
    pub fn get_block(&self, block_id: BlockId) -> StoreResult<Option<Block>> {
        self.store.get_block(block_id)
    }

    /// Returns the blocks of `zone` in display order.
    pub fn zone_view(&self, zone: Zone) -> StoreResult<Vec<Block>> {
        self.zones().sorted_view(zone)
    }

    /// Returns the current utilization of `zone`.
    pub fn zone_utilization(&self, zone: Zone) -> StoreResult<ZoneUtilization> {
        ZoneBudgetTracker::new(&self.store).utilization(zone)
    }

    /// Replaces the budget of `zone` and returns its new utilization.
    pub fn set_zone_budget(&self, zone: Zone, token_budget: u64) -> StoreResult<ZoneUtilization> {
        self.store.set_zone_budget(zone, token_budget)?;
        self.zone_utilization(zone)
    }

    /// Rewrites the positions of `zone` to evenly spaced integers.
    pub fn renormalize(&self, zone: Zone) -> StoreResult<Vec<Block>> {
        self.zones().renormalize(zone)
    }

    fn zones(&self) -> OrderedZoneStore<'_, S> {
        OrderedZoneStore::new(&self.store, self.config.renormalize_epsilon)
    }

    fn coordinator(&self) -> MoveCoordinator<'_, S> {
        MoveCoordinator::new(&self.store, &self.config)
    }
}
