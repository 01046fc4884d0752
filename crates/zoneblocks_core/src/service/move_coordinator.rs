//! Block placement and move protocol.
//!
//! # Responsibility
//! - Resolve placement targets against the destination's committed order.
//! - Recover from exhausted gaps with one renormalization.
//! - Apply each placement as a single version-checked batch and retry on
//!   concurrent writers up to a fixed bound.
//!
//! # Invariants
//! - Neighbors are re-read on every attempt; no earlier view is reused.
//! - Renormalization and the placement it enables commit in the same batch.
//! - A cross-zone move is one record update, so the block is never visible
//!   in both zones or in neither.
//! - A move commits only while the block is still in the zone it was read
//!   from and neither zone changed since; otherwise the attempt restarts.
//! - A failed attempt leaves the store unchanged.

use crate::config::EngineConfig;
use crate::model::block::{Block, BlockId, BlockKind, Zone};
use crate::model::intent::{MoveIntent, MoveTarget};
use crate::position::PositionError;
use crate::repo::block_repo::{BlockStore, StoreError};
use crate::service::budget::{ZoneBudgetTracker, ZoneUtilization};
use crate::service::zone_store::{OrderedZoneStore, Placement};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors surfaced by placements and moves.
#[derive(Debug)]
pub enum MoveError {
    /// Block to move does not exist.
    BlockNotFound(BlockId),
    /// Reference block of a relative target is not in the destination zone.
    TargetNotFound(BlockId),
    /// No position fits even after renormalizing the destination.
    PositionExhausted { zone: Zone },
    /// Every attempt lost against a concurrent writer.
    Conflict { attempts: u32 },
    /// Store failure.
    Store(StoreError),
}

impl MoveError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::VersionConflict { .. } | StoreError::BlockMoved { .. })
        )
    }
}

impl Display for MoveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::TargetNotFound(id) => write!(f, "move target not found: {id}"),
            Self::PositionExhausted { zone } => {
                write!(f, "no free position in zone `{zone}` after renormalization")
            }
            Self::Conflict { attempts } => {
                write!(f, "move lost to concurrent writers {attempts} times")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MoveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for MoveError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::BlockNotFound(id) => Self::BlockNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result of a committed placement.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// The block as committed.
    pub block: Block,
    /// Whether the destination was renormalized to make room.
    pub renormalized: bool,
    /// Attempts needed, including the successful one.
    pub attempts: u32,
    /// Recomputed utilization of source then destination zone.
    pub utilization: Vec<ZoneUtilization>,
}

/// Content of a block that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDraft {
    pub zone: Zone,
    pub kind: BlockKind,
    pub content: String,
    pub token_estimate: u64,
}

/// Executes placements against a block store.
pub struct MoveCoordinator<'s, S: BlockStore> {
    store: &'s S,
    zones: OrderedZoneStore<'s, S>,
    max_attempts: u32,
}

impl<'s, S: BlockStore> MoveCoordinator<'s, S> {
    pub fn new(store: &'s S, config: &EngineConfig) -> Self {
        Self {
            store,
            zones: OrderedZoneStore::new(store, config.renormalize_epsilon),
            max_attempts: config.max_conflict_retries.max(1),
        }
    }

    /// Moves a block within its zone or into another zone.
    pub fn move_block(&self, intent: &MoveIntent) -> Result<MoveOutcome, MoveError> {
        self.with_retries(intent.block_id, |attempt| self.try_move(intent, attempt))
    }

    /// Creates a block at `target` inside `draft.zone`.
    pub fn insert_block(
        &self,
        draft: &BlockDraft,
        target: &MoveTarget,
    ) -> Result<MoveOutcome, MoveError> {
        let id = Uuid::new_v4();
        self.with_retries(id, |attempt| self.try_insert(id, draft, target, attempt))
    }

    fn with_retries(
        &self,
        block_id: BlockId,
        mut attempt: impl FnMut(u32) -> Result<MoveOutcome, MoveError>,
    ) -> Result<MoveOutcome, MoveError> {
        for number in 1..=self.max_attempts {
            match attempt(number) {
                Err(err) if err.is_retryable() => {
                    warn!(
                        "event=move_conflict module=move status=retry block={} attempt={} max_attempts={} error={}",
                        block_id, number, self.max_attempts, err
                    );
                }
                other => return other,
            }
        }
        error!(
            "event=move_conflict module=move status=error block={} attempts={}",
            block_id, self.max_attempts
        );
        Err(MoveError::Conflict {
            attempts: self.max_attempts,
        })
    }

    fn try_move(&self, intent: &MoveIntent, attempt: u32) -> Result<MoveOutcome, MoveError> {
        let block = self
            .store
            .get_block(intent.block_id)?
            .ok_or(MoveError::BlockNotFound(intent.block_id))?;
        let source = block.zone;

        if let MoveTarget::Relative { target, .. } = intent.target {
            if target == block.id && intent.destination == source {
                return self.finish(block, source, false, attempt);
            }
        }

        let source_version = self.store.zone(source)?.version;
        let placement = self.resolve(intent.destination, &intent.target, Some(block.id))?;
        let moved = self
            .zones
            .update_position(&block, source_version, &placement)?;

        info!(
            "event=block_move module=move status=ok block={} from={} to={} position={} attempt={} renormalized={}",
            block.id,
            source,
            moved.zone,
            moved.position,
            attempt,
            placement.renormalized()
        );
        self.finish(moved, source, placement.renormalized(), attempt)
    }

    fn try_insert(
        &self,
        id: BlockId,
        draft: &BlockDraft,
        target: &MoveTarget,
        attempt: u32,
    ) -> Result<MoveOutcome, MoveError> {
        let placement = self.resolve(draft.zone, target, None)?;
        let block = self.zones.insert(
            Block {
                id,
                zone: draft.zone,
                position: placement.position,
                kind: draft.kind,
                content: draft.content.clone(),
                token_estimate: draft.token_estimate,
            },
            &placement,
        )?;

        info!(
            "event=block_create module=move status=ok block={} zone={} position={} tokens={} attempt={} renormalized={}",
            block.id,
            block.zone,
            block.position,
            block.token_estimate,
            attempt,
            placement.renormalized()
        );
        let zone = block.zone;
        self.finish(block, zone, placement.renormalized(), attempt)
    }

    /// Resolves `target` against a fresh read of `zone`.
    ///
    /// On a degenerate slot the zone is renormalized in memory and resolution
    /// is repeated once; the renumbering is returned so it commits together
    /// with the placement.
    fn resolve(
        &self,
        zone: Zone,
        target: &MoveTarget,
        exclude: Option<BlockId>,
    ) -> Result<Placement, MoveError> {
        let current = self.zones.snapshot(zone)?;
        let neighbors = current
            .neighbors(target, exclude)
            .ok_or_else(|| missing_target(target))?;
        match self.zones.position_between(&neighbors) {
            Ok(position) => {
                return Ok(Placement {
                    zone,
                    position,
                    version: current.version,
                    renumbered: None,
                })
            }
            Err(PositionError::UnknownTarget) => return Err(missing_target(target)),
            Err(PositionError::Degenerate { .. }) => {}
        }

        let renumbered = current.renormalized();
        info!(
            "event=zone_renormalize module=move status=ok zone={} blocks={} reason=degenerate",
            zone,
            renumbered.blocks.len()
        );
        let neighbors = renumbered
            .neighbors(target, exclude)
            .ok_or_else(|| missing_target(target))?;
        match self.zones.position_between(&neighbors) {
            Ok(position) => Ok(Placement {
                zone,
                position,
                version: current.version,
                renumbered: Some(renumbered),
            }),
            Err(err) => {
                error!(
                    "event=position_exhausted module=move status=error zone={} error={}",
                    zone, err
                );
                Err(MoveError::PositionExhausted { zone })
            }
        }
    }

    fn finish(
        &self,
        block: Block,
        source: Zone,
        renormalized: bool,
        attempts: u32,
    ) -> Result<MoveOutcome, MoveError> {
        let utilization = ZoneBudgetTracker::new(self.store).recompute(&[source, block.zone])?;
        Ok(MoveOutcome {
            block,
            renormalized,
            attempts,
            utilization,
        })
    }
}

fn missing_target(target: &MoveTarget) -> MoveError {
    match target {
        MoveTarget::Relative { target, .. } => MoveError::TargetNotFound(*target),
        _ => MoveError::Store(StoreError::InvalidData(
            "non-relative target failed to resolve".to_string(),
        )),
    }
}
