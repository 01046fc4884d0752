//! Ordered per-zone view over the block store.
//!
//! # Responsibility
//! - Derive the externally visible order of a zone from block positions.
//! - Resolve placement targets into flanking positions.
//! - Detect exhausted gaps and renormalize a zone to evenly spaced keys.
//!
//! # Invariants
//! - `sorted_view` is a total order: position ascending, ties broken by id.
//!   A tie is a correctness alarm and is logged, never a supported state.
//! - Renormalization rewrites encodings only; the logical order is unchanged.
//! - Every mutation is one atomic store batch.

use crate::model::block::{Block, BlockId, Zone};
use crate::model::intent::MoveTarget;
use crate::position::{self, PositionError, PositionResult};
use crate::repo::block_repo::{BlockStore, StoreError, StoreResult, WriteBatch, WriteOp};
use log::{info, warn};
use std::cmp::Ordering;

/// Positions flanking a placement slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbors {
    pub before: Option<f64>,
    pub after: Option<f64>,
}

/// Ordered blocks of one zone together with the version they were read at.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSnapshot {
    pub zone: Zone,
    pub version: u64,
    pub blocks: Vec<Block>,
}

impl ZoneSnapshot {
    /// Resolves `target` into flanking positions, ignoring `exclude`.
    ///
    /// Returns `None` when a relative target is not in this zone.
    pub fn neighbors(&self, target: &MoveTarget, exclude: Option<BlockId>) -> Option<Neighbors> {
        let keyed: Vec<(BlockId, f64)> = self
            .blocks
            .iter()
            .filter(|block| Some(block.id) != exclude)
            .map(|block| (block.id, block.position))
            .collect();

        let (before, after) = match target {
            MoveTarget::End => (keyed.last().map(|(_, p)| *p), None),
            MoveTarget::Index { index } => {
                let positions: Vec<f64> = keyed.iter().map(|(_, p)| *p).collect();
                position::flanking(&positions, *index)
            }
            MoveTarget::Relative {
                target,
                insert_before,
            } => position::flanking_relative(&keyed, target, *insert_before).ok()?,
        };
        Some(Neighbors { before, after })
    }

    /// Returns this snapshot re-encoded as `1.0, 2.0, 3.0, ...`.
    pub fn renormalized(&self) -> ZoneSnapshot {
        let blocks = self
            .blocks
            .iter()
            .enumerate()
            .map(|(index, block)| Block {
                position: (index + 1) as f64,
                ..block.clone()
            })
            .collect();
        ZoneSnapshot {
            zone: self.zone,
            version: self.version,
            blocks,
        }
    }

    /// Store ops that write this snapshot's positions back.
    pub fn placement_ops(&self) -> Vec<WriteOp> {
        self.blocks
            .iter()
            .map(|block| WriteOp::Place {
                id: block.id,
                zone: self.zone,
                position: block.position,
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|block| block.id).collect()
    }
}

/// Resolved slot in a zone, bound to the version it was resolved against.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub zone: Zone,
    pub position: f64,
    pub version: u64,
    /// Renumbering that has to commit together with the placement.
    pub renumbered: Option<ZoneSnapshot>,
}

impl Placement {
    pub fn renormalized(&self) -> bool {
        self.renumbered.is_some()
    }

    /// Version check plus any renumbering ops; the placing op goes last.
    fn batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new().expect_version(self.zone, self.version);
        if let Some(renumbered) = &self.renumbered {
            for op in renumbered.placement_ops() {
                batch.push(op);
            }
        }
        batch
    }
}

/// Authoritative ordering bookkeeping for zones.
pub struct OrderedZoneStore<'s, S: BlockStore> {
    store: &'s S,
    epsilon: f64,
}

impl<'s, S: BlockStore> OrderedZoneStore<'s, S> {
    /// `epsilon` is the smallest gap a placement may split.
    pub fn new(store: &'s S, epsilon: f64) -> Self {
        Self { store, epsilon }
    }

    /// Returns the blocks of `zone` in display order.
    pub fn sorted_view(&self, zone: Zone) -> StoreResult<Vec<Block>> {
        let mut blocks = self.store.list_zone(zone)?;
        blocks.sort_by(compare_blocks);
        for pair in blocks.windows(2) {
            if pair[0].position == pair[1].position {
                warn!(
                    "event=position_tie module=zone_store status=alarm zone={} position={} first={} second={}",
                    zone, pair[0].position, pair[0].id, pair[1].id
                );
            }
        }
        Ok(blocks)
    }

    /// Reads the zone version, then its order.
    ///
    /// A write landing between the two reads makes the version stale, which
    /// only causes a later version-checked batch to be rejected.
    pub fn snapshot(&self, zone: Zone) -> StoreResult<ZoneSnapshot> {
        let version = self.store.zone(zone)?.version;
        let blocks = self.sorted_view(zone)?;
        Ok(ZoneSnapshot {
            zone,
            version,
            blocks,
        })
    }

    /// Returns the positions flanking `target` in the current order of `zone`.
    ///
    /// Returns `Ok(None)` when a relative target is not in `zone`.
    pub fn neighbors_of(
        &self,
        zone: Zone,
        target: &MoveTarget,
        exclude: Option<BlockId>,
    ) -> StoreResult<Option<Neighbors>> {
        Ok(self.snapshot(zone)?.neighbors(target, exclude))
    }

    /// Whether the slot between `neighbors` is too narrow to split.
    pub fn is_exhausted(&self, neighbors: &Neighbors) -> bool {
        match (neighbors.before, neighbors.after) {
            (Some(before), Some(after)) => after - before < self.epsilon,
            _ => false,
        }
    }

    /// Computes a fresh key for the slot, treating narrow gaps as degenerate.
    pub fn position_between(&self, neighbors: &Neighbors) -> PositionResult<f64> {
        if self.is_exhausted(neighbors) {
            return Err(PositionError::Degenerate {
                before: neighbors.before,
                after: neighbors.after,
            });
        }
        position::between(neighbors.before, neighbors.after)
    }

    /// Rewrites every position of `zone` to `1.0, 2.0, 3.0, ...` in one batch.
    pub fn renormalize(&self, zone: Zone) -> StoreResult<Vec<Block>> {
        let current = self.snapshot(zone)?;
        let renumbered = current.renormalized();
        let mut batch = WriteBatch::new().expect_version(zone, current.version);
        for op in renumbered.placement_ops() {
            batch.push(op);
        }
        if !batch.is_empty() {
            self.store.apply(&batch)?;
        }
        info!(
            "event=zone_renormalize module=zone_store status=ok zone={} blocks={} reason=explicit",
            zone,
            renumbered.blocks.len()
        );
        Ok(renumbered.blocks)
    }

    /// Adds `block` at the resolved slot.
    ///
    /// `block.zone` and `block.position` are taken from `placement`.
    pub fn insert(&self, block: Block, placement: &Placement) -> StoreResult<Block> {
        let block = Block {
            zone: placement.zone,
            position: placement.position,
            ..block
        };
        self.store
            .apply(&placement.batch().with(WriteOp::Insert(block.clone())))?;
        Ok(block)
    }

    /// Deletes a block and returns the zone it belonged to.
    pub fn remove(&self, id: BlockId) -> StoreResult<Zone> {
        let zones = self.store.apply(&WriteBatch::new().with(WriteOp::Remove(id)))?;
        zones
            .first()
            .copied()
            .ok_or_else(|| StoreError::InvalidData(format!("remove of {id} touched no zone")))
    }

    /// Moves `block` to the resolved slot, inside its zone or across zones.
    ///
    /// `source_version` is the version of `block.zone` read before `block`
    /// itself; the write is rejected if that zone changed or the block left it.
    pub fn update_position(
        &self,
        block: &Block,
        source_version: u64,
        placement: &Placement,
    ) -> StoreResult<Block> {
        let batch = placement
            .batch()
            .expect_version(block.zone, source_version)
            .expect_block_zone(block.id, block.zone)
            .with(WriteOp::Place {
                id: block.id,
                zone: placement.zone,
                position: placement.position,
            });
        self.store.apply(&batch)?;
        Ok(Block {
            zone: placement.zone,
            position: placement.position,
            ..block.clone()
        })
    }
}

fn compare_blocks(left: &Block, right: &Block) -> Ordering {
    left.position
        .total_cmp(&right.position)
        .then_with(|| left.id.cmp(&right.id))
}

#[cfg(test)]
mod tests {
    use super::{Neighbors, OrderedZoneStore, ZoneSnapshot};
    use crate::model::block::{Block, BlockId, BlockKind, Zone, ZoneRecord};
    use crate::model::intent::MoveTarget;
    use crate::repo::block_repo::{BlockStore, StoreError, StoreResult, WriteBatch};
    use uuid::Uuid;

    /// Read-only store serving a fixed set of blocks in insertion order.
    struct FixedStore {
        blocks: Vec<Block>,
    }

    impl BlockStore for FixedStore {
        fn zone(&self, zone: Zone) -> StoreResult<ZoneRecord> {
            Ok(ZoneRecord {
                zone,
                token_budget: 0,
                version: 0,
            })
        }

        fn list_zone(&self, zone: Zone) -> StoreResult<Vec<Block>> {
            Ok(self
                .blocks
                .iter()
                .filter(|block| block.zone == zone)
                .cloned()
                .collect())
        }

        fn get_block(&self, id: BlockId) -> StoreResult<Option<Block>> {
            Ok(self.blocks.iter().find(|block| block.id == id).cloned())
        }

        fn zone_usage(&self, _zone: Zone) -> StoreResult<u64> {
            Ok(0)
        }

        fn set_zone_budget(&self, _zone: Zone, _token_budget: u64) -> StoreResult<()> {
            Ok(())
        }

        fn apply(&self, _batch: &WriteBatch) -> StoreResult<Vec<Zone>> {
            Err(StoreError::InvalidData("fixed store is read-only".to_string()))
        }
    }

    fn block_with_id(id: u128, position: f64) -> Block {
        Block {
            id: Uuid::from_u128(id),
            ..Block::new(Zone::Working, position, BlockKind::Text, "x", 1)
        }
    }

    #[test]
    fn equal_positions_are_ordered_by_id() {
        let store = FixedStore {
            blocks: vec![
                block_with_id(3, 2.0),
                block_with_id(9, 1.0),
                block_with_id(4, 1.0),
            ],
        };
        let zones = OrderedZoneStore::new(&store, 1e-9);

        let ids: Vec<BlockId> = zones
            .sorted_view(Zone::Working)
            .unwrap()
            .iter()
            .map(|block| block.id)
            .collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(4), Uuid::from_u128(9), Uuid::from_u128(3)]
        );
    }

    #[test]
    fn narrow_gaps_are_exhausted_before_underflow() {
        let store = FixedStore { blocks: Vec::new() };
        let zones = OrderedZoneStore::new(&store, 1e-9);
        let narrow = Neighbors {
            before: Some(1.0),
            after: Some(1.0 + 1e-10),
        };
        let open = Neighbors {
            before: Some(1.0),
            after: None,
        };

        assert!(zones.is_exhausted(&narrow));
        assert!(zones.position_between(&narrow).is_err());
        assert!(!zones.is_exhausted(&open));
        assert_eq!(zones.position_between(&open), Ok(2.0));
    }

    fn snapshot(positions: &[f64]) -> ZoneSnapshot {
        ZoneSnapshot {
            zone: Zone::Working,
            version: 7,
            blocks: positions
                .iter()
                .map(|p| Block::new(Zone::Working, *p, BlockKind::Text, "x", 1))
                .collect(),
        }
    }

    #[test]
    fn neighbors_skip_the_excluded_block() {
        let view = snapshot(&[1.0, 2.0, 3.0]);
        let moving = view.blocks[1].id;
        let neighbors = view
            .neighbors(&MoveTarget::index(1), Some(moving))
            .expect("index targets always resolve");
        assert_eq!(
            neighbors,
            Neighbors {
                before: Some(1.0),
                after: Some(3.0)
            }
        );
    }

    #[test]
    fn relative_neighbors_require_present_target() {
        let view = snapshot(&[1.0, 2.0]);
        let first = view.blocks[0].id;
        assert_eq!(
            view.neighbors(&MoveTarget::before(first), None),
            Some(Neighbors {
                before: None,
                after: Some(1.0)
            })
        );
        assert_eq!(view.neighbors(&MoveTarget::before(first), Some(first)), None);
    }

    #[test]
    fn renormalized_keeps_order_and_spaces_evenly() {
        let view = snapshot(&[0.001, 0.0015, 7.5]);
        let renumbered = view.renormalized();
        assert_eq!(renumbered.ids(), view.ids());
        let positions: Vec<f64> = renumbered.blocks.iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![1.0, 2.0, 3.0]);
        assert_eq!(renumbered.version, view.version);
    }
}
