//! Move intents: unresolved descriptions of where a block should go.
//!
//! An intent carries no identity of its own. It is resolved against the
//! destination zone's committed order right before a position is computed,
//! then discarded.

use crate::model::block::{BlockId, Zone};
use serde::{Deserialize, Serialize};

/// Destination slot inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MoveTarget {
    /// Slot index in the destination's current order, clamped to its length.
    Index { index: usize },
    /// Directly before or after a reference block.
    Relative {
        target: BlockId,
        insert_before: bool,
    },
    /// After the last block.
    End,
}

impl MoveTarget {
    pub fn before(target: BlockId) -> Self {
        Self::Relative {
            target,
            insert_before: true,
        }
    }

    pub fn after(target: BlockId) -> Self {
        Self::Relative {
            target,
            insert_before: false,
        }
    }

    pub fn index(index: usize) -> Self {
        Self::Index { index }
    }
}

/// Request to move one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub block_id: BlockId,
    pub destination: Zone,
    pub target: MoveTarget,
}
