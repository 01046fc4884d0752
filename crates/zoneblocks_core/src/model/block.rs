//! Block and zone domain model.
//!
//! # Responsibility
//! - Define the canonical content unit (`Block`) and its owning grouping (`Zone`).
//! - Keep ordering metadata (`position`) and accounting metadata
//!   (`token_estimate`) on the same record so one write moves both.
//!
//! # Invariants
//! - `id` is stable and never reused for another block.
//! - A block belongs to exactly one zone at a time.
//! - Within one zone no two blocks share a `position`.
//! - `position` is finite and strictly positive.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a block.
pub type BlockId = Uuid;

/// Fixed set of budgeted groupings that hold blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Content that is always kept.
    Permanent,
    /// Content that changes rarely.
    Stable,
    /// Scratch content for the current task.
    Working,
}

impl Zone {
    /// Every zone, in display order.
    pub const ALL: [Zone; 3] = [Zone::Permanent, Zone::Stable, Zone::Working];

    /// Storage/wire name of this zone.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Stable => "stable",
            Self::Working => "working",
        }
    }

    /// Parses a storage name back into a zone.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "permanent" => Some(Self::Permanent),
            "stable" => Some(Self::Stable),
            "working" => Some(Self::Working),
            _ => None,
        }
    }
}

impl Display for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content category of a block. Opaque to ordering and budgeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Free-form prose.
    Text,
    /// Source code or structured snippet.
    Code,
    /// Standing instruction.
    Instruction,
    /// Pointer to external material.
    Reference,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Instruction => "instruction",
            Self::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "code" => Some(Self::Code),
            "instruction" => Some(Self::Instruction),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Canonical block record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Stable identifier.
    pub id: BlockId,
    /// Owning zone.
    pub zone: Zone,
    /// Fractional order key within `zone`. Not meaningful across zones.
    pub position: f64,
    /// Content category.
    pub kind: BlockKind,
    /// Opaque payload.
    pub content: String,
    /// Estimated token length of `content`.
    pub token_estimate: u64,
}

impl Block {
    /// Creates a block with a generated stable ID.
    ///
    /// The caller is responsible for picking a `position` that is free in `zone`.
    pub fn new(
        zone: Zone,
        position: f64,
        kind: BlockKind,
        content: impl Into<String>,
        token_estimate: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            zone,
            position,
            kind,
            content: content.into(),
            token_estimate,
        }
    }
}

/// Persisted per-zone bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone: Zone,
    /// Token budget; exceeding it is a warning, never a rejection.
    pub token_budget: u64,
    /// Monotonic write counter used for optimistic concurrency.
    pub version: u64,
}
