//! Domain model for zoned, ordered content blocks.
//!
//! # Responsibility
//! - Define canonical data structures used by core ordering and budgeting.
//!
//! # Invariants
//! - Every block is identified by a stable `BlockId`.
//! - Zone order is derived from block positions and never stored on its own.

pub mod block;
pub mod intent;
