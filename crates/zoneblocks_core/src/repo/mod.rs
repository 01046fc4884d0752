//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contract the ordering engine depends on.
//! - Isolate SQLite query details from ordering and move orchestration.
//!
//! # Invariants
//! - Multi-record writes go through `WriteBatch` and are all-or-nothing.

pub mod block_repo;
