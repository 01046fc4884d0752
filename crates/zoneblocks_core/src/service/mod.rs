//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into ordering, move and budget use-cases.
//! - Keep callers decoupled from storage details.

pub mod block_service;
pub mod budget;
pub mod move_coordinator;
pub mod zone_store;
