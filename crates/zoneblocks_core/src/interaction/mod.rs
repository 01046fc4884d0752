//! Host interaction adapters.
//!
//! # Responsibility
//! - Translate continuous UI gestures into single core operations.
//! - Own only ephemeral gesture state; never hold persistent data.

pub mod drag;
