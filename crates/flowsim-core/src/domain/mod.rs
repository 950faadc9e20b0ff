//! Domain layer
//!
//! Contains the simulation lifecycle and the locking it serializes on.

pub mod locking;
pub mod simulation;
