//! Ambient performance/LOD systems.
//!
//! The gameplay systems (movement, combat, behavior, abilities, animation,
//! lifetime, desync) now live as top-level modules next to this one rather
//! than nested under `systems/` — this module only keeps the LOD/sector
//! bookkeeping that every other system reads.

pub mod performance;

pub use performance::*;
