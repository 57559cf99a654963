//! tactics_core - Simulation Core
//!
//! A deterministic, fixed-timestep ECS simulation for large-scale war gaming.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod abilities;
pub mod api;
pub mod behavior;
pub mod combat;
pub mod components;
pub mod desync;
pub mod ecs;
pub mod error;
pub mod flow_field;
pub mod godot_bridge;
pub mod grid;
pub mod lifetime;
pub mod movement;
pub mod pathfinding;
pub mod player_stats;
pub mod protocol;
pub mod rng;
pub mod save;
pub mod scheduler;
pub mod squad;
pub mod systems;
pub mod terrain;
pub mod world;

pub use components::*;
pub use ecs::EntityStore;
pub use error::{ProtocolError, SaveError, ValidationError};
pub use protocol::{GamePhase, ProtocolCoordinator};
pub use rng::SimRng;
pub use scheduler::ActionScheduler;
pub use systems::*;
pub use world::Snapshot;
pub use api::SimWorld;
