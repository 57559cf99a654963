//! Godot Integration Bridge
//!
//! This module provides the interface between the Rust ECS simulation and Godot/GDExtension.
//! It handles conversion of simulation state into FFI-friendly formats for efficient
//! cross-language communication.
//!
//! # Stable FFI Contract
//!
//! This module defines a **stable binary format** for transferring simulation state to Godot.
//! The format is designed for:
//! - **Efficiency**: Contiguous f32 array, no allocations on the Godot side
//! - **Simplicity**: Fixed stride, predictable layout
//! - **Stability**: Field order and count are versioned and documented
//!
//! # Buffer Layout (Version 2.0)
//!
//! The flat buffer is a `Vec<f32>` with the following structure:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ HEADER (1 element)                                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ [0] unit_count (as f32)                                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ UNIT DATA (unit_count × UNIT_STRIDE elements)                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ For each unit i (offset = 1 + i * UNIT_STRIDE):                 │
//! │   [+0]  id                    - Entity ID (u64 as f32)          │
//! │   [+1]  team_id                - Team (0.0=Left, 1.0=Right)      │
//! │   [+2]  squad_id               - Squad ID (i64 as f32)           │
//! │   [+3]  x                      - X position (world units)       │
//! │   [+4]  y                      - Y position (world units)       │
//! │   [+5]  z                      - Z position (world units)       │
//! │   [+6]  rotation_y              - Yaw, radians                    │
//! │   [+7]  vx                     - X velocity (units/sec)          │
//! │   [+8]  vz                     - Z velocity (units/sec)          │
//! │   [+9]  health                 - Current health points           │
//! │   [+10] health_max              - Maximum health points           │
//! │   [+11] unit_collection         - Unit-type collection index      │
//! │   [+12] unit_type_index         - Unit-type index within collection│
//! │   [+13] ai_action_collection    - Active behavior-tree collection │
//! │   [+14] ai_action               - Active behavior-tree leaf       │
//! │   [+15] death_phase             - 0=Alive, 1=Dying, 2=Corpse      │
//! │   [+16] is_alive                - Alive flag (1.0=alive, 0.0=dead)│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Constants
//!
//! - `UNIT_STRIDE = 17` - Number of f32 values per unit
//! - `HEADER_SIZE = 1` - Number of f32 values in header
//!
//! # Team ID Mapping
//!
//! | Team  | ID  |
//! |-------|-----|
//! | Left  | 0.0 |
//! | Right | 1.0 |
//!
//! # Death Phase Mapping
//!
//! | Phase  | ID  |
//! |--------|-----|
//! | Alive  | 0.0 |
//! | Dying  | 1.0 |
//! | Corpse | 2.0 |
//!
//! # Usage from Godot (GDScript)
//!
//! ```gdscript
//! const UNIT_STRIDE = 17
//! const HEADER_SIZE = 1
//!
//! func parse_snapshot(buffer: PackedFloat32Array):
//!     var unit_count = int(buffer[0])
//!     for i in range(unit_count):
//!         var offset = HEADER_SIZE + i * UNIT_STRIDE
//!         var unit_id = int(buffer[offset + 0])
//!         var x = buffer[offset + 3]
//!         var z = buffer[offset + 5]
//!         var team = int(buffer[offset + 1])  # 0=Left, 1=Right
//!         var health = buffer[offset + 9]
//!         var is_alive = buffer[offset + 16] > 0.5
//!         # ... update visual representation
//! ```
//!
//! # Determinism
//!
//! The buffer is deterministic: given the same `Snapshot`, the output is identical.
//! Units are serialized in the snapshot's existing order (ascending entity id).

use crate::components::DeathPhase;
use crate::world::Snapshot;

// ============================================================================
// CONSTANTS - STABLE FFI CONTRACT
// ============================================================================

/// Number of f32 values per unit in the flat buffer.
///
/// **This is part of the stable FFI contract. Do not change without versioning.**
///
/// Fields (in order):
/// 0. id, 1. team_id, 2. squad_id, 3. x, 4. y, 5. z, 6. rotation_y,
/// 7. vx, 8. vz, 9. health, 10. health_max, 11. unit_collection,
/// 12. unit_type_index, 13. ai_action_collection, 14. ai_action,
/// 15. death_phase, 16. is_alive
pub const UNIT_STRIDE: usize = 17;

/// Number of f32 values in the buffer header. Currently just unit_count.
pub const HEADER_SIZE: usize = 1;

// Team ID constants for FFI.
pub const TEAM_LEFT: f32 = 0.0;
pub const TEAM_RIGHT: f32 = 1.0;

// Death phase constants for FFI.
pub const DEATH_PHASE_ALIVE: f32 = 0.0;
pub const DEATH_PHASE_DYING: f32 = 1.0;
pub const DEATH_PHASE_CORPSE: f32 = 2.0;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert a team's index (§`Team::index`) to its FFI numeric ID.
#[inline]
pub fn team_to_id(team_index: u8) -> f32 {
    match team_index {
        0 => TEAM_LEFT,
        _ => TEAM_RIGHT,
    }
}

/// Convert a death phase to its FFI numeric ID.
#[inline]
pub fn death_phase_to_id(phase: DeathPhase) -> f32 {
    match phase {
        DeathPhase::Alive => DEATH_PHASE_ALIVE,
        DeathPhase::Dying => DEATH_PHASE_DYING,
        DeathPhase::Corpse => DEATH_PHASE_CORPSE,
    }
}

/// A unit counts as alive for FFI purposes while its health is positive,
/// independent of `death_phase` (a unit may linger as a corpse with 0 HP).
#[inline]
fn is_alive(health: f32) -> f32 {
    if health > 0.0 {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// MAIN SERIALIZATION FUNCTION
// ============================================================================

/// Convert a simulation snapshot to a flat buffer for FFI transfer to Godot.
///
/// # Buffer Format
///
/// See module-level documentation for the complete buffer layout.
///
/// # Determinism
///
/// This function is deterministic: the same `Snapshot` always produces the
/// same output buffer. Units are serialized in the snapshot's existing
/// (ascending-id) order.
///
/// # Example
///
/// ```rust
/// use tactics_core::api::SimWorld;
/// use tactics_core::godot_bridge::{snapshot_to_flatbuffer, UNIT_STRIDE, HEADER_SIZE};
///
/// let mut sim = SimWorld::new();
/// let snapshot = sim.snapshot();
/// let buffer = snapshot_to_flatbuffer(&snapshot);
///
/// let unit_count = buffer[0] as usize;
/// assert_eq!(buffer.len(), HEADER_SIZE + unit_count * UNIT_STRIDE);
/// ```
pub fn snapshot_to_flatbuffer(snapshot: &Snapshot) -> Vec<f32> {
    let unit_count = snapshot.units.len();
    let buffer_size = HEADER_SIZE + unit_count * UNIT_STRIDE;

    let mut buffer = Vec::with_capacity(buffer_size);
    buffer.push(unit_count as f32);

    for unit in &snapshot.units {
        buffer.push(unit.id as f32);
        buffer.push(team_to_id(unit.team.index()));
        buffer.push(unit.squad_id as f32);
        buffer.push(unit.x);
        buffer.push(unit.y);
        buffer.push(unit.z);
        buffer.push(unit.rotation_y);
        buffer.push(unit.vx);
        buffer.push(unit.vz);
        buffer.push(unit.health);
        buffer.push(unit.health_max);
        buffer.push(unit.unit_collection as f32);
        buffer.push(unit.unit_type_index as f32);
        buffer.push(unit.ai_action_collection as f32);
        buffer.push(unit.ai_action as f32);
        buffer.push(death_phase_to_id(unit.death_phase));
        buffer.push(is_alive(unit.health));
    }

    debug_assert_eq!(buffer.len(), buffer_size, "Buffer size mismatch");
    buffer
}

/// Calculate the required buffer size for a given unit count.
///
/// # Formula
/// `HEADER_SIZE + unit_count * UNIT_STRIDE`
#[inline]
pub fn calculate_buffer_size(unit_count: usize) -> usize {
    HEADER_SIZE + unit_count * UNIT_STRIDE
}

/// Parse the unit count from a flat buffer. Returns `None` if the buffer is empty.
#[inline]
pub fn parse_unit_count(buffer: &[f32]) -> Option<usize> {
    if buffer.is_empty() {
        return None;
    }
    Some(buffer[0] as usize)
}

/// Get the buffer offset for a specific unit index.
///
/// # Example
/// ```rust
/// use tactics_core::godot_bridge::unit_offset;
///
/// let offset = unit_offset(0); // First unit at offset 1
/// let offset = unit_offset(5); // Sixth unit
/// ```
#[inline]
pub const fn unit_offset(unit_index: usize) -> usize {
    HEADER_SIZE + unit_index * UNIT_STRIDE
}

// ============================================================================
// FIELD OFFSET CONSTANTS (for Godot-side parsing)
// ============================================================================

pub const FIELD_ID: usize = 0;
pub const FIELD_TEAM: usize = 1;
pub const FIELD_SQUAD_ID: usize = 2;
pub const FIELD_X: usize = 3;
pub const FIELD_Y: usize = 4;
pub const FIELD_Z: usize = 5;
pub const FIELD_ROTATION_Y: usize = 6;
pub const FIELD_VX: usize = 7;
pub const FIELD_VZ: usize = 8;
pub const FIELD_HEALTH: usize = 9;
pub const FIELD_HEALTH_MAX: usize = 10;
pub const FIELD_UNIT_COLLECTION: usize = 11;
pub const FIELD_UNIT_TYPE_INDEX: usize = 12;
pub const FIELD_AI_ACTION_COLLECTION: usize = 13;
pub const FIELD_AI_ACTION: usize = 14;
pub const FIELD_DEATH_PHASE: usize = 15;
pub const FIELD_IS_ALIVE: usize = 16;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SimWorld;
    use crate::components::{Team, UnitType};
    use crate::grid::TileAttributes;
    use crate::protocol::SubmitPlacementRequest;
    use crate::squad::UnitSpec;
    use crate::systems::SimConfig;
    use crate::terrain::TerrainGrid;

    fn open_world(tiles_wide: usize) -> SimWorld {
        let terrain = TerrainGrid::new(tiles_wide, tiles_wide, 2.0);
        let mut sim = SimWorld::with_config(SimConfig::default(), terrain);
        let (w, h) = (sim.coordinator.tiles.width, sim.coordinator.tiles.height);
        for z in 0..h {
            for x in 0..w {
                sim.coordinator.tiles.set(x, z, TileAttributes { walkable: true, buildable: true });
            }
        }
        sim
    }

    fn place_squad(sim: &mut SimWorld, player_id: u32, team: Team, cell: (i32, i32)) -> Vec<u64> {
        sim.coordinator.players.register(player_id, team, 1000.0);
        let response = sim.coordinator.submit_placement(
            &SubmitPlacementRequest {
                player_id,
                team,
                grid_position: cell,
                cells: vec![cell],
                cost: 0.0,
                round_placed: 0,
                is_building: false,
            },
            &[UnitSpec {
                unit_type: UnitType::default(),
                max_health: 50.0,
                damage: 5.0,
                range: 10.0,
                attack_cooldown: 1.0,
                max_speed: 5.0,
                radius: 0.5,
            }],
        );
        assert!(response.success);
        response.squad_units
    }

    #[test]
    fn snapshot_to_flatbuffer_empty() {
        let mut sim = SimWorld::new();
        let snapshot = sim.snapshot();
        let buffer = snapshot_to_flatbuffer(&snapshot);

        assert_eq!(buffer.len(), HEADER_SIZE);
        assert_eq!(buffer[0], 0.0);
    }

    #[test]
    fn snapshot_to_flatbuffer_with_units() {
        let mut sim = open_world(32);
        sim.coordinator.start_placement_phase();
        place_squad(&mut sim, 1, Team::Left, (2, 2));
        place_squad(&mut sim, 2, Team::Right, (10, 10));

        let snapshot = sim.snapshot();
        let buffer = snapshot_to_flatbuffer(&snapshot);

        let unit_count = 2;
        assert_eq!(buffer.len(), HEADER_SIZE + unit_count * UNIT_STRIDE);
        assert_eq!(buffer[0], unit_count as f32);

        let offset = unit_offset(0);
        assert_eq!(buffer[offset + FIELD_TEAM], TEAM_LEFT);
        assert_eq!(buffer[offset + FIELD_IS_ALIVE], 1.0);

        let offset = unit_offset(1);
        assert_eq!(buffer[offset + FIELD_TEAM], TEAM_RIGHT);
    }

    #[test]
    fn snapshot_to_flatbuffer_determinism() {
        let mut sim1 = open_world(16);
        sim1.coordinator.start_placement_phase();
        place_squad(&mut sim1, 1, Team::Left, (2, 2));

        let mut sim2 = open_world(16);
        sim2.coordinator.start_placement_phase();
        place_squad(&mut sim2, 1, Team::Left, (2, 2));

        let buffer1 = snapshot_to_flatbuffer(&sim1.snapshot());
        let buffer2 = snapshot_to_flatbuffer(&sim2.snapshot());

        assert_eq!(buffer1, buffer2, "buffers are not identical - determinism violated");
    }

    #[test]
    fn snapshot_to_flatbuffer_after_simulation() {
        let mut sim = open_world(32);
        sim.coordinator.start_placement_phase();
        place_squad(&mut sim, 1, Team::Left, (2, 2));
        place_squad(&mut sim, 2, Team::Right, (40, 2));
        sim.coordinator.mark_ready(1, 2, || serde_json::Value::Null);
        sim.coordinator.mark_ready(2, 2, || serde_json::Value::Null);

        let fixed = sim.coordinator.store.world.resource::<SimConfig>().fixed_timestep as f64;
        for _ in 0..10 {
            sim.step(fixed);
        }

        let snapshot = sim.snapshot();
        let buffer = snapshot_to_flatbuffer(&snapshot);
        let unit_count = buffer[0] as usize;
        assert_eq!(buffer.len(), HEADER_SIZE + unit_count * UNIT_STRIDE);

        for i in 0..unit_count {
            let offset = unit_offset(i);
            let health = buffer[offset + FIELD_HEALTH];
            let health_max = buffer[offset + FIELD_HEALTH_MAX];
            assert!(health <= health_max, "health exceeds max for unit {i}");
            let expected_alive = if health > 0.0 { 1.0 } else { 0.0 };
            assert_eq!(buffer[offset + FIELD_IS_ALIVE], expected_alive, "is_alive mismatch for unit {i}");
        }
    }

    #[test]
    fn calculate_buffer_size_matches_formula() {
        assert_eq!(calculate_buffer_size(0), HEADER_SIZE);
        assert_eq!(calculate_buffer_size(1), HEADER_SIZE + UNIT_STRIDE);
        assert_eq!(calculate_buffer_size(100), HEADER_SIZE + 100 * UNIT_STRIDE);
    }

    #[test]
    fn parse_unit_count_handles_empty_buffer() {
        let buffer: Vec<f32> = vec![];
        assert_eq!(parse_unit_count(&buffer), None);

        let buffer = vec![5.0];
        assert_eq!(parse_unit_count(&buffer), Some(5));
    }

    #[test]
    fn unit_offset_matches_formula() {
        assert_eq!(unit_offset(0), HEADER_SIZE);
        assert_eq!(unit_offset(1), HEADER_SIZE + UNIT_STRIDE);
        assert_eq!(unit_offset(10), HEADER_SIZE + 10 * UNIT_STRIDE);
    }

    #[test]
    fn team_to_id_mapping() {
        assert_eq!(team_to_id(Team::Left.index()), TEAM_LEFT);
        assert_eq!(team_to_id(Team::Right.index()), TEAM_RIGHT);
    }

    #[test]
    fn death_phase_to_id_mapping() {
        assert_eq!(death_phase_to_id(DeathPhase::Alive), DEATH_PHASE_ALIVE);
        assert_eq!(death_phase_to_id(DeathPhase::Dying), DEATH_PHASE_DYING);
        assert_eq!(death_phase_to_id(DeathPhase::Corpse), DEATH_PHASE_CORPSE);
    }

    #[test]
    fn field_offsets_are_within_stride() {
        assert!(FIELD_ID < UNIT_STRIDE);
        assert!(FIELD_TEAM < UNIT_STRIDE);
        assert!(FIELD_SQUAD_ID < UNIT_STRIDE);
        assert!(FIELD_X < UNIT_STRIDE);
        assert!(FIELD_Y < UNIT_STRIDE);
        assert!(FIELD_Z < UNIT_STRIDE);
        assert!(FIELD_ROTATION_Y < UNIT_STRIDE);
        assert!(FIELD_VX < UNIT_STRIDE);
        assert!(FIELD_VZ < UNIT_STRIDE);
        assert!(FIELD_HEALTH < UNIT_STRIDE);
        assert!(FIELD_HEALTH_MAX < UNIT_STRIDE);
        assert!(FIELD_UNIT_COLLECTION < UNIT_STRIDE);
        assert!(FIELD_UNIT_TYPE_INDEX < UNIT_STRIDE);
        assert!(FIELD_AI_ACTION_COLLECTION < UNIT_STRIDE);
        assert!(FIELD_AI_ACTION < UNIT_STRIDE);
        assert!(FIELD_DEATH_PHASE < UNIT_STRIDE);
        assert!(FIELD_IS_ALIVE < UNIT_STRIDE);
        assert_eq!(UNIT_STRIDE, FIELD_IS_ALIVE + 1);
    }
}
