//! Snapshot — the read-only view of live simulation state handed to the
//! protocol layer (`entity_sync`), save/restore, and the Godot bridge.
//!
//! Kept as a flat, fully-owned struct (no borrows into `World`) so it can
//! cross the `serde_json` boundary and live past the tick that produced it.

use serde::{Deserialize, Serialize};

use crate::components::{
    AiState, Combat, DeathPhase, DeathState, EntityId, Health, SquadId, Team, Transform, UnitType,
    Velocity,
};
use crate::ecs::EntityStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: u64,
    pub team: Team,
    pub squad_id: i64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation_y: f32,
    pub vx: f32,
    pub vz: f32,
    pub health: f32,
    pub health_max: f32,
    pub unit_collection: u32,
    pub unit_type_index: u32,
    pub ai_action_collection: i32,
    pub ai_action: i32,
    pub death_phase: DeathPhase,
}

/// Complete simulation state snapshot, sent as `entity_sync` on ready-up and
/// desync resync, and as the body of a save file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f64,
    pub units: Vec<UnitSnapshot>,
}

impl Snapshot {
    /// Build a snapshot from live entities, ascending by id.
    pub fn from_store(store: &mut EntityStore, tick: u64, time: f64) -> Self {
        let world = &store.world;
        let mut query = world.query::<(
            &EntityId,
            &Transform,
            &Velocity,
            &Health,
            &Team,
            &UnitType,
            &AiState,
            &Combat,
            &SquadId,
            &DeathState,
        )>();

        let mut units: Vec<UnitSnapshot> = query
            .iter(world)
            .map(
                |(id, transform, velocity, health, team, unit_type, ai_state, _combat, squad_id, death_state)| {
                    UnitSnapshot {
                        id: id.0,
                        team: *team,
                        squad_id: squad_id.0,
                        x: crate::components::round6(transform.x),
                        y: crate::components::round6(transform.y),
                        z: crate::components::round6(transform.z),
                        rotation_y: crate::components::round6(transform.rotation_y),
                        vx: crate::components::round6(velocity.vx),
                        vz: crate::components::round6(velocity.vz),
                        health: health.current,
                        health_max: health.max,
                        unit_collection: unit_type.collection,
                        unit_type_index: unit_type.type_index,
                        ai_action_collection: ai_state.current_action_collection,
                        ai_action: ai_state.current_action,
                        death_phase: death_state.phase,
                    }
                },
            )
            .collect();
        units.sort_unstable_by_key(|u| u.id);

        Self { tick, time, units }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::*;

    fn spawn_unit(store: &mut EntityStore, x: f32, team: Team) -> u64 {
        let id = store.create_entity(None);
        store.add_component(id, Transform::new(x, 0.0, 0.0));
        store.add_component(id, Velocity::new(5.0));
        store.add_component(id, Health::new(100.0));
        store.add_component(id, team);
        store.add_component(id, UnitType { collection: 0, type_index: 1, abilities: vec![] });
        store.add_component(id, AiState::default());
        store.add_component(id, Combat::default());
        store.add_component(id, SquadId(0));
        store.add_component(id, DeathState::default());
        id
    }

    #[test]
    fn snapshot_is_sorted_by_id_and_rounds_fields() {
        let mut store = EntityStore::new();
        let b = spawn_unit(&mut store, 1.0000004, Team::Right);
        let a = spawn_unit(&mut store, 2.0, Team::Left);
        let snap = Snapshot::from_store(&mut store, 10, 0.5);
        assert_eq!(snap.units.len(), 2);
        assert!(a > b);
        assert_eq!(snap.units[0].id, b);
        assert_eq!(snap.units[1].id, a);
        assert_eq!(snap.units[0].x, 1.0);
    }

    #[test]
    fn to_json_round_trips_through_serde_json() {
        let mut store = EntityStore::new();
        spawn_unit(&mut store, 0.0, Team::Left);
        let snap = Snapshot::from_store(&mut store, 1, 0.0);
        let value = snap.to_json().unwrap();
        assert_eq!(value["tick"], 1);
        assert_eq!(value["units"].as_array().unwrap().len(), 1);
    }
}
