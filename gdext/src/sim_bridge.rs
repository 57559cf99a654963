//! SimWorldBridge - Godot class that wraps the Rust simulation.

use godot::prelude::*;
use tactics_core::protocol::SubmitPlacementRequest;
use tactics_core::squad::UnitSpec;
use tactics_core::{SimWorld, Team, UnitType};

fn team_from_id(team_id: i64) -> Team {
    if team_id == 0 {
        Team::Left
    } else {
        Team::Right
    }
}

/// Bridge class exposing the Rust simulation to Godot.
///
/// Usage in GDScript:
/// ```gdscript
/// var bridge = SimWorldBridge.new()
/// bridge.init_world()
/// bridge.step(delta)
/// var json = bridge.get_snapshot_json()
/// ```
#[derive(GodotClass)]
#[class(base=RefCounted)]
pub struct SimWorldBridge {
    base: Base<RefCounted>,
    sim: Option<SimWorld>,
}

#[godot_api]
impl IRefCounted for SimWorldBridge {
    fn init(base: Base<RefCounted>) -> Self {
        Self { base, sim: None }
    }
}

#[godot_api]
impl SimWorldBridge {
    /// Initialize the simulation world with the default terrain and config.
    #[func]
    fn init_world(&mut self) {
        self.sim = Some(SimWorld::new());
        godot_print!("[SimWorldBridge] world initialized");
    }

    /// Step the simulation forward by `delta` seconds.
    #[func]
    fn step(&mut self, delta: f64) {
        if let Some(ref mut sim) = self.sim {
            sim.step(delta);
        }
    }

    /// Current fixed-timestep tick count.
    #[func]
    fn get_current_tick(&self) -> i64 {
        self.sim.as_ref().map(|s| s.tick() as i64).unwrap_or(0)
    }

    /// Elapsed simulation time in seconds.
    #[func]
    fn get_current_time(&self) -> f64 {
        self.sim.as_ref().map(|s| s.current_time()).unwrap_or(0.0)
    }

    /// Current game phase as a string: "Lobby", "Placement", "Battle", "PostBattle".
    #[func]
    fn get_phase(&self) -> GString {
        match &self.sim {
            Some(sim) => GString::from(format!("{:?}", sim.coordinator.phase)),
            None => GString::from("Lobby"),
        }
    }

    /// The full unit snapshot, as JSON.
    #[func]
    fn get_snapshot_json(&mut self) -> GString {
        match &mut self.sim {
            Some(sim) => GString::from(sim.snapshot_json().as_str()),
            None => GString::from("{}"),
        }
    }

    /// Register a player with `team_id` (0=Left, 1=Right) and starting gold,
    /// then move the room into the placement phase.
    #[func]
    fn start_placement_phase(&mut self) {
        if let Some(ref mut sim) = self.sim {
            sim.coordinator.start_placement_phase();
        }
    }

    #[func]
    fn register_player(&mut self, player_id: i64, team_id: i64, starting_gold: f32) {
        if let Some(ref mut sim) = self.sim {
            sim.coordinator.players.register(player_id as u32, team_from_id(team_id), starting_gold);
        }
    }

    /// Submit a single-unit-type squad placement. Returns the
    /// `SubmittedPlacementResponse` as JSON.
    #[func]
    fn submit_placement(
        &mut self,
        player_id: i64,
        team_id: i64,
        grid_x: i32,
        grid_z: i32,
        cost: f32,
        round_placed: i64,
        is_building: bool,
        squad_size: i64,
        max_health: f32,
        damage: f32,
        range: f32,
        attack_cooldown: f32,
        max_speed: f32,
        radius: f32,
    ) -> GString {
        let Some(ref mut sim) = self.sim else { return GString::from("{}") };

        let team = team_from_id(team_id);
        let request = SubmitPlacementRequest {
            player_id: player_id as u32,
            team,
            grid_position: (grid_x, grid_z),
            cells: vec![(grid_x, grid_z)],
            cost,
            round_placed: round_placed as u32,
            is_building,
        };
        let spec = UnitSpec {
            unit_type: UnitType::default(),
            max_health,
            damage,
            range,
            attack_cooldown,
            max_speed,
            radius,
        };
        let specs = vec![spec; squad_size.max(1) as usize];
        let response = sim.coordinator.submit_placement(&request, &specs);
        GString::from(serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string()))
    }

    /// Mark `player_id` ready; once `total_players` are ready the room moves
    /// to the battle phase. Returns `ReadyForBattleUpdate` as JSON.
    #[func]
    fn mark_ready(&mut self, player_id: i64, total_players: i64) -> GString {
        let Some(ref mut sim) = self.sim else { return GString::from("{}") };
        let snapshot_json = sim.snapshot_json();
        let update = sim.coordinator.mark_ready(player_id as u32, total_players as usize, || {
            serde_json::from_str(&snapshot_json).unwrap_or(serde_json::Value::Null)
        });
        GString::from(serde_json::to_string(&update).unwrap_or_else(|_| "{}".to_string()))
    }

    /// Undo the most recent placement submitted by `player_id`. Returns true on success.
    #[func]
    fn undo_placement(&mut self, player_id: i64) -> bool {
        self.sim.as_mut().map(|sim| sim.coordinator.undo_placement(player_id as u32).is_ok()).unwrap_or(false)
    }

    /// Purchase an upgrade; returns the player's remaining gold, or -1.0 on failure.
    #[func]
    fn purchase_upgrade(&mut self, player_id: i64, upgrade_id: GString, cost: f32) -> f32 {
        self.sim
            .as_mut()
            .and_then(|sim| sim.coordinator.purchase_upgrade(player_id as u32, &upgrade_id.to_string(), cost).ok())
            .unwrap_or(-1.0)
    }

    /// Cancel a building under construction; returns the player's remaining gold, or -1.0 on failure.
    #[func]
    fn cancel_building(&mut self, player_id: i64, building_entity_id: i64, refund: f32) -> f32 {
        self.sim
            .as_mut()
            .and_then(|sim| sim.coordinator.cancel_building(player_id as u32, building_entity_id as u64, refund).ok())
            .unwrap_or(-1.0)
    }

    /// Cast Shadow Strike from `caster`; returns the scheduled action id, or -1 if no target.
    #[func]
    fn cast_shadow_strike(&mut self, caster: i64, cast_time: f64) -> i64 {
        self.sim.as_mut().and_then(|sim| sim.cast_shadow_strike(caster as u64, cast_time)).map(|id| id as i64).unwrap_or(-1)
    }

    /// Cast Meteor from `caster`; returns the impact target entity id, or -1 if no target.
    #[func]
    fn cast_meteor(&mut self, caster: i64, splash_radius: f32, cast_time: f64, delay: f64) -> i64 {
        self.sim
            .as_mut()
            .and_then(|sim| sim.cast_meteor(caster as u64, splash_radius, cast_time, delay))
            .map(|(target, _)| target as i64)
            .unwrap_or(-1)
    }

    /// Cast Chain Lightning from `caster`; returns the bounce order as a
    /// JSON array of entity ids.
    #[func]
    fn cast_chain_lightning(
        &mut self,
        caster: i64,
        max_jumps: i64,
        jump_range: f32,
        base_damage: f32,
        damage_reduction: f32,
        cast_time: f64,
    ) -> GString {
        let Some(ref mut sim) = self.sim else { return GString::from("[]") };
        let path = sim.cast_chain_lightning(caster as u64, max_jumps.max(0) as u32, jump_range, base_damage, damage_reduction, cast_time);
        GString::from(serde_json::to_string(&path).unwrap_or_else(|_| "[]".to_string()))
    }

    /// Apply a crater at `(x, z)`.
    #[func]
    fn spawn_crater(&mut self, x: f32, z: f32, radius: f32, depth: f32) {
        if let Some(ref mut sim) = self.sim {
            sim.apply_crater(x, z, radius, depth);
        }
    }

    /// Terrain snapshot as JSON (heights, types, craters).
    #[func]
    fn get_terrain_json(&self) -> GString {
        match &self.sim {
            Some(sim) => GString::from(sim.terrain_snapshot_json().as_str()),
            None => GString::from("{}"),
        }
    }

    /// Movement speed multiplier at `(x, z)`.
    #[func]
    fn get_movement_multiplier(&self, x: f32, z: f32) -> f32 {
        self.sim.as_ref().map(|s| s.terrain().get_movement_multiplier(x, z)).unwrap_or(1.0)
    }

    /// Cover value at `(x, z)`.
    #[func]
    fn get_cover_at(&self, x: f32, z: f32) -> f32 {
        self.sim.as_ref().map(|s| s.terrain().get_cover_at(x, z)).unwrap_or(0.0)
    }

    /// Terrain height at `(x, z)`.
    #[func]
    fn get_height_at(&self, x: f32, z: f32) -> f32 {
        self.sim.as_ref().map(|s| s.terrain().get_height_at(x, z)).unwrap_or(0.0)
    }

    /// Whether the simulation has been initialized.
    #[func]
    fn is_initialized(&self) -> bool {
        self.sim.is_some()
    }

    /// Number of live units in the simulation.
    #[func]
    fn get_unit_count(&mut self) -> i32 {
        match &mut self.sim {
            Some(sim) => sim.snapshot().units.len() as i32,
            None => 0,
        }
    }
}
