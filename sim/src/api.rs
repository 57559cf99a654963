//! Public API for the simulation.
//!
//! This module provides the main interface for Godot (or any other client)
//! to interact with the simulation.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed. This ensures deterministic behavior regardless of
//! frame rate.
//!
//! ## Gameplay systems vs. bevy systems
//!
//! Most of the gameplay pipeline (`behavior`, `movement`, `combat`,
//! `abilities`, `animation`, `desync`) is written as pure functions over
//! plain data rather than `bevy_ecs` systems, so `tick_once` gathers
//! component data out of the `World` by hand, calls those functions, and
//! writes the results back. Only the ambient bookkeeping — spatial index,
//! LOD/sector/activity flags, lifetime expiry — runs as a genuine bevy
//! `Schedule`, since those only ever read and write their own components.
//! Gameplay only runs during `GamePhase::Battle`; placement and lobby ticks
//! still advance the clock and the ambient schedule, but units don't act.

use std::collections::HashMap;

use bevy_ecs::prelude::*;

use crate::abilities;
use crate::animation::{self, ClipState};
use crate::behavior::{self, BehaviorRegistry};
use crate::combat;
use crate::components::*;
use crate::desync::{self, DesyncDetector};
use crate::grid::{spatial_index_update_system, PlacementGrid, SpatialIndex, PLACEMENT_TO_TERRAIN_RATIO};
use crate::lifetime::lifetime_expiry_system;
use crate::movement;
use crate::protocol::{GamePhase, ProtocolCoordinator};
use crate::scheduler::{ActionParams, ActionScheduler};
use crate::squad::{self, UnitSpec};
use crate::systems::{activity_flags_system, lod_assignment_system, sector_assignment_system, SimConfig, SimTick};
use crate::terrain::{TerrainGrid, TerrainSnapshot};
use crate::world::Snapshot;

fn normalized(v: (f32, f32)) -> (f32, f32) {
    let len = (v.0 * v.0 + v.1 * v.1).sqrt();
    if len < 1e-6 {
        (0.0, 0.0)
    } else {
        (v.0 / len, v.1 / len)
    }
}

/// Whether `ai_state`'s current action is the `AttackEnemy` leaf, the only
/// leaf that drives `combat.rs`'s attack loop.
fn is_attack_action(registry: &BehaviorRegistry, ai_state: AiState) -> bool {
    if ai_state.current_action_collection != behavior::ACTIONS_COLLECTION {
        return false;
    }
    registry
        .actions
        .get(ai_state.current_action as usize)
        .map(|action| action.kind == behavior::LeafKind::AttackEnemy)
        .unwrap_or(false)
}

/// The main simulation world container.
///
/// Owns the `ProtocolCoordinator` (phase, ECS, placement grid, player
/// economy), the terrain heightmap, the behavior tree registry, an ambient
/// `Schedule`, per-entity animation state, and the desync detector. One
/// instance per room/match.
pub struct SimWorld {
    pub coordinator: ProtocolCoordinator,
    pub terrain: TerrainGrid,
    pub behavior_registry: BehaviorRegistry,
    pub desync: DesyncDetector,
    schedule: Schedule,
    animations: HashMap<u64, ClipState>,
    accumulator: f64,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// A 200x200 open battlefield with the teacher's default terrain
    /// features (central road, forest patches, rough ground) and default
    /// `SimConfig`.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default(), TerrainGrid::new_with_features(200, 200, 2.0))
    }

    pub fn with_config(config: SimConfig, terrain: TerrainGrid) -> Self {
        let tiles = terrain.to_tile_map();
        let placement_cell_size = terrain.cell_size / PLACEMENT_TO_TERRAIN_RATIO as f32;
        let placement_grid = PlacementGrid::new(
            placement_cell_size,
            tiles.width * PLACEMENT_TO_TERRAIN_RATIO,
            tiles.height * PLACEMENT_TO_TERRAIN_RATIO,
        );

        let mut coordinator = ProtocolCoordinator::new(tiles, placement_grid);
        coordinator.store.world.insert_resource(SpatialIndex::new(config.sector_size.max(10.0)));
        coordinator.store.world.insert_resource(ActionScheduler::new());
        coordinator.store.world.insert_resource(SimTick::default());
        coordinator.store.world.insert_resource(config);

        let mut schedule = Schedule::default();
        schedule.add_systems((
            spatial_index_update_system,
            lod_assignment_system,
            activity_flags_system,
            sector_assignment_system,
            lifetime_expiry_system,
        ));

        tracing::debug!("sim world constructed, ambient schedule has 5 systems");

        Self {
            coordinator,
            terrain,
            behavior_registry: BehaviorRegistry::standard(),
            desync: DesyncDetector::new(),
            schedule,
            animations: HashMap::new(),
            accumulator: 0.0,
        }
    }

    fn config(&self) -> SimConfig {
        self.coordinator.store.world.resource::<SimConfig>().clone()
    }

    pub fn tick(&self) -> u64 {
        self.coordinator.store.world.resource::<SimTick>().tick
    }

    pub fn current_time(&self) -> f64 {
        self.coordinator.now
    }

    /// Accumulates `dt` and runs as many fixed-timestep ticks as have become
    /// due, then ages the terrain (crater cooldown isn't tied to sim ticks).
    pub fn step(&mut self, dt: f64) {
        self.accumulator += dt;
        let fixed = self.config().fixed_timestep as f64;
        if fixed <= 0.0 {
            return;
        }
        while self.accumulator >= fixed {
            self.tick_once(fixed);
            self.accumulator -= fixed;
        }
        self.terrain.update(dt as f32);
    }

    fn tick_once(&mut self, dt: f64) {
        self.coordinator.store.world.resource_mut::<SimTick>().advance(dt);
        self.schedule.run(&mut self.coordinator.store.world);
        self.coordinator.now = self.coordinator.store.world.resource::<SimTick>().now;

        if self.coordinator.phase == GamePhase::Battle {
            self.run_behavior();
            self.run_movement(dt as f32);
            self.run_combat();
            self.run_due_actions();
            self.run_animation(dt as f32);
        }
        self.run_desync_check();
    }

    // ------------------------------------------------------------------
    // Battle-phase pipeline. Each stage gathers the components it needs out
    // of `EntityStore` by hand and writes results back, since the pipeline
    // itself is a set of pure functions, not bevy systems.
    // ------------------------------------------------------------------

    fn run_behavior(&mut self) {
        let now = self.coordinator.now;
        let ids = self.coordinator.store.entities_with::<AIControlled>();

        let mut entities = Vec::with_capacity(ids.len());
        let mut ai_states: HashMap<u64, AiState> = HashMap::new();
        let mut metas: HashMap<u64, BehaviorMeta> = HashMap::new();
        let mut unit_types: HashMap<u64, UnitType> = HashMap::new();
        let mut ability_states: HashMap<u64, AbilityState> = HashMap::new();
        for &id in &ids {
            let transform = self.coordinator.store.get_component::<Transform>(id).unwrap_or_default();
            let team = self.coordinator.store.get_component::<Team>(id).unwrap_or_default();
            let combat = self.coordinator.store.get_component::<Combat>(id).unwrap_or_default();
            entities.push((id, transform, team, combat));
            ai_states.insert(id, self.coordinator.store.get_component::<AiState>(id).unwrap_or_default());
            metas.insert(id, self.coordinator.store.get_component::<BehaviorMeta>(id).unwrap_or_default());
            unit_types.insert(id, self.coordinator.store.get_component::<UnitType>(id).unwrap_or_default());
            ability_states.insert(id, self.coordinator.store.get_component::<AbilityState>(id).unwrap_or_default());
        }

        let transform_by_id: HashMap<u64, Transform> = entities.iter().map(|&(id, t, _, _)| (id, t)).collect();
        let team_by_id: HashMap<u64, Team> = entities.iter().map(|&(id, _, team, _)| (id, team)).collect();
        // The spatial index is bucketed by sector, not by combat range; scan
        // the whole arena rather than pick a range that might miss a unit
        // standing just past an ability's reach.
        let scan_radius = self.config().arena_half_size * 2.0;
        let index = self.coordinator.store.world.resource::<SpatialIndex>();

        let nearby_enemies_of = |id: u64| -> Vec<(u64, Transform)> {
            let Some(&pos) = transform_by_id.get(&id) else { return Vec::new() };
            let team = team_by_id.get(&id).copied().unwrap_or_default();
            index
                .nearby_enemies((pos.x, pos.z), scan_radius, id, team)
                .into_iter()
                .filter_map(|enemy_id| transform_by_id.get(&enemy_id).map(|&t| (enemy_id, t)))
                .collect()
        };

        // Units whose ability gate fired this tick, queued for the real
        // `abilities::cast_*` dispatch once this function's borrow of
        // `SpatialIndex` is done with.
        let mut cast_queue: Vec<(u64, AbilitySlot)> = Vec::new();
        let cast_ability_action = self.behavior_registry.cast_ability_action();

        behavior::behavior_executor_system(
            &self.behavior_registry,
            now,
            &entities,
            &mut ai_states,
            &mut metas,
            nearby_enemies_of,
            |entity_id, ability_index, ctx| {
                let action_ref = cast_ability_action?;
                let slot = unit_types.get(&entity_id)?.abilities.get(ability_index)?.clone();
                let state = ability_states.get(&entity_id)?;
                if !state.is_ready(ability_index, &slot, now) {
                    return Some((ActionStatus::Failure, action_ref));
                }
                let in_range = ctx.nearby_enemies.iter().any(|&(_, t)| ctx.transform.distance_to(&t) <= slot.range);
                if !in_range {
                    return Some((ActionStatus::Failure, action_ref));
                }
                ability_states.get_mut(&entity_id).unwrap().commit_cast(ability_index, &slot, now);
                cast_queue.push((entity_id, slot));
                Some((ActionStatus::Running, action_ref))
            },
        );

        for &id in &ids {
            if let Some(state) = ai_states.remove(&id) {
                self.coordinator.store.add_component(id, state);
            }
            if let Some(meta) = metas.remove(&id) {
                self.coordinator.store.add_component(id, meta);
            }
            if let Some(ability_state) = ability_states.remove(&id) {
                self.coordinator.store.add_component(id, ability_state);
            }
        }

        for (caster, slot) in cast_queue {
            self.dispatch_ability_cast(caster, &slot);
        }
    }

    /// Executes an ability slot the behavior tree's gate just approved, via
    /// the same `abilities::cast_*` entry points the host-driven
    /// `cast_shadow_strike`/`cast_meteor`/`cast_chain_lightning` methods use.
    fn dispatch_ability_cast(&mut self, caster: u64, slot: &AbilitySlot) {
        match slot.kind {
            AbilityKind::ShadowStrike => {
                self.cast_shadow_strike(caster, slot.cast_time);
            }
            AbilityKind::Meteor { splash_radius } => {
                self.cast_meteor(caster, splash_radius, slot.base_damage, slot.cast_time, 0.0);
            }
            AbilityKind::ChainLightning { max_jumps, jump_range, damage_reduction } => {
                self.cast_chain_lightning(caster, max_jumps, jump_range, slot.base_damage, damage_reduction, slot.cast_time);
            }
        }
    }

    fn run_movement(&mut self, dt: f32) {
        let config = self.config();
        let ids = self.coordinator.store.entities_with::<AIControlled>();

        let neighborhood: Vec<(u64, Transform, f32)> = ids
            .iter()
            .map(|&id| {
                let transform = self.coordinator.store.get_component::<Transform>(id).unwrap_or_default();
                let radius = self
                    .coordinator
                    .store
                    .get_component::<Collision>(id)
                    .map(|c| c.radius)
                    .unwrap_or(DEFAULT_UNIT_RADIUS);
                (id, transform, radius)
            })
            .collect();

        for &id in &ids {
            let Some(mut transform) = self.coordinator.store.get_component::<Transform>(id) else { continue };
            let Some(mut velocity) = self.coordinator.store.get_component::<Velocity>(id) else { continue };
            if velocity.anchored {
                continue;
            }
            let collision = self.coordinator.store.get_component::<Collision>(id).unwrap_or_default();
            let leaping = self.coordinator.store.get_component::<Leaping>(id).map(|l| l.is_leaping).unwrap_or(false);
            let meta = self.coordinator.store.get_component::<BehaviorMeta>(id).unwrap_or_default();
            let mut movement_state = self.coordinator.store.get_component::<MovementState>(id).unwrap_or_default();

            let speed = movement::desired_speed(velocity.max_speed, config.ai_speed_multiplier, config.default_ai_speed);
            let desired = match meta.target_position {
                Some(target) => movement::desired_velocity((transform.x, transform.z), target, speed),
                None => (0.0, 0.0),
            };

            let neighbor_search_radius = collision.radius * movement::SEPARATION_RADIUS_MULTIPLIER * 4.0;
            let neighbors: Vec<((f32, f32), f32)> = neighborhood
                .iter()
                .filter(|(other_id, _, _)| *other_id != id)
                .filter(|(_, other_transform, _)| transform.distance_to(other_transform) <= neighbor_search_radius)
                .map(|(_, other_transform, other_radius)| ((other_transform.x, other_transform.z), *other_radius))
                .collect();
            let separation = movement::separation_force((transform.x, transform.z), collision.radius, &neighbors);

            let mut committed_side = movement_state.avoidance_direction;
            let avoidance = movement::path_avoidance_force(
                (transform.x, transform.z),
                normalized(desired),
                &mut committed_side,
                // No occupancy grid is consulted on this path yet (see
                // DESIGN.md); path avoidance stays available for when one is.
                |_probe| false,
            );
            movement_state.avoidance_direction = committed_side;

            let (new_vx, new_vz) =
                movement::integrate_velocity((velocity.vx, velocity.vz), desired, separation, avoidance, &mut movement_state, velocity.max_speed);

            let terrain_height = self.terrain.get_height_at(transform.x, transform.z);
            let (new_pos, new_vel) = movement::apply_gravity_and_clamps(
                (transform.x, transform.y, transform.z),
                (new_vx, velocity.vy, new_vz),
                dt,
                config.gravity,
                velocity.affected_by_gravity,
                terrain_height,
                config.arena_half_size,
                collision.radius,
                leaping,
            );

            transform.x = new_pos.0;
            transform.y = new_pos.1;
            transform.z = new_pos.2;
            velocity.vx = new_vel.0;
            velocity.vy = new_vel.1;
            velocity.vz = new_vel.2;
            if movement_state.smoothed_direction != (0.0, 0.0) {
                transform.rotation_y = movement::rotation_from_direction(movement_state.smoothed_direction);
            }

            self.coordinator.store.add_component(id, transform);
            self.coordinator.store.add_component(id, velocity);
            self.coordinator.store.add_component(id, movement_state);
        }
    }

    fn run_combat(&mut self) {
        let now = self.coordinator.now;
        let ids = self.coordinator.store.entities_with::<AIControlled>();

        let mut hits: Vec<combat::ResolvedHit> = Vec::new();
        for &id in &ids {
            let Some(ai_state) = self.coordinator.store.get_component::<AiState>(id) else { continue };
            if !is_attack_action(&self.behavior_registry, ai_state) {
                continue;
            }
            let Some(meta) = self.coordinator.store.get_component::<BehaviorMeta>(id) else { continue };
            let Some(target_id) = meta.target_entity else { continue };
            let Some(mut attacker_combat) = self.coordinator.store.get_component::<Combat>(id) else { continue };
            let Some(attacker_pos) = self.coordinator.store.get_component::<Transform>(id) else { continue };
            let Some(target_pos) = self.coordinator.store.get_component::<Transform>(target_id) else { continue };

            // LOS is resolved by the caller elsewhere in the full game (e.g.
            // terrain cover/forest occlusion); this core treats it as clear
            // unless a future wiring pass threads `terrain.blocks_los` in.
            if !combat::can_attack(&attacker_combat, &attacker_pos, &target_pos, now, true) {
                continue;
            }
            attacker_combat.last_attack = now;
            self.coordinator.store.add_component(id, attacker_combat);
            hits.push(combat::resolve_attack(target_id, &attacker_combat, combat::DamageModifiers::none()));
        }

        for hit in hits {
            self.apply_hit(hit.target, hit.damage);
        }
    }

    fn apply_hit(&mut self, target: u64, damage: f32) {
        let Some(mut health) = self.coordinator.store.get_component::<Health>(target) else { return };
        health.damage(damage);
        let alive = health.is_alive();
        self.coordinator.store.add_component(target, health);
        if !alive {
            let mut death_state = self.coordinator.store.get_component::<DeathState>(target).unwrap_or_default();
            death_state.advance_to(DeathPhase::Dying);
            self.coordinator.store.add_component(target, death_state);
        }
    }

    fn run_due_actions(&mut self) {
        let now = self.coordinator.now;
        let due = {
            let mut scheduler = self.coordinator.store.world.resource_mut::<ActionScheduler>();
            scheduler.drain_due(now)
        };
        for action in due {
            match action.tag.as_str() {
                "shadow_strike_impact" => self.apply_shadow_strike_impact(&action.params),
                "meteor_impact" => self.apply_meteor_impact(&action.params),
                "chain_lightning_bounce" => self.apply_chain_lightning_bounce(&action.params),
                other => tracing::warn!(tag = other, "unknown scheduled action tag, skipping"),
            }
        }
    }

    fn apply_shadow_strike_impact(&mut self, params: &ActionParams) {
        let (Some(caster), Some(target), Some(teleport_pos)) = (params.entity, params.target, params.position) else { return };
        if let Some(mut transform) = self.coordinator.store.get_component::<Transform>(caster) {
            transform.x = teleport_pos.0;
            transform.z = teleport_pos.1;
            self.coordinator.store.add_component(caster, transform);
        }
        let Some(caster_combat) = self.coordinator.store.get_component::<Combat>(caster) else { return };
        let hit = combat::resolve_attack(target, &caster_combat, abilities::shadow_strike_damage_modifiers());
        self.apply_hit(hit.target, hit.damage);
    }

    fn apply_meteor_impact(&mut self, params: &ActionParams) {
        let (Some(caster), Some(impact_pos), Some(splash_radius), Some(base_damage)) =
            (params.entity, params.position, params.radius, params.amount)
        else {
            return;
        };
        let enemies = self.live_enemy_positions(self.team_of(caster));
        let hits = abilities::meteor_splash_damage(impact_pos, &enemies, splash_radius, base_damage);
        for (id, damage) in hits {
            self.apply_hit(id, damage);
        }
    }

    fn apply_chain_lightning_bounce(&mut self, params: &ActionParams) {
        let (Some(target), Some(damage)) = (params.target, params.amount) else { return };
        self.apply_hit(target, damage);
    }

    fn run_animation(&mut self, dt: f32) {
        let ids = self.coordinator.store.entities_with::<AIControlled>();
        for &id in &ids {
            let Some(health) = self.coordinator.store.get_component::<Health>(id) else { continue };
            let Some(velocity) = self.coordinator.store.get_component::<Velocity>(id) else { continue };
            let Some(ai_state) = self.coordinator.store.get_component::<AiState>(id) else { continue };
            let is_dead = !health.is_alive();
            let is_attacking = is_attack_action(&self.behavior_registry, ai_state);
            let speed = velocity.horizontal_magnitude();

            let state = self.animations.entry(id).or_default();
            let desired = animation::desired_clip(is_dead, ai_state.status, false, is_attacking, speed);
            animation::advance_clip(state, desired, 1.0, dt);
        }
    }

    fn run_desync_check(&mut self) {
        let ids = self.coordinator.store.entities_with::<Health>();
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let transform = self.coordinator.store.get_component::<Transform>(id).unwrap_or_default();
            let velocity = self.coordinator.store.get_component::<Velocity>(id).unwrap_or_default();
            let health = self.coordinator.store.get_component::<Health>(id).unwrap_or(Health::new(0.0));
            let team = self.coordinator.store.get_component::<Team>(id).unwrap_or_default();
            let ai_state = self.coordinator.store.get_component::<AiState>(id).unwrap_or_default();
            entries.push(desync::DesyncEntry { entity_id: id, transform, velocity, health, team, ai_state });
        }
        self.desync.record_local(desync::canonical_state_hash(&entries));
    }

    fn team_of(&self, id: u64) -> Team {
        self.coordinator.store.get_component::<Team>(id).unwrap_or_default()
    }

    fn live_enemy_positions(&mut self, team: Team) -> Vec<(u64, (f32, f32))> {
        let ids = self.coordinator.store.entities_with::<Health>();
        ids.into_iter()
            .filter(|&id| self.coordinator.store.get_component::<Team>(id).map(|t| t != team).unwrap_or(false))
            .filter(|&id| self.coordinator.store.get_component::<Health>(id).map(|h| h.is_alive()).unwrap_or(false))
            .filter_map(|id| self.coordinator.store.get_component::<Transform>(id).map(|t| (id, (t.x, t.z))))
            .collect()
    }

    // ------------------------------------------------------------------
    // Ability casting. Each schedules its impact through `ActionScheduler`;
    // `run_due_actions` applies the resulting damage once due.
    // ------------------------------------------------------------------

    pub fn cast_shadow_strike(&mut self, caster: u64, cast_time: f64) -> Option<u64> {
        let team = self.team_of(caster);
        let caster_pos = self.coordinator.store.get_component::<Transform>(caster)?;
        let enemies = self.live_enemy_positions(team);
        let now = self.coordinator.now;
        let mut scheduler = self.coordinator.store.world.resource_mut::<ActionScheduler>();
        abilities::cast_shadow_strike(&mut scheduler, caster, (caster_pos.x, caster_pos.z), &enemies, now, cast_time)
    }

    pub fn cast_meteor(
        &mut self,
        caster: u64,
        splash_radius: f32,
        base_damage: f32,
        cast_time: f64,
        delay: f64,
    ) -> Option<(u64, (f32, f32))> {
        let team = self.team_of(caster);
        let enemies = self.live_enemy_positions(team);
        let now = self.coordinator.now;
        let mut scheduler = self.coordinator.store.world.resource_mut::<ActionScheduler>();
        abilities::cast_meteor(&mut scheduler, caster, &enemies, splash_radius, base_damage, now, cast_time, delay)
    }

    pub fn cast_chain_lightning(
        &mut self,
        caster: u64,
        max_jumps: u32,
        jump_range: f32,
        base_damage: f32,
        damage_reduction: f32,
        cast_time: f64,
    ) -> Vec<u64> {
        let team = self.team_of(caster);
        let Some(caster_pos) = self.coordinator.store.get_component::<Transform>(caster) else { return Vec::new() };
        let enemies = self.live_enemy_positions(team);
        let path = abilities::chain_lightning_path((caster_pos.x, caster_pos.z), &enemies, max_jumps, jump_range);
        let now = self.coordinator.now;
        for (jump_index, &target) in path.iter().enumerate() {
            let damage = abilities::chain_lightning_damage(base_damage, damage_reduction, jump_index as u32);
            let delay = cast_time + (abilities::chain_lightning_visual_delay_ms(jump_index as u32) as f64) / 1000.0;
            let mut scheduler = self.coordinator.store.world.resource_mut::<ActionScheduler>();
            scheduler.schedule_action(
                "chain_lightning_bounce",
                ActionParams { entity: Some(caster), target: Some(target), amount: Some(damage), ..Default::default() },
                now,
                delay,
                Some(caster),
            );
        }
        path
    }

    // ------------------------------------------------------------------
    // Spawning, snapshots, terrain.
    // ------------------------------------------------------------------

    pub fn spawn_squad(&mut self, placement: Placement, specs: &[UnitSpec]) -> Vec<u64> {
        squad::spawn_squad(&mut self.coordinator.store, &mut self.coordinator.placement_grid, placement, specs, None)
    }

    pub fn snapshot(&mut self) -> Snapshot {
        let tick = self.tick();
        let time = self.coordinator.now;
        Snapshot::from_store(&mut self.coordinator.store, tick, time)
    }

    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json_string().unwrap_or_else(|_| "{}".to_string())
    }

    pub fn terrain(&self) -> &TerrainGrid {
        &self.terrain
    }

    pub fn terrain_mut(&mut self) -> &mut TerrainGrid {
        &mut self.terrain
    }

    pub fn apply_crater(&mut self, x: f32, z: f32, radius: f32, depth: f32) {
        self.terrain.apply_crater(x, z, radius, depth);
    }

    pub fn terrain_snapshot(&self) -> TerrainSnapshot {
        TerrainSnapshot::from_grid(&self.terrain)
    }

    pub fn terrain_snapshot_json(&self) -> String {
        serde_json::to_string(&self.terrain_snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    // ------------------------------------------------------------------
    // Save/restore and ready-up snapshot sync (C15, §4.12, §4.13).
    // ------------------------------------------------------------------

    /// §6 READY_FOR_BATTLE: marks `player_id` ready and, once every player
    /// has, walks the live ECS into the broadcast's `entitySync` payload
    /// (§4.12 "serializes the entire ECS into entitySync").
    pub fn ready_for_battle(&mut self, player_id: u32, total_players: usize) -> crate::protocol::ReadyForBattleUpdate {
        let dump = crate::save::dump_world(&self.coordinator.store);
        self.coordinator.mark_ready(player_id, total_players, || {
            serde_json::to_value(dump).unwrap_or(serde_json::Value::Null)
        })
    }

    /// §4.12 `resyncEntities`: overwrites the local ECS with a server's
    /// `entitySync` payload (from `ready_for_battle` on the other peer, or a
    /// desync recovery). Rejects a malformed payload without mutating state.
    pub fn resync_entities(&mut self, entity_sync: &serde_json::Value) -> Result<(), crate::error::SaveError> {
        let ecs_data: HashMap<u64, crate::save::EntityComponents> = serde_json::from_value(entity_sync.clone())
            .map_err(|e| crate::error::SaveError::Corrupt(e.to_string()))?;
        crate::save::restore_world(&mut self.coordinator.store, &ecs_data);
        Ok(())
    }

    /// §4.13 `getSaveData`: a full document `{saveVersion, timestamp,
    /// state, ecsData, players, level}` built from the live store, ready to
    /// `serialize_save`.
    pub fn get_save_data(&self, level: i32) -> crate::save::SaveData {
        let ecs_data = crate::save::dump_world(&self.coordinator.store);
        let players: Vec<crate::save::SavedPlayer> = self
            .coordinator
            .players
            .all()
            .map(|p| crate::save::SavedPlayer { player_id: p.player_id, team: p.team, gold: p.gold, upgrades: p.upgrades.clone() })
            .collect();
        crate::save::build_save_data(
            self.coordinator.now as i64,
            serde_json::Value::Null,
            ecs_data,
            &std::collections::HashSet::new(),
            players,
            level,
        )
    }

    /// Rejects an unsupported `saveVersion` (§4.13, §7) before touching any
    /// state; otherwise rebuilds the ECS and player roster from `data`.
    pub fn load_save_data(&mut self, data: &crate::save::SaveData) -> Result<(), crate::error::SaveError> {
        crate::save::validate_save_version(data)?;
        crate::save::restore_world(&mut self.coordinator.store, &data.ecs_data);
        for player in &data.players {
            self.coordinator.players.register(player.player_id, player.team, player.gold);
            for upgrade in &player.upgrades {
                self.coordinator.players.add_upgrade(player.player_id, upgrade.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileAttributes;
    use crate::protocol::SubmitPlacementRequest;

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

    fn test_spec(damage: f32, range: f32) -> UnitSpec {
        UnitSpec {
            unit_type: UnitType::default(),
            max_health: 50.0,
            damage,
            range,
            attack_cooldown: 0.2,
            max_speed: 5.0,
            radius: 0.5,
        }
    }

    #[test]
    fn new_world_starts_at_tick_zero() {
        let sim = SimWorld::new();
        assert_eq!(sim.tick(), 0);
        assert_eq!(sim.current_time(), 0.0);
    }

    #[test]
    fn step_advances_tick_by_fixed_timestep() {
        let mut sim = SimWorld::new();
        let fixed = sim.config().fixed_timestep as f64;
        sim.step(fixed);
        assert_eq!(sim.tick(), 1);
        sim.step(fixed * 2.0);
        assert_eq!(sim.tick(), 3);
    }

    #[test]
    fn placement_snapshot_includes_spawned_units() {
        let mut sim = open_world(32);
        sim.coordinator.players.register(1, Team::Left, 1000.0);
        sim.coordinator.start_placement_phase();
        let response = sim.coordinator.submit_placement(
            &SubmitPlacementRequest {
                player_id: 1,
                team: Team::Left,
                grid_position: (2, 2),
                cells: vec![(2, 2)],
                cost: 0.0,
                round_placed: 0,
                is_building: false,
            },
            &[test_spec(5.0, 10.0)],
        );
        assert!(response.success);
        let json = sim.snapshot_json();
        assert!(json.contains("\"units\""));
    }

    #[test]
    fn battle_phase_resolves_combat_between_opposing_squads() {
        let mut sim = open_world(32);
        sim.coordinator.players.register(1, Team::Left, 1000.0);
        sim.coordinator.players.register(2, Team::Right, 1000.0);
        sim.coordinator.start_placement_phase();

        let left = sim.coordinator.submit_placement(
            &SubmitPlacementRequest {
                player_id: 1,
                team: Team::Left,
                grid_position: (2, 2),
                cells: vec![(2, 2)],
                cost: 0.0,
                round_placed: 0,
                is_building: false,
            },
            &[test_spec(5.0, 50.0)],
        );
        let right = sim.coordinator.submit_placement(
            &SubmitPlacementRequest {
                player_id: 2,
                team: Team::Right,
                grid_position: (40, 2),
                cells: vec![(40, 2)],
                cost: 0.0,
                round_placed: 0,
                is_building: false,
            },
            &[test_spec(5.0, 50.0)],
        );
        assert!(left.success && right.success);

        sim.coordinator.mark_ready(1, 2, || serde_json::Value::Null);
        let ready = sim.coordinator.mark_ready(2, 2, || serde_json::Value::Null);
        assert!(ready.all_ready);
        assert_eq!(sim.coordinator.phase, GamePhase::Battle);

        let fixed = sim.config().fixed_timestep as f64;
        for _ in 0..150 {
            sim.step(fixed);
        }

        let right_health = sim.coordinator.store.get_component::<Health>(right.squad_units[0]).unwrap();
        assert!(right_health.current < right_health.max, "unit in range of an enemy should take damage over time");
    }

    #[test]
    fn desync_hash_is_recorded_after_every_tick() {
        let mut sim = open_world(16);
        assert!(sim.desync.last_local_hash().is_none());
        let fixed = sim.config().fixed_timestep as f64;
        sim.step(fixed);
        assert!(sim.desync.last_local_hash().is_some());
    }

    #[test]
    fn cast_chain_lightning_schedules_one_bounce_per_jump() {
        let mut sim = open_world(16);
        let caster = sim.coordinator.store.create_entity(None);
        sim.coordinator.store.add_component(caster, Transform::new(0.0, 0.0, 0.0));
        sim.coordinator.store.add_component(caster, Team::Left);

        let mut enemy_ids = Vec::new();
        for i in 0..3 {
            let id = sim.coordinator.store.create_entity(None);
            sim.coordinator.store.add_component(id, Transform::new(10.0 * (i as f32 + 1.0), 0.0, 0.0));
            sim.coordinator.store.add_component(id, Team::Right);
            sim.coordinator.store.add_component(id, Health::new(100.0));
            enemy_ids.push(id);
        }

        let path = sim.cast_chain_lightning(caster, 3, 70.0, 60.0, 0.8, 0.1);
        assert_eq!(path, enemy_ids);
        assert_eq!(sim.coordinator.store.world.resource::<ActionScheduler>().pending_count(), 3);
    }

    #[test]
    fn behavior_tree_autonomously_casts_a_ready_ability() {
        let mut sim = open_world(32);
        let caster = sim.coordinator.store.create_entity(None);
        let unit_type = UnitType {
            collection: 0,
            type_index: 0,
            abilities: vec![AbilitySlot {
                kind: AbilityKind::ShadowStrike,
                cooldown: 5.0,
                range: 100.0,
                mana_cost: 10.0,
                cast_time: 0.1,
                base_damage: 0.0,
            }],
        };
        sim.coordinator.store.world.entity_mut(sim.coordinator.store.entity(caster).unwrap()).insert((
            Transform::new(0.0, 0.0, 0.0),
            Team::Left,
            Combat { damage: 5.0, range: 1.0, attack_cooldown: 1.0, last_attack: f64::NEG_INFINITY, element: crate::components::Element::Physical },
            unit_type.clone(),
            AbilityState::for_slots(unit_type.abilities.len()),
            AIControlled,
            AiState::default(),
            BehaviorMeta::default(),
        ));

        let enemy = sim.coordinator.store.create_entity(None);
        sim.coordinator.store.world.entity_mut(sim.coordinator.store.entity(enemy).unwrap()).insert((
            Transform::new(20.0, 0.0, 0.0),
            Team::Right,
            Health::new(100.0),
        ));

        let fixed = sim.config().fixed_timestep as f64;
        sim.step(fixed);

        assert_eq!(sim.coordinator.store.world.resource::<ActionScheduler>().pending_count(), 1);
        let state = sim.coordinator.store.get_component::<AbilityState>(caster).unwrap();
        assert!(state.last_cast[0] > f64::NEG_INFINITY, "cooldown should be committed on cast");
        assert_eq!(state.mana, AbilityState::STARTING_MANA - 10.0);
    }

    #[test]
    fn ready_for_battle_snapshot_resyncs_onto_a_fresh_world() {
        let mut sim = open_world(32);
        sim.coordinator.players.register(1, Team::Left, 1000.0);
        sim.coordinator.players.register(2, Team::Right, 1000.0);
        sim.coordinator.start_placement_phase();

        let left = sim.coordinator.submit_placement(
            &SubmitPlacementRequest {
                player_id: 1,
                team: Team::Left,
                grid_position: (2, 2),
                cells: vec![(2, 2)],
                cost: 0.0,
                round_placed: 0,
                is_building: false,
            },
            &[test_spec(5.0, 50.0)],
        );
        assert!(left.success);

        sim.ready_for_battle(1, 2);
        let ready = sim.ready_for_battle(2, 2);
        assert!(ready.all_ready);
        let entity_sync = ready.entity_sync.expect("ready-up broadcast must carry a full entitySync once allReady");

        // A second, empty peer applies the same snapshot it would receive
        // over the wire and must end up with the identical unit.
        let mut peer = open_world(32);
        peer.resync_entities(&entity_sync).unwrap();

        let original = sim.coordinator.store.get_component::<Transform>(left.squad_units[0]).unwrap();
        let mirrored = peer.coordinator.store.get_component::<Transform>(left.squad_units[0]).unwrap();
        assert_eq!((original.x, original.z), (mirrored.x, mirrored.z));
        assert_eq!(peer.coordinator.store.live_count(), sim.coordinator.store.live_count());
    }

    #[test]
    fn save_then_load_restores_unit_positions() {
        let mut sim = open_world(32);
        sim.coordinator.players.register(1, Team::Left, 1000.0);
        sim.coordinator.start_placement_phase();
        let response = sim.coordinator.submit_placement(
            &SubmitPlacementRequest {
                player_id: 1,
                team: Team::Left,
                grid_position: (3, 3),
                cells: vec![(3, 3)],
                cost: 0.0,
                round_placed: 0,
                is_building: false,
            },
            &[test_spec(5.0, 10.0)],
        );
        let unit = response.squad_units[0];

        let data = sim.get_save_data(7);
        let json = crate::save::serialize_save(&data).unwrap();

        let mut restored = open_world(32);
        let loaded = crate::save::deserialize_save(&json).unwrap();
        restored.load_save_data(&loaded).unwrap();

        assert_eq!(restored.coordinator.players.gold_of(1), Some(1000.0));
        let before = sim.coordinator.store.get_component::<Transform>(unit).unwrap();
        let after = restored.coordinator.store.get_component::<Transform>(unit).unwrap();
        assert_eq!((before.x, before.z), (after.x, after.z));
    }
}
