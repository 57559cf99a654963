//! Performance optimization systems.
//!
//! This module contains systems for:
//! - LOD (Level-of-Detail) assignment based on distance
//! - Activity flag updates for skipping idle units
//! - Sector assignment for batched combat
//!
//! ## Parallelism Notes
//! - `lod_assignment_system`: Read-only Transform, writes SimLod. Can run in parallel with other read-only systems.
//! - `activity_flags_system`: Reads Velocity/Combat, writes ActivityFlags. Can run in parallel with non-overlapping systems.
//! - `sector_assignment_system`: Read-only Transform, writes SectorId. Can run in parallel with other read-only systems.

use crate::components::*;
use bevy_ecs::prelude::*;

/// Configuration for simulation performance tuning plus the fixed-timestep
/// and RNG knobs threaded explicitly into subsystems (§9: no process-wide
/// singletons — everything lives on this resource or `SimTick`).
#[derive(Resource, Debug, Clone)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Size of combat sectors in world units.
    pub sector_size: f32,
    /// Distance threshold for High LOD (full fidelity).
    pub lod_high_distance: f32,
    /// Distance threshold for Medium LOD.
    pub lod_medium_distance: f32,
    /// Number of ticks to remember damage for activity flags.
    pub damage_memory_ticks: u64,
    /// Reference point for LOD calculations (e.g., camera position or frontline).
    pub lod_reference_point: (f32, f32),
    /// Half-extent of the playable arena on each axis; used for bounds
    /// clamping in Movement (C9).
    pub arena_half_size: f32,
    /// `AI_SPEED_MULTIPLIER` applied to `max_speed` when computing desired
    /// velocity (§4.8).
    pub ai_speed_multiplier: f32,
    pub default_ai_speed: f32,
    pub gravity: f32,
    pub battle_duration_seconds: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0, // 30 Hz
            sector_size: 40.0,
            lod_high_distance: 100.0,
            lod_medium_distance: 200.0,
            damage_memory_ticks: 60,
            lod_reference_point: (0.0, 0.0),
            arena_half_size: 500.0,
            ai_speed_multiplier: 1.0,
            default_ai_speed: 5.0,
            gravity: 9.8,
            battle_duration_seconds: 180.0,
        }
    }
}

/// Game clock: tick counter plus simulation time, threaded explicitly
/// rather than read from the wall clock (§9).
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick {
    pub tick: u64,
    pub now: f64,
    pub delta_time: f64,
}

impl SimTick {
    pub fn advance(&mut self, delta_time: f64) {
        self.tick = self.tick.wrapping_add(1);
        self.now += delta_time;
        self.delta_time = delta_time;
    }

    #[inline]
    pub fn should_update(&self, lod: SimLod) -> bool {
        lod.should_update(self.tick)
    }
}

/// System that assigns LOD based on distance to reference point.
pub fn lod_assignment_system(
    config: Res<SimConfig>,
    mut query: Query<(&Transform, &mut SimLod)>,
) {
    let (ref_x, ref_z) = config.lod_reference_point;
    let high_sq = config.lod_high_distance * config.lod_high_distance;
    let med_sq = config.lod_medium_distance * config.lod_medium_distance;

    for (transform, mut lod) in query.iter_mut() {
        let dx = transform.x - ref_x;
        let dz = transform.z - ref_z;
        let dist_sq = dx * dx + dz * dz;

        let new_lod = if dist_sq <= high_sq {
            SimLod::High
        } else if dist_sq <= med_sq {
            SimLod::Medium
        } else {
            SimLod::Low
        };

        if *lod != new_lod {
            *lod = new_lod;
        }
    }
}

/// System that updates activity flags based on current state.
pub fn activity_flags_system(
    tick: Res<SimTick>,
    config: Res<SimConfig>,
    mut query: Query<(&Velocity, &mut ActivityFlags)>,
) {
    for (velocity, mut flags) in query.iter_mut() {
        flags.is_moving = velocity.horizontal_magnitude() > 0.1;
        flags.update_damage_status(tick.tick, config.damage_memory_ticks);
    }
}

/// System that assigns sector IDs based on position.
pub fn sector_assignment_system(
    config: Res<SimConfig>,
    mut query: Query<(&Transform, &mut SectorId)>,
) {
    let sector_size = config.sector_size;
    for (transform, mut sector) in query.iter_mut() {
        let new_sector = SectorId::from_position(transform.x, transform.z, sector_size);
        if *sector != new_sector {
            *sector = new_sector;
        }
    }
}

/// Aggregated combat statistics for a sector.
/// Used for batched combat calculations.
#[derive(Debug, Clone, Default)]
pub struct SectorCombatStats {
    /// Total incoming damage to this sector.
    pub incoming_damage: f32,
    /// Number of enemy units targeting this sector.
    pub enemy_fire_sources: u32,
    /// Number of friendly units in this sector.
    pub friendly_count: u32,
}

/// Resource holding aggregated sector combat data.
/// Rebuilt each tick by the sector aggregation system.
#[derive(Resource, Debug, Default)]
pub struct SectorCombatData {
    /// Map from (sector_x, sector_z, team) to combat stats.
    pub stats: std::collections::HashMap<(i32, i32, u8), SectorCombatStats>,
}

impl SectorCombatData {
    pub fn clear(&mut self) {
        self.stats.clear();
    }

    pub fn get_stats(&self, sector: SectorId, team: u8) -> Option<&SectorCombatStats> {
        self.stats.get(&(sector.0, sector.1, team))
    }

    pub fn add_damage(&mut self, sector: SectorId, team: u8, damage: f32) {
        let entry = self.stats.entry((sector.0, sector.1, team)).or_default();
        entry.incoming_damage += damage;
        entry.enemy_fire_sources += 1;
    }

    pub fn register_unit(&mut self, sector: SectorId, team: u8) {
        let entry = self.stats.entry((sector.0, sector.1, team)).or_default();
        entry.friendly_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lod_assignment() {
        let mut world = World::new();
        world.insert_resource(SimConfig::default());

        world.spawn((Transform::new(0.0, 0.0, 0.0), SimLod::Low));
        world.spawn((Transform::new(150.0, 0.0, 0.0), SimLod::Low));
        world.spawn((Transform::new(300.0, 0.0, 0.0), SimLod::High));

        let mut schedule = Schedule::default();
        schedule.add_systems(lod_assignment_system);
        schedule.run(&mut world);

        let mut query = world.query::<(&Transform, &SimLod)>();
        let results: Vec<_> = query.iter(&world).collect();

        let near = results.iter().find(|(p, _)| p.x == 0.0).unwrap();
        assert_eq!(*near.1, SimLod::High);

        let mid = results.iter().find(|(p, _)| p.x == 150.0).unwrap();
        assert_eq!(*mid.1, SimLod::Medium);

        let far = results.iter().find(|(p, _)| p.x == 300.0).unwrap();
        assert_eq!(*far.1, SimLod::Low);
    }

    #[test]
    fn test_sim_tick_lod_scheduling() {
        let tick = SimTick { tick: 0, ..Default::default() };
        assert!(tick.should_update(SimLod::High));
        assert!(tick.should_update(SimLod::Medium));
        assert!(tick.should_update(SimLod::Low));

        let tick = SimTick { tick: 1, ..Default::default() };
        assert!(tick.should_update(SimLod::High));
        assert!(!tick.should_update(SimLod::Medium));
        assert!(!tick.should_update(SimLod::Low));

        let tick = SimTick { tick: 4, ..Default::default() };
        assert!(tick.should_update(SimLod::High));
        assert!(tick.should_update(SimLod::Medium));
        assert!(tick.should_update(SimLod::Low));
    }

    #[test]
    fn test_sector_assignment() {
        let mut world = World::new();
        world.insert_resource(SimConfig { sector_size: 40.0, ..Default::default() });

        world.spawn((Transform::new(10.0, 0.0, 10.0), SectorId::default()));
        world.spawn((Transform::new(50.0, 0.0, 10.0), SectorId::default()));
        world.spawn((Transform::new(-30.0, 0.0, -30.0), SectorId::default()));

        let mut schedule = Schedule::default();
        schedule.add_systems(sector_assignment_system);
        schedule.run(&mut world);

        let mut query = world.query::<(&Transform, &SectorId)>();
        let results: Vec<_> = query.iter(&world).collect();

        let s1 = results.iter().find(|(p, _)| p.x == 10.0).unwrap();
        assert_eq!(*s1.1, SectorId(0, 0));

        let s2 = results.iter().find(|(p, _)| p.x == 50.0).unwrap();
        assert_eq!(*s2.1, SectorId(1, 0));

        let s3 = results.iter().find(|(p, _)| p.x == -30.0).unwrap();
        assert_eq!(*s3.1, SectorId(-1, -1));
    }
}
