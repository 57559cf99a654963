//! Squad & Placement (C12).
//!
//! A placement groups 1..N units under one `placementId`. Experience is
//! earned per-unit but leveling is aggregated at the squad level (§4.11).

use bevy_ecs::prelude::*;

use crate::components::{
    AIControlled, AbilityState, AiState, BehaviorMeta, Collision, Combat, DeathState, EntityId,
    Health, Leaping, MovementState, Placement, PathFollower, SectorId, SimLod, SquadExperience,
    SquadId, Team, Transform, UnitBase, UnitBundle, UnitType, Velocity,
};
use crate::ecs::EntityStore;

/// Experience required to reach `level` from `level - 1`, following a mild
/// quadratic curve; levels run 1..=10 (§4.11).
pub fn experience_for_level(level: u8) -> f32 {
    let level = level.clamp(1, 10) as f32;
    100.0 * level * level
}

/// Flat per-level bonus multipliers applied to squad stats, indexed by
/// `level - 1`. Entry 0 (level 1, no bonus yet) is included for symmetry.
const HP_BONUS_PER_LEVEL: [f32; 10] = [0.0, 0.10, 0.20, 0.30, 0.40, 0.55, 0.70, 0.85, 1.00, 1.20];
const DAMAGE_BONUS_PER_LEVEL: [f32; 10] = [0.0, 0.08, 0.16, 0.25, 0.35, 0.45, 0.55, 0.65, 0.80, 1.00];

pub fn hp_bonus_for_level(level: u8) -> f32 {
    HP_BONUS_PER_LEVEL[(level.clamp(1, 10) - 1) as usize]
}

pub fn damage_bonus_for_level(level: u8) -> f32 {
    DAMAGE_BONUS_PER_LEVEL[(level.clamp(1, 10) - 1) as usize]
}

/// One unit's definition within a squad, as produced by the unit-type table.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub unit_type: UnitType,
    pub max_health: f32,
    pub damage: f32,
    pub range: f32,
    pub attack_cooldown: f32,
    pub max_speed: f32,
    pub radius: f32,
}

/// Per-unit world-space offsets from the squad's anchor position, keyed by
/// unit count. Mirrors the source's `calculateUnitPositions`: a simple ring
/// layout that keeps units within one placement-cell radius of the anchor.
pub fn calculate_unit_positions(anchor: (f32, f32), count: usize) -> Vec<(f32, f32)> {
    if count <= 1 {
        return vec![anchor];
    }
    let spacing = 1.5;
    (0..count)
        .map(|i| {
            let angle = (i as f32 / count as f32) * std::f32::consts::TAU;
            (anchor.0 + angle.cos() * spacing, anchor.1 + angle.sin() * spacing)
        })
        .collect()
}

/// Spawns every unit in a squad, attaching `Placement`/`SquadId` and
/// reserving the placement's cells. When `explicit_ids` is `Some`, those ids
/// are used verbatim in order (client mirroring a server-assigned batch);
/// otherwise ids are freshly reserved.
pub fn spawn_squad(
    store: &mut EntityStore,
    placement_grid: &mut crate::grid::PlacementGrid,
    placement: Placement,
    specs: &[UnitSpec],
    explicit_ids: Option<&[u64]>,
) -> Vec<u64> {
    let anchor = placement_grid.grid_to_world(placement.grid_position);
    let positions = calculate_unit_positions(anchor, specs.len());
    let mut ids = Vec::with_capacity(specs.len());

    for (i, spec) in specs.iter().enumerate() {
        let explicit = explicit_ids.and_then(|list| list.get(i).copied());
        let id = store.create_entity(explicit);
        let (x, z) = positions[i];
        store.world.entity_mut(store.entity(id).unwrap()).insert(UnitBundle {
            id: EntityId(id),
            transform: Transform::new(x, 0.0, z),
            velocity: Velocity::new(spec.max_speed),
            collision: Collision::new(spec.radius),
            health: Health::new(spec.max_health),
            combat: Combat {
                damage: spec.damage,
                range: spec.range,
                attack_cooldown: spec.attack_cooldown,
                last_attack: f64::NEG_INFINITY,
                element: crate::components::Element::Physical,
            },
            team: placement.team,
            unit_type: spec.unit_type.clone(),
            ability_state: AbilityState::for_slots(spec.unit_type.abilities.len()),
            ai_state: AiState::default(),
            behavior_meta: BehaviorMeta::default(),
            death_state: DeathState::default(),
            path_follower: PathFollower::default(),
            movement_state: MovementState::default(),
            leaping: Leaping::default(),
            squad_id: SquadId(placement.placement_id),
            ai_controlled: AIControlled,
            sim_lod: SimLod::default(),
            sector_id: SectorId::default(),
            activity_flags: crate::components::ActivityFlags::default(),
            placement: placement.clone(),
            squad_experience: SquadExperience::default(),
            unit_base: UnitBase { max_health: spec.max_health, damage: spec.damage },
        });
        ids.push(id);
    }

    placement_grid.reserve_cells(&placement.cells, ids[0], placement.placement_id);
    ids
}

/// Adds `amount` experience to the squad's aggregate record, advancing
/// `level` (capped at 10) whenever the threshold is crossed. Returns `true`
/// if at least one level-up occurred.
pub fn add_squad_experience(exp: &mut SquadExperience, amount: f32) -> bool {
    exp.experience += amount.max(0.0);
    let mut leveled = false;
    while exp.level < 10 && exp.experience >= exp.experience_to_next_level {
        exp.experience -= exp.experience_to_next_level;
        exp.level += 1;
        exp.experience_to_next_level = experience_for_level(exp.level.saturating_add(1).min(10));
        leveled = true;
    }
    exp.can_level_up = exp.level < 10 && exp.experience >= exp.experience_to_next_level;
    leveled
}

/// Applies level-derived bonuses to a unit's base stats.
pub fn apply_level_bonuses(health: &mut Health, combat: &mut Combat, base_max_health: f32, base_damage: f32, level: u8) {
    let hp_bonus = hp_bonus_for_level(level);
    let dmg_bonus = damage_bonus_for_level(level);
    let new_max = base_max_health * (1.0 + hp_bonus);
    let fraction = health.fraction();
    health.max = new_max;
    health.current = new_max * fraction;
    combat.damage = base_damage * (1.0 + dmg_bonus);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_unit_squad_sits_on_anchor() {
        let positions = calculate_unit_positions((10.0, 10.0), 1);
        assert_eq!(positions, vec![(10.0, 10.0)]);
    }

    #[test]
    fn multi_unit_squad_spreads_out() {
        let positions = calculate_unit_positions((0.0, 0.0), 4);
        assert_eq!(positions.len(), 4);
        let all_same = positions.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same);
    }

    #[test]
    fn experience_accumulates_and_levels_up() {
        let mut exp = SquadExperience::default();
        let leveled = add_squad_experience(&mut exp, exp.experience_to_next_level);
        assert!(leveled);
        assert_eq!(exp.level, 2);
    }

    #[test]
    fn level_caps_at_ten() {
        let mut exp = SquadExperience::default();
        add_squad_experience(&mut exp, 1_000_000.0);
        assert_eq!(exp.level, 10);
        assert!(!exp.can_level_up);
    }
}
