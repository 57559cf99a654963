//! Abilities (C10) — the three concrete ability patterns §4.9 names.
//!
//! Each ability is data-driven (`cooldown`, `range`, `manaCost`, `castTime`,
//! `priority`) and dispatches its deferred effect through the Action
//! Scheduler (C6) rather than holding a timer of its own — targeting is
//! always resolved deterministically at cast time (T=0); only the damage
//! application is deferred to `castTime` (+ any per-jump delay).

use crate::combat::{splash_falloff, DamageModifiers};
use crate::components::Transform;
use crate::scheduler::{ActionParams, ActionScheduler};

#[derive(Debug, Clone, Copy)]
pub struct AbilityDef {
    pub cooldown: f64,
    pub range: f32,
    pub mana_cost: f32,
    pub cast_time: f64,
    pub priority: i32,
}

fn closest_by_distance_then_id(origin: (f32, f32), candidates: &[(u64, (f32, f32))]) -> Option<(u64, (f32, f32))> {
    candidates
        .iter()
        .map(|&(id, pos)| {
            let dx = pos.0 - origin.0;
            let dz = pos.1 - origin.1;
            (id, pos, (dx * dx + dz * dz).sqrt())
        })
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)))
        .map(|(id, pos, _)| (id, pos))
}

// ============================================================================
// SHADOW STRIKE (teleport-strike)
// ============================================================================

pub const SHADOW_STRIKE_OFFSETS: [(f32, f32); 5] =
    [(-25.0, -25.0), (-25.0, 0.0), (-25.0, 25.0), (0.0, -25.0), (0.0, 25.0)];
const WORLD_BOUND: f32 = 1000.0;

/// Picks the teleport destination: the first offset (in priority order)
/// whose absolute world coordinates stay within bounds; falls back to the
/// first offset in the list if none qualify (§4.9).
pub fn shadow_strike_teleport_position(target_pos: (f32, f32)) -> (f32, f32) {
    for &(ox, oz) in &SHADOW_STRIKE_OFFSETS {
        let candidate = (target_pos.0 + ox, target_pos.1 + oz);
        if candidate.0.abs() <= WORLD_BOUND && candidate.1.abs() <= WORLD_BOUND {
            return candidate;
        }
    }
    let fallback = SHADOW_STRIKE_OFFSETS[0];
    (target_pos.0 + fallback.0, target_pos.1 + fallback.1)
}

/// Casts Shadow Strike: targets the closest enemy now, schedules the
/// teleport+damage impact at `cast_time`.
pub fn cast_shadow_strike(
    scheduler: &mut ActionScheduler,
    caster: u64,
    caster_pos: (f32, f32),
    enemies: &[(u64, (f32, f32))],
    now: f64,
    cast_time: f64,
) -> Option<u64> {
    let (target, target_pos) = closest_by_distance_then_id(caster_pos, enemies)?;
    let teleport_pos = shadow_strike_teleport_position(target_pos);
    let action_id = scheduler.schedule_action(
        "shadow_strike_impact",
        ActionParams { entity: Some(caster), target: Some(target), position: Some(teleport_pos), ..Default::default() },
        now,
        cast_time,
        Some(caster),
    );
    Some(action_id)
}

pub fn shadow_strike_damage_modifiers() -> DamageModifiers {
    DamageModifiers { critical_multiplier: 2.0, is_critical: true, is_backstab: true, backstab_multiplier: 1.0 }
}

// ============================================================================
// METEOR (cluster strike)
// ============================================================================

/// Picks the impact point: the enemy that maximizes the count of *other*
/// enemies within `splash_radius`, ties broken by lower total distance to
/// all other enemies then ascending id (§4.9, scenario 3).
pub fn meteor_impact_target(enemies_in_range: &[(u64, (f32, f32))], splash_radius: f32) -> Option<(u64, (f32, f32))> {
    if enemies_in_range.is_empty() {
        return None;
    }
    enemies_in_range
        .iter()
        .map(|&(id, pos)| {
            let mut count = 0u32;
            let mut total_distance = 0.0f32;
            for &(other_id, other_pos) in enemies_in_range {
                if other_id == id {
                    continue;
                }
                let dx = other_pos.0 - pos.0;
                let dz = other_pos.1 - pos.1;
                let dist = (dx * dx + dz * dz).sqrt();
                total_distance += dist;
                if dist <= splash_radius {
                    count += 1;
                }
            }
            (id, pos, count, total_distance)
        })
        .max_by(|a, b| {
            a.2.cmp(&b.2)
                .then_with(|| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.0.cmp(&a.0))
        })
        .map(|(id, pos, _, _)| (id, pos))
}

pub fn cast_meteor(
    scheduler: &mut ActionScheduler,
    caster: u64,
    enemies_in_range: &[(u64, (f32, f32))],
    splash_radius: f32,
    base_damage: f32,
    now: f64,
    cast_time: f64,
    delay: f64,
) -> Option<(u64, (f32, f32))> {
    let (target, impact_pos) = meteor_impact_target(enemies_in_range, splash_radius)?;
    scheduler.schedule_action(
        "meteor_impact",
        ActionParams {
            entity: Some(caster),
            target: Some(target),
            position: Some(impact_pos),
            amount: Some(base_damage),
            radius: Some(splash_radius),
            ..Default::default()
        },
        now,
        cast_time + delay,
        Some(caster),
    );
    Some((target, impact_pos))
}

/// Everyone within `splash_radius` of the impact, each with its falloff
/// factor, sorted by distance then id.
pub fn meteor_splash_damage(
    impact_pos: (f32, f32),
    enemies: &[(u64, (f32, f32))],
    splash_radius: f32,
    base_damage: f32,
) -> Vec<(u64, f32)> {
    let mut hits: Vec<(u64, f32)> = enemies
        .iter()
        .filter_map(|&(id, pos)| {
            let dx = pos.0 - impact_pos.0;
            let dz = pos.1 - impact_pos.1;
            let dist = (dx * dx + dz * dz).sqrt();
            if dist <= splash_radius {
                Some((id, dist))
            } else {
                None
            }
        })
        .collect();
    hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    hits.into_iter().map(|(id, dist)| (id, base_damage * splash_falloff(dist, splash_radius))).collect()
}

// ============================================================================
// CHAIN LIGHTNING (chain bounce)
// ============================================================================

/// Computes the full deterministic bounce chain starting from the closest
/// enemy to `caster_pos`, up to `max_jumps` total hits, each subsequent jump
/// the closest not-yet-hit target within `jump_range` of the current hit.
pub fn chain_lightning_path(
    caster_pos: (f32, f32),
    enemies: &[(u64, (f32, f32))],
    max_jumps: u32,
    jump_range: f32,
) -> Vec<u64> {
    let mut hit_order = Vec::new();
    let mut current_pos = caster_pos;
    let mut remaining: Vec<(u64, (f32, f32))> = enemies.to_vec();

    while (hit_order.len() as u32) < max_jumps {
        let candidates: Vec<(u64, (f32, f32))> = if hit_order.is_empty() {
            remaining.clone()
        } else {
            remaining
                .iter()
                .copied()
                .filter(|&(_, pos)| {
                    let dx = pos.0 - current_pos.0;
                    let dz = pos.1 - current_pos.1;
                    (dx * dx + dz * dz).sqrt() <= jump_range
                })
                .collect()
        };
        let Some((id, pos)) = closest_by_distance_then_id(current_pos, &candidates) else {
            break;
        };
        hit_order.push(id);
        current_pos = pos;
        remaining.retain(|&(other_id, _)| other_id != id);
    }
    hit_order
}

/// Damage at bounce index `i` (0-based, 0 = initial hit): geometric decay by
/// `damage_reduction` per jump, floored (§4.9 scenario 4 — floor(60),
/// floor(48), floor(38.4)).
pub fn chain_lightning_damage(base_damage: f32, damage_reduction: f32, jump_index: u32) -> f32 {
    (base_damage * damage_reduction.powi(jump_index as i32)).floor()
}

/// Visual timing for bounce `jump_index`: fires every 150ms.
pub fn chain_lightning_visual_delay_ms(jump_index: u32) -> u64 {
    jump_index as u64 * 150
}

/// Jagged bolt offset at sample `i` — a deterministic formula, not a random
/// draw (§9: "random"-looking visuals use formulas, never the battle RNG).
pub fn chain_lightning_jag(i: u32, k: u32) -> f32 {
    ((i * k) % 100) as f32 / 100.0 - 0.5
}

pub const CHAIN_LIGHTNING_JAG_CONSTANTS: [u32; 3] = [37, 73, 91];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_strike_picks_first_in_bounds_offset() {
        let pos = shadow_strike_teleport_position((0.0, 0.0));
        assert_eq!(pos, (-25.0, -25.0));
    }

    #[test]
    fn shadow_strike_falls_back_when_all_offsets_out_of_bounds() {
        let pos = shadow_strike_teleport_position((990.0, 990.0));
        assert_eq!(pos, (990.0 - 25.0, 990.0 - 25.0));
    }

    #[test]
    fn meteor_scenario_picks_cluster_of_two_over_isolated_one() {
        let enemies = vec![(1u64, (0.0, 0.0)), (2u64, (10.0, 0.0)), (3u64, (200.0, 0.0))];
        let target = meteor_impact_target(&enemies, 120.0).unwrap();
        assert_eq!(target.0, 2, "enemy at (10,0) has lower total distance among the tied count-1 candidates");
        assert_eq!(target.1, (10.0, 0.0));
    }

    #[test]
    fn meteor_splash_applies_falloff_above_half_within_radius() {
        let enemies = vec![(1u64, (0.0, 0.0)), (2u64, (10.0, 0.0))];
        let hits = meteor_splash_damage((10.0, 0.0), &enemies, 120.0, 100.0);
        assert_eq!(hits.len(), 2);
        for (_, damage) in &hits {
            assert!(*damage >= 50.0);
        }
    }

    #[test]
    fn chain_lightning_scenario_hits_in_expected_order_and_stops_out_of_range() {
        let enemies = vec![(1u64, (0.0, 0.0)), (2u64, (50.0, 0.0)), (3u64, (100.0, 0.0)), (4u64, (250.0, 0.0))];
        let caster_pos = (-1000.0, 0.0); // far away, so (0,0) is unambiguously closest
        let path = chain_lightning_path(caster_pos, &enemies, 3, 70.0);
        assert_eq!(path, vec![1, 2, 3]);
    }

    #[test]
    fn chain_lightning_damage_matches_scenario_values() {
        let damages: Vec<f32> = (0..3).map(|i| chain_lightning_damage(60.0, 0.8, i)).collect();
        assert_eq!(damages, vec![60.0, 48.0, 38.0]);
    }

    #[test]
    fn chain_lightning_visual_timing_is_150ms_per_jump() {
        assert_eq!(chain_lightning_visual_delay_ms(0), 0);
        assert_eq!(chain_lightning_visual_delay_ms(2), 300);
    }
}
