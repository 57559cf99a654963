//! Combat (C10, base attack loop) — cooldown/range/LOS gating and the
//! deterministic damage pipeline. Ability-specific patterns live in
//! `abilities.rs`; this module is the plain melee/ranged attack cycle.
//!
//! Grounded on the teacher's `systems/combat.rs` two-phase "collect then
//! apply" shape (`CombatResults` buffer), kept and extended with
//! critical/backstab/splash modifiers.

use crate::components::{Combat, Element, Transform};

#[derive(Debug, Clone, Copy, Default)]
pub struct DamageModifiers {
    pub critical_multiplier: f32,
    pub is_critical: bool,
    pub is_backstab: bool,
    pub backstab_multiplier: f32,
}

impl DamageModifiers {
    pub fn none() -> Self {
        Self { critical_multiplier: 1.0, is_critical: false, is_backstab: false, backstab_multiplier: 1.0 }
    }

    pub fn apply(&self, base_damage: f32) -> f32 {
        let mut damage = base_damage;
        if self.is_critical {
            damage *= self.critical_multiplier;
        }
        if self.is_backstab {
            damage *= self.backstab_multiplier;
        }
        damage
    }
}

/// §4.9: an attack may fire only if the cooldown has elapsed, the target is
/// in range, and line-of-sight holds.
pub fn can_attack(attacker: &Combat, attacker_pos: &Transform, target_pos: &Transform, now: f64, has_los: bool) -> bool {
    attacker.can_attack(now) && attacker_pos.distance_to(target_pos) <= attacker.range && has_los
}

/// One resolved hit, ready to apply to `Health`.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedHit {
    pub target: u64,
    pub damage: f32,
    pub element: Element,
}

pub fn resolve_attack(target: u64, combat: &Combat, modifiers: DamageModifiers) -> ResolvedHit {
    ResolvedHit { target, damage: modifiers.apply(combat.damage), element: combat.element }
}

/// Splash targets sorted by ascending distance from the impact point, ties
/// broken by ascending entity id (§4.9).
pub fn sort_splash_targets(mut targets: Vec<(u64, f32)>) -> Vec<(u64, f32)> {
    targets.sort_by(|a, b| {
        a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
    });
    targets
}

/// Linear splash falloff: full damage at the epicenter, never below half
/// damage at `radius`, per §4.9's meteor formula.
pub fn splash_falloff(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 1.0;
    }
    (1.0 - 0.5 * (distance / radius)).max(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Combat;

    #[test]
    fn cooldown_blocks_attack_until_elapsed() {
        let combat = Combat { attack_cooldown: 2.0, last_attack: 0.0, range: 100.0, ..Default::default() };
        let a = Transform::new(0.0, 0.0, 0.0);
        let b = Transform::new(1.0, 0.0, 0.0);
        assert!(!can_attack(&combat, &a, &b, 1.0, true));
        assert!(can_attack(&combat, &a, &b, 2.0, true));
    }

    #[test]
    fn out_of_range_blocks_attack() {
        let combat = Combat { range: 5.0, last_attack: f64::NEG_INFINITY, ..Default::default() };
        let a = Transform::new(0.0, 0.0, 0.0);
        let b = Transform::new(10.0, 0.0, 0.0);
        assert!(!can_attack(&combat, &a, &b, 0.0, true));
    }

    #[test]
    fn missing_los_blocks_attack_even_in_range() {
        let combat = Combat { range: 100.0, last_attack: f64::NEG_INFINITY, ..Default::default() };
        let a = Transform::new(0.0, 0.0, 0.0);
        let b = Transform::new(1.0, 0.0, 0.0);
        assert!(!can_attack(&combat, &a, &b, 0.0, false));
    }

    #[test]
    fn critical_and_backstab_multiply_damage() {
        let combat = Combat { damage: 10.0, ..Default::default() };
        let modifiers = DamageModifiers { critical_multiplier: 2.0, is_critical: true, is_backstab: true, backstab_multiplier: 1.5 };
        let hit = resolve_attack(1, &combat, modifiers);
        assert!((hit.damage - 30.0).abs() < 1e-4);
    }

    #[test]
    fn splash_targets_sort_by_distance_then_id() {
        let sorted = sort_splash_targets(vec![(5, 10.0), (2, 10.0), (9, 3.0)]);
        assert_eq!(sorted.iter().map(|t| t.0).collect::<Vec<_>>(), vec![9, 2, 5]);
    }

    #[test]
    fn falloff_never_drops_below_half() {
        assert_eq!(splash_falloff(1000.0, 100.0), 0.5);
        assert!((splash_falloff(0.0, 100.0) - 1.0).abs() < 1e-6);
    }
}
