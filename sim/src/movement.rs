//! Movement (C9) — steering, separation, path avoidance, integration.
//!
//! Runs only during the battle phase, ascending by entity id, matching the
//! pass ordering §5 requires. Generalizes the teacher's `movement_system`
//! (damped force blending) and `flocking_system` (separation) with two
//! pieces the teacher has no precedent for: path-avoidance steering and
//! leaping (both net-new per §4.8).

use crate::components::{round6, AvoidanceSide, MovementState};

pub const MAX_SEPARATION_CHECKS: usize = 8;
pub const SEPARATION_RADIUS_MULTIPLIER: f32 = 2.5;
pub const FORCE_DAMPING: f32 = 0.85;
pub const VELOCITY_SMOOTHING: f32 = 0.25;
pub const VELOCITY_SMOOTHING_OSCILLATING: f32 = 0.1;
pub const OSCILLATION_THRESHOLD_RAD: f32 = std::f32::consts::PI / 6.0;
pub const PATHFINDING_CHECK_POINTS: usize = 4;
pub const PATHFINDING_LOOKAHEAD: f32 = 6.0;
pub const MAX_SPEED_OVERSHOOT: f32 = 1.4;

/// §4.8 step 2: effective desired speed is never below `DEFAULT_AI_SPEED`.
pub fn desired_speed(max_speed: f32, ai_speed_multiplier: f32, default_ai_speed: f32) -> f32 {
    (max_speed * ai_speed_multiplier).max(default_ai_speed)
}

fn normalize(v: (f32, f32)) -> (f32, f32) {
    let len = (v.0 * v.0 + v.1 * v.1).sqrt();
    if len < 1e-6 { (0.0, 0.0) } else { (v.0 / len, v.1 / len) }
}

/// Step 2: direction toward the next waypoint (or the final target if using
/// direct movement), scaled by the effective speed.
pub fn desired_velocity(
    position: (f32, f32),
    target: (f32, f32),
    speed: f32,
) -> (f32, f32) {
    let dir = normalize((target.0 - position.0, target.1 - position.1));
    (dir.0 * speed, dir.1 * speed)
}

/// Step 3: repulsive force from nearby units, scaled by penetration depth,
/// capped at `MAX_SEPARATION_CHECKS` neighbors.
pub fn separation_force(
    position: (f32, f32),
    own_radius: f32,
    neighbors: &[((f32, f32), f32)],
) -> (f32, f32) {
    let mut force = (0.0, 0.0);
    for &(other_pos, other_radius) in neighbors.iter().take(MAX_SEPARATION_CHECKS) {
        let dx = position.0 - other_pos.0;
        let dz = position.1 - other_pos.1;
        let dist = (dx * dx + dz * dz).sqrt();
        let min_dist = (own_radius + other_radius) * SEPARATION_RADIUS_MULTIPLIER;
        if dist < min_dist && dist > 1e-6 {
            let penetration = min_dist - dist;
            force.0 += (dx / dist) * penetration;
            force.1 += (dz / dist) * penetration;
        }
    }
    force
}

/// Step 4: sample points ahead along the desired direction; if any sampled
/// point is blocked, steer perpendicular on the committed avoidance side.
/// `is_blocked` abstracts over terrain/obstacle queries.
pub fn path_avoidance_force(
    position: (f32, f32),
    desired_dir: (f32, f32),
    committed_side: &mut Option<AvoidanceSide>,
    is_blocked: impl Fn((f32, f32)) -> bool,
) -> (f32, f32) {
    let step = PATHFINDING_LOOKAHEAD / PATHFINDING_CHECK_POINTS as f32;
    let mut blocked_at = None;
    for i in 1..=PATHFINDING_CHECK_POINTS {
        let d = step * i as f32;
        let sample = (position.0 + desired_dir.0 * d, position.1 + desired_dir.1 * d);
        if is_blocked(sample) {
            blocked_at = Some(d);
            break;
        }
    }
    let Some(_) = blocked_at else {
        *committed_side = None;
        return (0.0, 0.0);
    };

    let side = *committed_side.get_or_insert(AvoidanceSide::Left);
    let perpendicular = match side {
        AvoidanceSide::Left => (-desired_dir.1, desired_dir.0),
        AvoidanceSide::Right => (desired_dir.1, -desired_dir.0),
    };
    (perpendicular.0 * FORCE_DAMPING, perpendicular.1 * FORCE_DAMPING)
}

/// Step 5: blend target velocity from desired+separation+avoidance, damp
/// toward it, harder-damp if the recent direction history is oscillating,
/// and clamp to `maxSpeed * MAX_SPEED_OVERSHOOT`.
pub fn integrate_velocity(
    current: (f32, f32),
    desired: (f32, f32),
    separation: (f32, f32),
    avoidance: (f32, f32),
    state: &mut MovementState,
    max_speed: f32,
) -> (f32, f32) {
    let target = (
        desired.0 + separation.0 * FORCE_DAMPING + avoidance.0,
        desired.1 + separation.1 * FORCE_DAMPING + avoidance.1,
    );

    let target_dir = normalize(target);
    state.push_direction(target_dir);
    let smoothing = if state.oscillation_count(OSCILLATION_THRESHOLD_RAD) >= 2 {
        VELOCITY_SMOOTHING_OSCILLATING
    } else {
        VELOCITY_SMOOTHING
    };

    let new_velocity = (
        current.0 + (target.0 - current.0) * smoothing,
        current.1 + (target.1 - current.1) * smoothing,
    );

    let speed = (new_velocity.0 * new_velocity.0 + new_velocity.1 * new_velocity.1).sqrt();
    let max_allowed = max_speed * MAX_SPEED_OVERSHOOT;
    let clamped = if speed > max_allowed && speed > 1e-6 {
        (new_velocity.0 / speed * max_allowed, new_velocity.1 / speed * max_allowed)
    } else {
        new_velocity
    };

    let smoothed_dir = normalize(clamped);
    state.smoothed_direction = smoothed_dir;
    clamped
}

/// Rotation derived from the smoothed direction, rounded to 6 decimals for
/// cross-peer determinism (§3, §9).
pub fn rotation_from_direction(dir: (f32, f32)) -> f32 {
    round6(dir.0.atan2(dir.1))
}

/// Step 6: gravity + ground clamp + arena-bounds clamp. Leaping entities
/// bypass all three (the ability driving the leap owns integration).
pub fn apply_gravity_and_clamps(
    position: (f32, f32, f32),
    velocity: (f32, f32, f32),
    dt: f32,
    gravity: f32,
    affected_by_gravity: bool,
    terrain_height: f32,
    arena_half_size: f32,
    unit_radius: f32,
    is_leaping: bool,
) -> ((f32, f32, f32), (f32, f32, f32)) {
    if is_leaping {
        return (
            (position.0 + velocity.0 * dt, position.1 + velocity.1 * dt, position.2 + velocity.2 * dt),
            velocity,
        );
    }

    let mut vy = velocity.1;
    if affected_by_gravity {
        vy -= gravity * dt;
    }

    let mut new_pos = (position.0 + velocity.0 * dt, position.1 + vy * dt, position.2 + velocity.2 * dt);

    if new_pos.1 <= terrain_height {
        new_pos.1 = terrain_height;
        vy = vy.max(0.0);
    }

    let bound = arena_half_size - unit_radius;
    new_pos.0 = new_pos.0.clamp(-bound, bound);
    new_pos.2 = new_pos.2.clamp(-bound, bound);

    (new_pos, (velocity.0, vy, velocity.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_units_skip_steering_by_caller_contract() {
        // Movement's anchor test is a caller-side branch (§4.8 step 1): an
        // anchored unit's desired velocity is simply (0, 0), never computed.
        let zero = desired_velocity((0.0, 0.0), (0.0, 0.0), 5.0);
        assert_eq!(zero, (0.0, 0.0));
    }

    #[test]
    fn desired_velocity_points_at_target_scaled_by_speed() {
        let v = desired_velocity((0.0, 0.0), (10.0, 0.0), 5.0);
        assert!((v.0 - 5.0).abs() < 1e-4);
        assert!(v.1.abs() < 1e-4);
    }

    #[test]
    fn separation_pushes_away_from_overlapping_neighbor() {
        let force = separation_force((0.0, 0.0), 1.0, &[((1.0, 0.0), 1.0)]);
        assert!(force.0 < 0.0, "should push in -x away from neighbor at +x");
    }

    #[test]
    fn separation_ignores_neighbors_outside_radius() {
        let force = separation_force((0.0, 0.0), 0.5, &[((100.0, 0.0), 0.5)]);
        assert_eq!(force, (0.0, 0.0));
    }

    #[test]
    fn velocity_clamped_to_max_speed_times_overshoot() {
        let mut state = MovementState::default();
        let result = integrate_velocity((0.0, 0.0), (1000.0, 0.0), (0.0, 0.0), (0.0, 0.0), &mut state, 10.0);
        let speed = (result.0 * result.0 + result.1 * result.1).sqrt();
        assert!(speed <= 10.0 * MAX_SPEED_OVERSHOOT + 1e-3);
    }

    #[test]
    fn rotation_is_rounded_to_six_decimals() {
        let rotation = rotation_from_direction((0.123456789, 0.987654321));
        let scaled = rotation * 1_000_000.0;
        assert!((scaled - scaled.round()).abs() < 1e-3);
    }

    #[test]
    fn leaping_entities_skip_ground_and_bounds_clamp() {
        let (pos, _) = apply_gravity_and_clamps(
            (0.0, 5.0, 0.0),
            (0.0, -50.0, 0.0),
            1.0,
            9.8,
            true,
            0.0,
            10.0,
            0.5,
            true,
        );
        assert!(pos.1 < 0.0, "leaping unit should be allowed below terrain height mid-leap");
    }

    #[test]
    fn non_leaping_entities_are_ground_and_bounds_clamped() {
        let (pos, vel) = apply_gravity_and_clamps(
            (0.0, 0.5, 0.0),
            (0.0, -50.0, 0.0),
            1.0,
            9.8,
            true,
            0.0,
            10.0,
            0.5,
            false,
        );
        assert_eq!(pos.1, 0.0);
        assert!(vel.1 >= 0.0);
    }

    #[test]
    fn oscillation_triggers_harder_damping() {
        let mut state = MovementState::default();
        // Alternate directions to build an oscillating history.
        for i in 0..5 {
            let dir = if i % 2 == 0 { (1.0, 0.0) } else { (-1.0, 0.0) };
            integrate_velocity((0.0, 0.0), (dir.0 * 5.0, dir.1 * 5.0), (0.0, 0.0), (0.0, 0.0), &mut state, 5.0);
        }
        assert!(state.oscillation_count(OSCILLATION_THRESHOLD_RAD) >= 2);
    }
}
