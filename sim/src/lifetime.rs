//! Lifetime (C7) — timed entity expiry.
//!
//! Thin wrapper over the `Lifetime` component (components.rs) plus the
//! per-tick expiry sweep. Fade-out is a renderer hint only and never feeds
//! back into simulation state (§4.6).

use bevy_ecs::prelude::*;

use crate::components::{EntityId, Lifetime};

#[derive(Debug, Clone, Copy, Default)]
pub struct LifetimeOptions {
    pub permanent: bool,
}

/// Attaches a `Lifetime` to `entity_id`, returning the id for convenience
/// (mirrors §4.6's `addLifetime` -> id).
pub fn add_lifetime(
    world: &mut crate::ecs::EntityStore,
    entity_id: u64,
    now: f64,
    duration_seconds: f64,
    options: LifetimeOptions,
) -> u64 {
    world.add_component(
        entity_id,
        Lifetime { start_time: now, duration: duration_seconds, permanent: options.permanent },
    );
    entity_id
}

pub fn extend_lifetime(lifetime: &mut Lifetime, extra_seconds: f64) {
    lifetime.duration += extra_seconds;
}

/// Reduces remaining duration, clamped so the lifetime never goes negative
/// (§4.6) — the entity still expires "next tick" rather than retroactively.
pub fn reduce_lifetime(lifetime: &mut Lifetime, now: f64, reduce_seconds: f64) {
    let remaining = (lifetime.start_time + lifetime.duration - now).max(0.0);
    let new_remaining = (remaining - reduce_seconds).max(0.0);
    lifetime.duration = (now - lifetime.start_time) + new_remaining;
}

pub fn make_permanent(lifetime: &mut Lifetime) {
    lifetime.permanent = true;
}

/// Ids of every entity whose lifetime has expired as of `now`, ascending.
/// A lifetime whose duration is exactly `0` expires the tick after it is
/// added, since expiry is checked against `now >= start + duration` and
/// `now` only advances after the add (§8 boundary behavior).
pub fn expired_entities(query: &Query<(&EntityId, &Lifetime)>, now: f64) -> Vec<u64> {
    let mut ids: Vec<u64> = query
        .iter()
        .filter(|(_, lifetime)| !lifetime.permanent && lifetime.is_expired(now))
        .map(|(id, _)| id.0)
        .collect();
    ids.sort_unstable();
    ids
}

pub fn lifetime_expiry_system(
    mut commands: Commands,
    time: Res<crate::systems::performance::SimTick>,
    query: Query<(Entity, &EntityId, &Lifetime)>,
) {
    for (entity, _, lifetime) in query.iter() {
        if !lifetime.permanent && lifetime.is_expired(time.now) {
            commands.entity(entity).despawn();
        }
    }
}
