//! Save/Restore (C15).
//!
//! Grounded on the teacher's `world.rs` (`Snapshot::from_world`,
//! `to_json`/`to_json_pretty`) and `systems/serialization.rs`, extended with
//! the tagged-container wrapper (`{__type, data}`) Map/Set values need to
//! round-trip, an exclusion set, and a version gate.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::components::{
    AbilityState, AiState, BehaviorMeta, Combat, Collision, DeathState, Health, Leaping, Lifetime,
    MovementState, PathFollower, Placement, SectorId, SimLod, SquadExperience, SquadId, Team,
    Transform, UnitBase, UnitType, Velocity, AIControlled, Projectile,
};
use crate::ecs::EntityStore;
use crate::error::SaveError;

pub const SUPPORTED_VERSIONS: [u32; 2] = [1, 2];
pub const CURRENT_SAVE_VERSION: u32 = 2;

/// Wrapper that tags a `Map`/`Set`-shaped value so deserialization rebuilds
/// the right container instead of guessing from JSON shape (§4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "__type", content = "data")]
pub enum TaggedContainer {
    Map(Vec<(String, Value)>),
    Set(Vec<Value>),
}

impl TaggedContainer {
    pub fn from_map(map: &HashMap<String, Value>) -> Self {
        TaggedContainer::Map(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn from_set(set: &HashSet<String>) -> Self {
        TaggedContainer::Set(set.iter().map(|v| Value::String(v.clone())).collect())
    }

    pub fn to_map(&self) -> Option<HashMap<String, Value>> {
        match self {
            TaggedContainer::Map(entries) => Some(entries.iter().cloned().collect()),
            TaggedContainer::Set(_) => None,
        }
    }

    pub fn to_set(&self) -> Option<HashSet<String>> {
        match self {
            TaggedContainer::Set(entries) => Some(
                entries
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
            ),
            TaggedContainer::Map(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPlayer {
    pub player_id: u32,
    pub team: crate::components::Team,
    pub gold: f32,
    pub upgrades: Vec<String>,
}

/// One entity's component dump, keyed by component name.
pub type EntityComponents = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    pub save_version: u32,
    pub timestamp: i64,
    pub state: Value,
    pub ecs_data: HashMap<u64, EntityComponents>,
    pub players: Vec<SavedPlayer>,
    pub level: i32,
}

/// Components that never belong in a save (transient/derived scratch) plus
/// the rule that any entity id namespaced `camera_*` is excluded entirely
/// (§4.13). IDs here are numeric (`EntityId`), so the camera exclusion is
/// checked against a parallel string-id table the embedder supplies.
pub fn default_exclusion_set() -> HashSet<&'static str> {
    ["MovementState", "BehaviorMeta", "ActivityFlags", "SimLod", "SectorId"]
        .into_iter()
        .collect()
}

/// Builds a save document from a flat entity -> component-map dump (the ECS
/// walk itself lives in `ecs.rs`/`api.rs`; this function applies the
/// exclusion rules and wraps the result).
pub fn build_save_data(
    now_timestamp: i64,
    state: Value,
    mut raw_ecs_data: HashMap<u64, EntityComponents>,
    camera_entity_ids: &HashSet<u64>,
    players: Vec<SavedPlayer>,
    level: i32,
) -> SaveData {
    let exclusions = default_exclusion_set();
    raw_ecs_data.retain(|id, _| !camera_entity_ids.contains(id));
    for components in raw_ecs_data.values_mut() {
        components.retain(|name, _| !exclusions.contains(name.as_str()));
    }

    SaveData {
        save_version: CURRENT_SAVE_VERSION,
        timestamp: now_timestamp,
        state,
        ecs_data: raw_ecs_data,
        players,
        level,
    }
}

/// Names of every serializable `Component` type save/restore knows about,
/// paired with the capture/restore closures below. New components need an
/// entry here (and in `default_exclusion_set` if they shouldn't be saved)
/// to round-trip through `dump_world`/`restore_world`.
macro_rules! for_each_saved_component {
    ($macro_name:ident) => {
        $macro_name!("Transform", Transform);
        $macro_name!("Velocity", Velocity);
        $macro_name!("Collision", Collision);
        $macro_name!("Health", Health);
        $macro_name!("Combat", Combat);
        $macro_name!("Team", Team);
        $macro_name!("UnitType", UnitType);
        $macro_name!("AbilityState", AbilityState);
        $macro_name!("AiState", AiState);
        $macro_name!("BehaviorMeta", BehaviorMeta);
        $macro_name!("DeathState", DeathState);
        $macro_name!("PathFollower", PathFollower);
        $macro_name!("MovementState", MovementState);
        $macro_name!("Leaping", Leaping);
        $macro_name!("Placement", Placement);
        $macro_name!("Lifetime", Lifetime);
        $macro_name!("SquadExperience", SquadExperience);
        $macro_name!("SquadId", SquadId);
        $macro_name!("UnitBase", UnitBase);
        $macro_name!("SimLod", SimLod);
        $macro_name!("SectorId", SectorId);
    };
}

/// Walks every live entity in `store` and serializes each known component it
/// carries into a `{component_name: value}` map, keyed by entity id — the
/// production source of the dump `build_save_data` wraps, and of the
/// full-ECS `entitySync` payload sent at ready-up (§4.12, §4.13). Marker
/// components with no fields (`AIControlled`, `Projectile`) are recorded as
/// a bare `true` rather than an empty object.
pub fn dump_world(store: &EntityStore) -> HashMap<u64, EntityComponents> {
    let mut out = HashMap::new();
    for id in store.all_ids() {
        let mut components = EntityComponents::new();

        macro_rules! capture {
            ($name:literal, $ty:ty) => {
                if let Some(component) = store.get_component::<$ty>(id) {
                    if let Ok(value) = serde_json::to_value(&component) {
                        components.insert($name.to_string(), value);
                    }
                }
            };
        }
        for_each_saved_component!(capture);

        if store.has_component::<AIControlled>(id) {
            components.insert("AIControlled".to_string(), Value::Bool(true));
        }
        if store.has_component::<Projectile>(id) {
            components.insert("Projectile".to_string(), Value::Bool(true));
        }

        out.insert(id, components);
    }
    out
}

/// Rebuilds `store` from a `{entity_id: {component_name: value}}` dump
/// produced by `dump_world` (or received as a server `entitySync`/save
/// payload): despawns everything first, then re-spawns each entity with its
/// original id and reinserts every component the dump records (§4.12
/// `resyncEntities`, §8 round-trip property). Unknown component keys are
/// ignored rather than rejected, so a save from a slightly older build still
/// loads.
pub fn restore_world(store: &mut EntityStore, ecs_data: &HashMap<u64, EntityComponents>) {
    store.clear();

    let mut ids: Vec<u64> = ecs_data.keys().copied().collect();
    ids.sort_unstable();

    for id in ids {
        store.create_entity(Some(id));
        let components = &ecs_data[&id];

        macro_rules! restore {
            ($name:literal, $ty:ty) => {
                if let Some(value) = components.get($name) {
                    if let Ok(component) = serde_json::from_value::<$ty>(value.clone()) {
                        store.add_component(id, component);
                    }
                }
            };
        }
        for_each_saved_component!(restore);

        if components.get("AIControlled").is_some() {
            store.add_component(id, AIControlled);
        }
        if components.get("Projectile").is_some() {
            store.add_component(id, Projectile);
        }
    }
}

/// Rejects unknown save versions outright; callers are told the reason
/// rather than attempting a best-effort parse (§4.13, §7).
pub fn validate_save_version(data: &SaveData) -> Result<(), SaveError> {
    if SUPPORTED_VERSIONS.contains(&data.save_version) {
        Ok(())
    } else {
        Err(SaveError::UnsupportedVersion(data.save_version))
    }
}

pub fn serialize_save(data: &SaveData) -> Result<String, SaveError> {
    serde_json::to_string(data).map_err(|e| SaveError::Corrupt(e.to_string()))
}

pub fn deserialize_save(json: &str) -> Result<SaveData, SaveError> {
    let data: SaveData = serde_json::from_str(json).map_err(|e| SaveError::Corrupt(e.to_string()))?;
    validate_save_version(&data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_version_is_rejected() {
        let mut data = sample_save();
        data.save_version = 99;
        assert!(matches!(validate_save_version(&data), Err(SaveError::UnsupportedVersion(99))));
    }

    #[test]
    fn supported_versions_pass() {
        let mut data = sample_save();
        for v in SUPPORTED_VERSIONS {
            data.save_version = v;
            assert!(validate_save_version(&data).is_ok());
        }
    }

    #[test]
    fn round_trip_preserves_data() {
        let data = sample_save();
        let json = serialize_save(&data).unwrap();
        let restored = deserialize_save(&json).unwrap();
        assert_eq!(restored.level, data.level);
        assert_eq!(restored.players.len(), data.players.len());
        assert_eq!(restored.ecs_data.len(), data.ecs_data.len());
    }

    #[test]
    fn camera_entities_are_excluded_from_ecs_data() {
        let mut raw = HashMap::new();
        raw.insert(1u64, EntityComponents::new());
        raw.insert(2u64, EntityComponents::new());
        let mut cameras = HashSet::new();
        cameras.insert(2u64);
        let data = build_save_data(0, Value::Null, raw, &cameras, vec![], 0);
        assert!(data.ecs_data.contains_key(&1));
        assert!(!data.ecs_data.contains_key(&2));
    }

    #[test]
    fn dump_world_round_trips_through_restore_world() {
        let mut store = EntityStore::new();
        let id = store.create_entity(None);
        store.add_component(id, Transform::new(1.0, 0.0, 2.0));
        store.add_component(id, Velocity::new(5.0));
        store.add_component(id, Health::new(80.0));
        store.add_component(id, Team::Right);
        store.add_component(id, AIControlled);

        let dump = dump_world(&store);
        assert_eq!(dump.len(), 1);
        assert!(dump[&id].contains_key("Transform"));
        assert!(dump[&id].contains_key("AIControlled"));
        assert!(!dump[&id].contains_key("Combat"), "absent components must not appear in the dump");

        let mut restored = EntityStore::new();
        restore_world(&mut restored, &dump);
        assert_eq!(restored.live_count(), 1);
        assert!(restored.has_component::<AIControlled>(id));
        let transform = restored.get_component::<Transform>(id).unwrap();
        assert_eq!((transform.x, transform.z), (1.0, 2.0));
        let team = restored.get_component::<Team>(id).unwrap();
        assert_eq!(team, Team::Right);

        let next = restored.create_entity(None);
        assert!(next > id, "restored store must resume id allocation past the highest restored id");
    }

    #[test]
    fn restore_world_clears_prior_entities() {
        let mut store = EntityStore::new();
        let stale = store.create_entity(None);
        store.add_component(stale, Transform::default());

        let mut dump = HashMap::new();
        dump.insert(99u64, EntityComponents::new());
        restore_world(&mut store, &dump);

        assert!(store.get_component::<Transform>(stale).is_none());
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn tagged_map_round_trips_through_json() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), Value::from(1));
        let tagged = TaggedContainer::from_map(&map);
        let json = serde_json::to_string(&tagged).unwrap();
        let restored: TaggedContainer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to_map().unwrap().get("a"), Some(&Value::from(1)));
    }

    fn sample_save() -> SaveData {
        let mut raw = HashMap::new();
        raw.insert(1u64, EntityComponents::new());
        build_save_data(
            1_000,
            Value::Null,
            raw,
            &HashSet::new(),
            vec![SavedPlayer { player_id: 1, team: crate::components::Team::Left, gold: 100.0, upgrades: vec![] }],
            1,
        )
    }
}
