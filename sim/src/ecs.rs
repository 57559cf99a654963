//! Entity/Component Store facade (C2).
//!
//! A thin wrapper over `bevy_ecs::World` that gives the exact operations
//! §4.1 names and the guarantees it promises — in particular stable,
//! never-recycled integer IDs (bevy's own `Entity` index can be reused after
//! a despawn, which would violate "destroyed IDs are never recycled").

use crate::components::EntityId;
use bevy_ecs::prelude::*;
use bevy_ecs::world::World;
use std::collections::BTreeMap;

/// Owns the `World` plus the id <-> Entity mapping that makes IDs stable
/// and monotone.
pub struct EntityStore {
    pub world: World,
    next_id: u64,
    id_to_entity: BTreeMap<u64, Entity>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            next_id: 0,
            id_to_entity: BTreeMap::new(),
        }
    }

    /// Allocate the next id without creating an entity — used by the
    /// protocol coordinator to hand out a batch of ids up front.
    pub fn reserve_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    /// Force the next-id counter forward. Used by clients mirroring a
    /// server-assigned id batch — they must never synthesize ids themselves,
    /// only adopt the server's counter afterward.
    pub fn set_next_id(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Create a new entity, optionally with an explicit (server-assigned)
    /// id. Always attaches an `EntityId` component for reverse lookup.
    pub fn create_entity(&mut self, explicit_id: Option<u64>) -> u64 {
        let id = match explicit_id {
            Some(id) => {
                self.next_id = self.next_id.max(id + 1);
                id
            }
            None => self.reserve_id(),
        };
        let entity = self.world.spawn(EntityId(id)).id();
        self.id_to_entity.insert(id, entity);
        id
    }

    pub fn destroy_entity(&mut self, id: u64) {
        if let Some(entity) = self.id_to_entity.remove(&id) {
            self.world.despawn(entity);
        }
    }

    pub fn entity(&self, id: u64) -> Option<Entity> {
        self.id_to_entity.get(&id).copied()
    }

    pub fn add_component<C: Component>(&mut self, id: u64, component: C) {
        if let Some(entity) = self.entity(id) {
            self.world.entity_mut(entity).insert(component);
        }
    }

    pub fn remove_component<C: Component>(&mut self, id: u64) {
        if let Some(entity) = self.entity(id) {
            self.world.entity_mut(entity).remove::<C>();
        }
    }

    pub fn get_component<C: Component + Clone>(&self, id: u64) -> Option<C> {
        let entity = self.entity(id)?;
        self.world.get::<C>(entity).cloned()
    }

    pub fn has_component<C: Component>(&self, id: u64) -> bool {
        match self.entity(id) {
            Some(entity) => self.world.get::<C>(entity).is_some(),
            None => false,
        }
    }

    /// Every live entity carrying component `C`, in ascending id order.
    pub fn entities_with<C: Component>(&mut self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .world
            .query::<(&EntityId, &C)>()
            .iter(&self.world)
            .map(|(id, _)| id.0)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Dense field array indexed by entity id; absent entries are `NaN`.
    /// `extractor` reads the field out of a present component.
    pub fn field_array<C: Component>(&mut self, extractor: impl Fn(&C) -> f32) -> Vec<f32> {
        let max_id = self.id_to_entity.keys().next_back().copied().unwrap_or(0);
        let mut out = vec![f32::NAN; (max_id + 1) as usize];
        for (id, entity) in self.id_to_entity.iter() {
            if let Some(component) = self.world.get::<C>(*entity) {
                out[*id as usize] = extractor(component);
            }
        }
        out
    }

    pub fn live_count(&self) -> usize {
        self.id_to_entity.len()
    }

    /// Every live entity id, ascending — `id_to_entity` is a `BTreeMap`, so
    /// this is a plain key traversal. Used by save/restore (C15) and
    /// anything else that needs a deterministic full-store walk.
    pub fn all_ids(&self) -> Vec<u64> {
        self.id_to_entity.keys().copied().collect()
    }

    /// Despawns every live entity and resets the id counter to zero. Used
    /// when rebuilding a store from a snapshot (§4.12 `resyncEntities`) —
    /// the restored ids come from the snapshot itself, not this counter.
    pub fn clear(&mut self) {
        self.world = World::new();
        self.id_to_entity.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Health;

    #[test]
    fn ids_are_monotone_and_not_recycled() {
        let mut store = EntityStore::new();
        let a = store.create_entity(None);
        let b = store.create_entity(None);
        assert!(b > a);
        store.destroy_entity(a);
        let c = store.create_entity(None);
        assert!(c > b, "destroyed ids must never be recycled");
    }

    #[test]
    fn entities_with_is_id_sorted() {
        let mut store = EntityStore::new();
        let ids: Vec<u64> = (0..5).map(|_| store.create_entity(None)).collect();
        for &id in ids.iter().rev() {
            store.add_component(id, Health::new(10.0));
        }
        assert_eq!(store.entities_with::<Health>(), ids);
    }

    #[test]
    fn missing_component_is_null_sentinel_not_panic() {
        let mut store = EntityStore::new();
        let id = store.create_entity(None);
        assert!(store.get_component::<Health>(id).is_none());
        assert!(!store.has_component::<Health>(id));
    }

    #[test]
    fn explicit_id_advances_counter() {
        let mut store = EntityStore::new();
        store.create_entity(Some(100));
        let next = store.create_entity(None);
        assert_eq!(next, 101);
    }
}
