//! Flow Field (C5) — shared-destination crowd movement.
//!
//! Destinations are quantized before keying the cache so that many units
//! converging on approximately the same point share one field. The LRU
//! cache is hand-rolled (no small utility crate carries this in the
//! reference corpus); the teacher hand-rolls `SpatialGrid` the same way.

use std::collections::{HashMap, VecDeque};

use crate::grid::TileMap;

pub const DESTINATION_QUANTIZATION: f32 = 64.0;
pub const MAX_FLOW_FIELDS: usize = 50;
pub const DEFAULT_EXPIRY_SIM_UNITS: f64 = 10_000.0;
const IMPASSABLE_COST: u16 = 65535;
const IMPASSABLE_DIR: u8 = 255;

const CARDINAL_COST: u16 = 10;
const DIAGONAL_COST: u16 = 14;

/// 8-neighbor offsets, direction index matches `direction_to_vector`.
const NEIGHBORS: [(i32, i32, u16); 8] = [
    (1, 0, CARDINAL_COST),
    (1, 1, DIAGONAL_COST),
    (0, 1, CARDINAL_COST),
    (-1, 1, DIAGONAL_COST),
    (-1, 0, CARDINAL_COST),
    (-1, -1, DIAGONAL_COST),
    (0, -1, CARDINAL_COST),
    (1, -1, DIAGONAL_COST),
];

fn direction_to_vector(dir: u8) -> (f32, f32) {
    match dir {
        0 => (1.0, 0.0),
        1 => (std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
        2 => (0.0, 1.0),
        3 => (-std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2),
        4 => (-1.0, 0.0),
        5 => (-std::f32::consts::FRAC_1_SQRT_2, -std::f32::consts::FRAC_1_SQRT_2),
        6 => (0.0, -1.0),
        7 => (std::f32::consts::FRAC_1_SQRT_2, -std::f32::consts::FRAC_1_SQRT_2),
        _ => (0.0, 0.0),
    }
}

/// Cache key: quantized goal cell.
pub type FieldKey = (i32, i32);

pub fn quantize(x: f32, z: f32) -> FieldKey {
    (
        (x / DESTINATION_QUANTIZATION).round() as i32,
        (z / DESTINATION_QUANTIZATION).round() as i32,
    )
}

#[derive(Debug, Clone)]
pub struct FlowField {
    pub goal_cell: (i32, i32),
    pub width: i32,
    pub height: i32,
    pub cost: Vec<u16>,
    pub direction: Vec<u8>,
    pub last_accessed: f64,
}

impl FlowField {
    fn index(&self, x: i32, z: i32) -> Option<usize> {
        if x >= 0 && z >= 0 && x < self.width && z < self.height {
            Some((z * self.width + x) as usize)
        } else {
            None
        }
    }

    pub fn cost_at(&self, x: i32, z: i32) -> u16 {
        self.index(x, z).map(|i| self.cost[i]).unwrap_or(IMPASSABLE_COST)
    }

    pub fn direction_at(&self, x: i32, z: i32) -> Option<(f32, f32)> {
        let i = self.index(x, z)?;
        let dir = self.direction[i];
        if dir == IMPASSABLE_DIR {
            None
        } else {
            Some(direction_to_vector(dir))
        }
    }

    /// Within one nav-cell of the goal — used by consumers as a termination
    /// test (§4.4).
    pub fn is_at_goal(&self, x: i32, z: i32) -> bool {
        (x - self.goal_cell.0).abs() <= 1 && (z - self.goal_cell.1).abs() <= 1
    }
}

fn build_field(tiles: &TileMap, goal_cell: (i32, i32)) -> FlowField {
    let width = tiles.width;
    let height = tiles.height;
    let mut cost = vec![IMPASSABLE_COST; (width * height) as usize];
    let mut direction = vec![IMPASSABLE_DIR; (width * height) as usize];

    let idx = |x: i32, z: i32| (z * width + x) as usize;

    if tiles.is_walkable(goal_cell.0, goal_cell.1) && goal_cell.0 >= 0 && goal_cell.1 >= 0 && goal_cell.0 < width && goal_cell.1 < height {
        cost[idx(goal_cell.0, goal_cell.1)] = 0;
        let mut queue = VecDeque::new();
        queue.push_back(goal_cell);

        while let Some(cell) = queue.pop_front() {
            let current_cost = cost[idx(cell.0, cell.1)];
            for (dx, dz, step) in NEIGHBORS {
                let n = (cell.0 + dx, cell.1 + dz);
                if n.0 < 0 || n.1 < 0 || n.0 >= width || n.1 >= height {
                    continue;
                }
                if !tiles.is_walkable(n.0, n.1) {
                    continue;
                }
                let tentative = current_cost.saturating_add(step);
                let ni = idx(n.0, n.1);
                if tentative < cost[ni] {
                    cost[ni] = tentative;
                    queue.push_back(n);
                }
            }
        }

        // direction field: each cell points at its minimum-cost neighbor.
        for z in 0..height {
            for x in 0..width {
                let i = idx(x, z);
                if cost[i] == IMPASSABLE_COST {
                    continue;
                }
                let mut best_dir = IMPASSABLE_DIR;
                let mut best_cost = cost[i];
                for (dir_index, (dx, dz, _)) in NEIGHBORS.iter().enumerate() {
                    let n = (x + dx, z + dz);
                    if n.0 < 0 || n.1 < 0 || n.0 >= width || n.1 >= height {
                        continue;
                    }
                    let nc = cost[idx(n.0, n.1)];
                    if nc < best_cost {
                        best_cost = nc;
                        best_dir = dir_index as u8;
                    }
                }
                direction[i] = best_dir;
            }
        }
    }

    FlowField { goal_cell, width, height, cost, direction, last_accessed: 0.0 }
}

/// Bounded LRU cache of flow fields. Eviction is strictly least-recently-
/// accessed; `get_or_create` updates `last_accessed` on every hit.
#[derive(Debug, Default)]
pub struct FlowFieldCache {
    fields: HashMap<FieldKey, FlowField>,
    /// Access order, most-recent last.
    lru: VecDeque<FieldKey>,
    assignments: HashMap<u64, FieldKey>,
    capacity: usize,
    expiry: f64,
}

impl FlowFieldCache {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            lru: VecDeque::new(),
            assignments: HashMap::new(),
            capacity: MAX_FLOW_FIELDS,
            expiry: DEFAULT_EXPIRY_SIM_UNITS,
        }
    }

    fn touch(&mut self, key: FieldKey) {
        self.lru.retain(|k| *k != key);
        self.lru.push_back(key);
    }

    pub fn get_or_create_flow_field(&mut self, tiles: &TileMap, x: f32, z: f32, now: f64) -> FieldKey {
        let key = quantize(x, z);
        if let Some(field) = self.fields.get_mut(&key) {
            field.last_accessed = now;
            self.touch(key);
            return key;
        }

        let goal_cell = (key.0 * DESTINATION_QUANTIZATION as i32, key.1 * DESTINATION_QUANTIZATION as i32);
        let mut field = build_field(tiles, nearest_walkable(tiles, goal_cell).unwrap_or(goal_cell));
        field.last_accessed = now;

        if self.fields.len() >= self.capacity {
            if let Some(victim) = self.lru.pop_front() {
                self.fields.remove(&victim);
                self.assignments.retain(|_, v| *v != victim);
            }
        }
        self.fields.insert(key, field);
        self.touch(key);
        key
    }

    pub fn field(&self, key: FieldKey) -> Option<&FlowField> {
        self.fields.get(&key)
    }

    pub fn assign_entity(&mut self, entity_id: u64, key: FieldKey) {
        self.assignments.insert(entity_id, key);
    }

    pub fn direction_for_entity(&self, entity_id: u64, x: i32, z: i32) -> Option<(f32, f32)> {
        let key = self.assignments.get(&entity_id)?;
        let field = self.fields.get(key)?;
        field.direction_at(x, z)
    }

    pub fn evict_expired(&mut self, now: f64) {
        let expired: Vec<FieldKey> = self
            .fields
            .iter()
            .filter(|(_, f)| now - f.last_accessed > self.expiry)
            .map(|(k, _)| *k)
            .collect();
        for key in expired {
            self.fields.remove(&key);
            self.lru.retain(|k| *k != key);
            self.assignments.retain(|_, v| *v != key);
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Fans out up to a 2-ring search for the nearest walkable cell; `None` if
/// none found (out-of-bounds samples also return `None`, per §4.4).
fn nearest_walkable(tiles: &TileMap, cell: (i32, i32)) -> Option<(i32, i32)> {
    if tiles.is_walkable(cell.0, cell.1) {
        return Some(cell);
    }
    for ring in 1..=2 {
        for dz in -ring..=ring {
            for dx in -ring..=ring {
                if dx.abs() != ring && dz.abs() != ring {
                    continue;
                }
                let candidate = (cell.0 + dx, cell.1 + dz);
                if tiles.is_walkable(candidate.0, candidate.1) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileAttributes;

    #[test]
    fn quantization_buckets_nearby_destinations_together() {
        assert_eq!(quantize(10.0, 10.0), quantize(20.0, 5.0));
    }

    #[test]
    fn get_or_create_is_idempotent_and_updates_last_accessed() {
        let tiles = TileMap::new_open(200, 200);
        let mut cache = FlowFieldCache::new();
        let k1 = cache.get_or_create_flow_field(&tiles, 0.0, 0.0, 1.0);
        let k2 = cache.get_or_create_flow_field(&tiles, 1.0, 1.0, 2.0);
        assert_eq!(k1, k2);
        assert_eq!(cache.field(k1).unwrap().last_accessed, 2.0);
    }

    #[test]
    fn eviction_is_strictly_lru() {
        let tiles = TileMap::new_open(2000, 2000);
        let mut cache = FlowFieldCache::new();
        cache.capacity = 3;
        let spacing = DESTINATION_QUANTIZATION * 2.0;
        let k0 = cache.get_or_create_flow_field(&tiles, 0.0, 0.0, 0.0);
        let k1 = cache.get_or_create_flow_field(&tiles, spacing, 0.0, 0.0);
        let k2 = cache.get_or_create_flow_field(&tiles, spacing * 2.0, 0.0, 0.0);
        cache.assign_entity(1, k0);
        let k3 = cache.get_or_create_flow_field(&tiles, spacing * 3.0, 0.0, 0.0);

        assert!(cache.field(k0).is_none(), "oldest field should be evicted");
        assert!(cache.field(k1).is_some());
        assert!(cache.field(k2).is_some());
        assert!(cache.field(k3).is_some());
        assert!(cache.direction_for_entity(1, 0, 0).is_none());
    }

    #[test]
    fn impassable_goal_yields_null_directions() {
        let mut tiles = TileMap::new_open(10, 10);
        for z in 0..10 {
            for x in 0..10 {
                tiles.set(x, z, TileAttributes { walkable: false, buildable: false });
            }
        }
        let mut cache = FlowFieldCache::new();
        let key = cache.get_or_create_flow_field(&tiles, 0.0, 0.0, 0.0);
        let field = cache.field(key).unwrap();
        assert!(field.direction_at(0, 0).is_none());
    }
}
