//! Pathfinding (C4) — A* over the terrain walkable bitmap.
//!
//! Eight-connected, step cost 10 (cardinal) / 14 (diagonal), deterministic
//! tie-break by lower `(z, x)`. No randomness enters here at all.

use bevy_ecs::prelude::*;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::grid::TileMap;

const CARDINAL_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;
/// A path is stale once the goal has moved more than this many world units
/// from the last requested target (§4.3).
pub const PATH_STALE_DISTANCE: f32 = 50.0;

const NEIGHBORS: [(i32, i32, u32); 8] = [
    (1, 0, CARDINAL_COST),
    (-1, 0, CARDINAL_COST),
    (0, 1, CARDINAL_COST),
    (0, -1, CARDINAL_COST),
    (1, 1, DIAGONAL_COST),
    (1, -1, DIAGONAL_COST),
    (-1, 1, DIAGONAL_COST),
    (-1, -1, DIAGONAL_COST),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f_score: u32,
    // tie-break key: lower (z, x) wins, so we store negatives for a max-heap
    tie_z: i32,
    tie_x: i32,
    cell: (i32, i32),
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest f_score first, and
        // among equal f_scores the smallest (z, x).
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.tie_z.cmp(&self.tie_z))
            .then_with(|| other.tie_x.cmp(&self.tie_x))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn heuristic(a: (i32, i32), b: (i32, i32)) -> u32 {
    let dx = (a.0 - b.0).unsigned_abs();
    let dz = (a.1 - b.1).unsigned_abs();
    let (min, max) = if dx < dz { (dx, dz) } else { (dz, dx) };
    min * DIAGONAL_COST + (max - min) * CARDINAL_COST
}

/// Run A* on the tile map's walkable bitmap. Returns the cell path including
/// `start` and `goal`, or `None` if unreachable.
pub fn astar(tiles: &TileMap, start: (i32, i32), goal: (i32, i32)) -> Option<Vec<(i32, i32)>> {
    if !tiles.is_walkable(goal.0, goal.1) {
        return None;
    }

    let mut open = BinaryHeap::new();
    let mut g_score: HashMap<(i32, i32), u32> = HashMap::new();
    let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();

    g_score.insert(start, 0);
    open.push(OpenEntry {
        f_score: heuristic(start, goal),
        tie_z: -start.1,
        tie_x: -start.0,
        cell: start,
    });

    while let Some(current) = open.pop() {
        if current.cell == goal {
            return Some(reconstruct_path(&came_from, start, goal));
        }
        let current_g = *g_score.get(&current.cell).unwrap_or(&u32::MAX);

        for (dx, dz, step_cost) in NEIGHBORS {
            let neighbor = (current.cell.0 + dx, current.cell.1 + dz);
            if !tiles.is_walkable(neighbor.0, neighbor.1) {
                continue;
            }
            let tentative = current_g.saturating_add(step_cost);
            if tentative < *g_score.get(&neighbor).unwrap_or(&u32::MAX) {
                g_score.insert(neighbor, tentative);
                came_from.insert(neighbor, current.cell);
                open.push(OpenEntry {
                    f_score: tentative + heuristic(neighbor, goal),
                    tie_z: -neighbor.1,
                    tie_x: -neighbor.0,
                    cell: neighbor,
                });
            }
        }
    }

    None
}

fn reconstruct_path(
    came_from: &HashMap<(i32, i32), (i32, i32)>,
    start: (i32, i32),
    goal: (i32, i32),
) -> Vec<(i32, i32)> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Total integer cost to reach `goal` from `start`, or `None` if unreachable
/// (the caller maps that to `+infinity` per §8).
pub fn cost_to_goal(tiles: &TileMap, start: (i32, i32), goal: (i32, i32)) -> Option<u32> {
    astar(tiles, start, goal).map(|path| {
        path.windows(2)
            .map(|pair| {
                let (a, b) = (pair[0], pair[1]);
                if a.0 != b.0 && a.1 != b.1 { DIAGONAL_COST } else { CARDINAL_COST }
            })
            .sum()
    })
}

// ============================================================================
// PER-ENTITY PATH CACHE / ASSIGNMENT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct EntityPath {
    /// World-space waypoints, in order.
    pub waypoints: Vec<(f32, f32)>,
    pub index: usize,
    pub last_target: (f32, f32),
}

impl EntityPath {
    pub fn current_waypoint(&self) -> Option<(f32, f32)> {
        self.waypoints.get(self.index).copied()
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1).min(self.waypoints.len());
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.waypoints.len()
    }
}

/// Resource: maps entity id to its currently assigned path. Synchronous in
/// this implementation — `request_path` either returns a path this tick or
/// `None`; there is no multi-tick background queue because A* over this
/// grid size is itself a single-tick operation, matching the "synchronous
/// cache hit" half of §4.3's contract exactly.
#[derive(Resource, Debug, Default)]
pub struct PathCache {
    paths: HashMap<u64, EntityPath>,
}

impl PathCache {
    pub fn request_path(
        &mut self,
        tiles: &TileMap,
        entity_id: u64,
        cell_size: f32,
        start: (f32, f32),
        target: (f32, f32),
    ) -> Option<&EntityPath> {
        let start_cell = (
            (start.0 / cell_size).floor() as i32,
            (start.1 / cell_size).floor() as i32,
        );
        let goal_cell = (
            (target.0 / cell_size).floor() as i32,
            (target.1 / cell_size).floor() as i32,
        );
        let cells = astar(tiles, start_cell, goal_cell)?;
        let waypoints = cells
            .into_iter()
            .map(|(x, z)| ((x as f32 + 0.5) * cell_size, (z as f32 + 0.5) * cell_size))
            .collect();
        self.paths.insert(
            entity_id,
            EntityPath { waypoints, index: 0, last_target: target },
        );
        self.paths.get(&entity_id)
    }

    pub fn get(&self, entity_id: u64) -> Option<&EntityPath> {
        self.paths.get(&entity_id)
    }

    pub fn get_mut(&mut self, entity_id: u64) -> Option<&mut EntityPath> {
        self.paths.get_mut(&entity_id)
    }

    pub fn set(&mut self, entity_id: u64, path: EntityPath) {
        self.paths.insert(entity_id, path);
    }

    pub fn clear_path(&mut self, entity_id: u64) {
        self.paths.remove(&entity_id);
    }

    /// A cached path is stale once its goal has drifted more than
    /// `PATH_STALE_DISTANCE` from the currently requested target.
    pub fn is_stale(&self, entity_id: u64, current_target: (f32, f32)) -> bool {
        match self.paths.get(&entity_id) {
            Some(path) => {
                let dx = path.last_target.0 - current_target.0;
                let dz = path.last_target.1 - current_target.1;
                (dx * dx + dz * dz).sqrt() > PATH_STALE_DISTANCE
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_straight_path_on_open_grid() {
        let tiles = TileMap::new_open(10, 10);
        let path = astar(&tiles, (0, 0), (5, 0)).unwrap();
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(5, 0)));
    }

    #[test]
    fn diagonal_move_costs_14() {
        let tiles = TileMap::new_open(10, 10);
        let cost = cost_to_goal(&tiles, (0, 0), (3, 3)).unwrap();
        assert_eq!(cost, 3 * DIAGONAL_COST);
    }

    #[test]
    fn unreachable_goal_returns_none() {
        let mut tiles = TileMap::new_open(5, 5);
        tiles.set(4, 4, crate::grid::TileAttributes { walkable: false, buildable: false });
        assert!(astar(&tiles, (0, 0), (4, 4)).is_none());
        assert!(cost_to_goal(&tiles, (0, 0), (4, 4)).is_none());
    }

    #[test]
    fn staleness_detected_past_threshold() {
        let mut cache = PathCache::default();
        let tiles = TileMap::new_open(100, 100);
        cache.request_path(&tiles, 1, 1.0, (0.0, 0.0), (10.0, 0.0));
        assert!(!cache.is_stale(1, (10.0, 0.0)));
        assert!(cache.is_stale(1, (200.0, 0.0)));
    }
}
