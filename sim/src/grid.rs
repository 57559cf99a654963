//! Grid & Spatial Index (C3).
//!
//! Two coordinate systems coexist: a coarse **placement grid** used for
//! deployment validation, and a finer **terrain grid** (one placement cell
//! spans 0.5 terrain cells per axis). A `SpatialIndex` gives O(k) neighbor
//! queries over live units, generalized from the teacher's `SpatialGrid`
//! (faction -> `Team`, plus a per-entity id reverse lookup keyed on the
//! stable `EntityId` rather than the bevy `Entity`).

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::components::{EntityId, Team, Transform};

// ============================================================================
// TERRAIN TILE MAP
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TileAttributes {
    pub walkable: bool,
    pub buildable: bool,
}

/// A level's terrain walkability/buildability map plus the two starting
/// locations used to derive each team's half of the arena.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct TileMap {
    pub width: i32,
    pub height: i32,
    pub tiles: Vec<TileAttributes>,
    pub starting_locations: Vec<(i32, i32)>,
}

impl TileMap {
    pub fn new_open(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            tiles: vec![TileAttributes { walkable: true, buildable: true }; (width * height) as usize],
            starting_locations: vec![(width / 8, height / 2), (width - width / 8, height / 2)],
        }
    }

    fn index(&self, x: i32, z: i32) -> Option<usize> {
        if x >= 0 && z >= 0 && x < self.width && z < self.height {
            Some((z * self.width + x) as usize)
        } else {
            None
        }
    }

    pub fn get(&self, x: i32, z: i32) -> Option<TileAttributes> {
        self.index(x, z).map(|i| self.tiles[i])
    }

    pub fn set(&mut self, x: i32, z: i32, attrs: TileAttributes) {
        if let Some(i) = self.index(x, z) {
            self.tiles[i] = attrs;
        }
    }

    pub fn is_walkable(&self, x: i32, z: i32) -> bool {
        self.get(x, z).map(|t| t.walkable).unwrap_or(false)
    }

    pub fn is_buildable(&self, x: i32, z: i32) -> bool {
        self.get(x, z).map(|t| t.buildable).unwrap_or(false)
    }
}

// ============================================================================
// PLACEMENT GRID
// ============================================================================

/// One placement cell = `0.5` terrain cells per axis: converting placement
/// -> terrain divides by 2 and floors; see §4.2.
pub const PLACEMENT_TO_TERRAIN_RATIO: i32 = 2;

#[inline]
pub fn placement_cell_to_terrain(cell: (i32, i32)) -> (i32, i32) {
    (
        cell.0.div_euclid(PLACEMENT_TO_TERRAIN_RATIO),
        cell.1.div_euclid(PLACEMENT_TO_TERRAIN_RATIO),
    )
}

#[derive(Resource, Debug, Clone)]
pub struct PlacementGrid {
    pub cell_size: f32,
    pub width: i32,
    pub height: i32,
    /// Which entity owns each reserved cell.
    cell_owner: HashMap<(i32, i32), u64>,
    /// Reverse lookup for `release_cells`.
    placement_cells: HashMap<i64, Vec<(i32, i32)>>,
}

impl PlacementGrid {
    pub fn new(cell_size: f32, width: i32, height: i32) -> Self {
        Self {
            cell_size,
            width,
            height,
            cell_owner: HashMap::new(),
            placement_cells: HashMap::new(),
        }
    }

    pub fn world_to_grid(&self, x: f32, z: f32) -> (i32, i32) {
        ((x / self.cell_size).floor() as i32, (z / self.cell_size).floor() as i32)
    }

    pub fn grid_to_world(&self, cell: (i32, i32)) -> (f32, f32) {
        (
            (cell.0 as f32 + 0.5) * self.cell_size,
            (cell.1 as f32 + 0.5) * self.cell_size,
        )
    }

    pub fn is_occupied(&self, cell: (i32, i32)) -> bool {
        self.cell_owner.contains_key(&cell)
    }

    /// Team's half of the arena: left team occupies `x < width/2`, right
    /// team occupies `x >= width/2`.
    pub fn is_in_team_half(&self, cell: (i32, i32), team: Team) -> bool {
        let mid = self.width / 2;
        match team {
            Team::Left => cell.0 < mid,
            Team::Right => cell.0 >= mid,
        }
    }

    pub fn is_in_bounds(&self, cell: (i32, i32)) -> bool {
        cell.0 >= 0 && cell.1 >= 0 && cell.0 < self.width && cell.1 < self.height
    }

    /// §4.2: every cell must be in bounds, in the team's half, unoccupied,
    /// and on buildable+walkable terrain.
    pub fn is_valid_placement(&self, cells: &[(i32, i32)], team: Team, tiles: &TileMap) -> bool {
        cells.iter().all(|&cell| {
            self.is_in_bounds(cell)
                && self.is_in_team_half(cell, team)
                && !self.is_occupied(cell)
                && {
                    let t = placement_cell_to_terrain(cell);
                    tiles.is_walkable(t.0, t.1) && tiles.is_buildable(t.0, t.1)
                }
        })
    }

    pub fn reserve_cells(&mut self, cells: &[(i32, i32)], entity_id: u64, placement_id: i64) {
        for &cell in cells {
            self.cell_owner.insert(cell, entity_id);
        }
        self.placement_cells.insert(placement_id, cells.to_vec());
    }

    /// Returns the released cells, or an empty vec if the placement was
    /// unknown (idempotent: releasing twice is harmless).
    pub fn release_cells(&mut self, placement_id: i64) -> Vec<(i32, i32)> {
        let cells = self.placement_cells.remove(&placement_id).unwrap_or_default();
        for cell in &cells {
            self.cell_owner.remove(cell);
        }
        cells
    }

    /// Building footprint in placement cells is `footprint * 2` per axis.
    pub fn footprint_cells(origin: (i32, i32), footprint_width: i32, footprint_height: i32) -> Vec<(i32, i32)> {
        let mut cells = Vec::with_capacity((footprint_width * 2 * footprint_height * 2) as usize);
        for dz in 0..footprint_height * PLACEMENT_TO_TERRAIN_RATIO {
            for dx in 0..footprint_width * PLACEMENT_TO_TERRAIN_RATIO {
                cells.push((origin.0 + dx, origin.1 + dz));
            }
        }
        cells
    }
}

// ============================================================================
// SPATIAL INDEX
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub id: u64,
    pub x: f32,
    pub z: f32,
    pub team: Team,
}

/// Uniform-grid neighbor index rebuilt once per tick from `Transform`+`Team`.
#[derive(Resource, Debug, Default)]
pub struct SpatialIndex {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        Self { cell_size: cell_size.max(1.0), cells: HashMap::new() }
    }

    fn cell_of(&self, x: f32, z: f32) -> (i32, i32) {
        ((x / self.cell_size).floor() as i32, (z / self.cell_size).floor() as i32)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn insert(&mut self, id: u64, x: f32, z: f32, team: Team) {
        let cell = self.cell_of(x, z);
        self.cells.entry(cell).or_default().push(SpatialEntry { id, x, z, team });
    }

    /// §4.2: all entities within a *square* of side `2*radius` centered on
    /// `pos`, excluding `self_id`, ascending by id. Radius 0 -> empty;
    /// callers needing "every live entity" pass a radius covering the
    /// whole arena.
    pub fn nearby_units(&self, pos: (f32, f32), radius: f32, self_id: u64) -> Vec<u64> {
        if radius <= 0.0 {
            return Vec::new();
        }
        let cell_span = (radius / self.cell_size).ceil() as i32 + 1;
        let center = self.cell_of(pos.0, pos.1);
        let mut out = Vec::new();
        for dz in -cell_span..=cell_span {
            for dx in -cell_span..=cell_span {
                let cell = (center.0 + dx, center.1 + dz);
                if let Some(entries) = self.cells.get(&cell) {
                    for e in entries {
                        if e.id == self_id {
                            continue;
                        }
                        if (e.x - pos.0).abs() <= radius && (e.z - pos.1).abs() <= radius {
                            out.push(e.id);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn nearby_enemies(&self, pos: (f32, f32), radius: f32, self_id: u64, my_team: Team) -> Vec<u64> {
        let all = self.nearby_units(pos, radius, self_id);
        all.into_iter()
            .filter(|id| self.team_of(*id).map(|t| t != my_team).unwrap_or(false))
            .collect()
    }

    fn team_of(&self, id: u64) -> Option<Team> {
        self.cells.values().flatten().find(|e| e.id == id).map(|e| e.team)
    }
}

/// Rebuild the spatial index each tick from live transforms.
pub fn spatial_index_update_system(
    mut index: ResMut<SpatialIndex>,
    query: Query<(&EntityId, &Transform, &Team, &crate::components::Health)>,
) {
    index.clear();
    for (id, transform, team, health) in query.iter() {
        if !health.is_alive() {
            continue;
        }
        index.insert(id.0, transform.x, transform.z, *team);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_units_excludes_self_and_sorts_ascending() {
        let mut idx = SpatialIndex::new(10.0);
        idx.insert(5, 0.0, 0.0, Team::Left);
        idx.insert(1, 2.0, 0.0, Team::Left);
        idx.insert(3, -2.0, 0.0, Team::Right);

        let result = idx.nearby_units((0.0, 0.0), 5.0, 5);
        assert_eq!(result, vec![1, 3]);
    }

    #[test]
    fn radius_zero_returns_empty() {
        let mut idx = SpatialIndex::new(10.0);
        idx.insert(1, 0.0, 0.0, Team::Left);
        assert!(idx.nearby_units((0.0, 0.0), 0.0, 99).is_empty());
    }

    #[test]
    fn placement_validity_checks_bounds_occupancy_terrain_and_half() {
        let mut grid = PlacementGrid::new(1.0, 16, 16);
        let tiles = TileMap::new_open(8, 8);
        let cells = vec![(2, 7), (3, 7), (2, 8), (3, 8)];
        assert!(grid.is_valid_placement(&cells, Team::Left, &tiles));

        grid.reserve_cells(&cells, 42, 1);
        assert!(!grid.is_valid_placement(&cells, Team::Left, &tiles));

        let right_side_cells = vec![(9, 7)];
        assert!(!grid.is_valid_placement(&right_side_cells, Team::Left, &tiles));
    }

    #[test]
    fn release_is_idempotent() {
        let mut grid = PlacementGrid::new(1.0, 16, 16);
        let cells = vec![(1, 1)];
        grid.reserve_cells(&cells, 1, 7);
        assert_eq!(grid.release_cells(7), cells);
        assert_eq!(grid.release_cells(7), Vec::new());
    }

    #[test]
    fn placement_to_terrain_halves_coordinates() {
        assert_eq!(placement_cell_to_terrain((2, 7)), (1, 3));
        assert_eq!(placement_cell_to_terrain((3, 7)), (1, 3));
    }
}
