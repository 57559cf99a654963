//! Protocol Coordinator (C13).
//!
//! Drives the lobby -> placement -> battle -> post-battle state machine and
//! validates/produces the wire messages §6 tables. There is no transport
//! here — only state transitions and plain `serde`-serializable message
//! bodies a transport layer would send as-is; grounded on the teacher's
//! closest precedent, a flat `PlayerCommand` enum dispatched through a
//! single `handle_command` match (`examples/other_examples` deterrence-sim),
//! generalized to the richer per-phase message table.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::components::{Combat, Health, Placement, SquadExperience, SquadId, Team, UnitBase};
use crate::ecs::EntityStore;
use crate::error::ValidationError;
use crate::grid::{PlacementGrid, TileMap};
use crate::player_stats::PlayerStatsRegistry;
use crate::squad::{spawn_squad, UnitSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Lobby,
    Placement,
    Battle,
    PostBattle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPlacementRequest {
    pub player_id: u32,
    pub team: Team,
    pub grid_position: (i32, i32),
    pub cells: Vec<(i32, i32)>,
    pub cost: f32,
    pub round_placed: u32,
    /// True for a building placement (e.g. under a peasant's construction),
    /// as opposed to an ordinary squad of battle units.
    pub is_building: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedPlacementResponse {
    pub success: bool,
    pub reason: Option<String>,
    pub placement_id: i64,
    pub squad_units: Vec<u64>,
    pub next_entity_id: u64,
    pub server_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyForBattleUpdate {
    pub game_state: GamePhase,
    pub all_ready: bool,
    pub entity_sync: Option<serde_json::Value>,
    pub server_time: Option<f64>,
    pub next_entity_id: Option<u64>,
}

struct UndoEntry {
    placement_id: i64,
    player_id: u32,
    entity_ids: Vec<u64>,
    cost: f32,
    cells: Vec<(i32, i32)>,
}

/// Owns the full server-authoritative room: phase, ECS, placement grid, and
/// player economy. One instance per room/match.
pub struct ProtocolCoordinator {
    pub phase: GamePhase,
    pub store: EntityStore,
    pub placement_grid: PlacementGrid,
    pub tiles: TileMap,
    pub players: PlayerStatsRegistry,
    pub now: f64,
    next_placement_id: i64,
    ready_players: HashSet<u32>,
    undo_stack: Vec<UndoEntry>,
}

impl ProtocolCoordinator {
    pub fn new(tiles: TileMap, placement_grid: PlacementGrid) -> Self {
        Self {
            phase: GamePhase::Lobby,
            store: EntityStore::new(),
            placement_grid,
            tiles,
            players: PlayerStatsRegistry::new(),
            now: 0.0,
            next_placement_id: 0,
            ready_players: HashSet::new(),
            undo_stack: Vec::new(),
        }
    }

    pub fn start_placement_phase(&mut self) {
        self.phase = GamePhase::Placement;
        self.ready_players.clear();
    }

    /// §6 SUBMIT_PLACEMENT -> SUBMITTED_PLACEMENT. Validates phase, gold,
    /// and cell legality before mutating anything (§7: validation errors
    /// never touch state).
    pub fn submit_placement(
        &mut self,
        request: &SubmitPlacementRequest,
        specs: &[UnitSpec],
    ) -> SubmittedPlacementResponse {
        if self.phase != GamePhase::Placement {
            return self.rejected(ValidationError::WrongPhase {
                expected: "placement".into(),
                actual: format!("{:?}", self.phase),
            });
        }
        if !self.placement_grid.is_valid_placement(&request.cells, request.team, &self.tiles) {
            return self.rejected(ValidationError::InvalidPlacement { reason: "cells not valid for team".into() });
        }
        let gold = self.players.gold_of(request.player_id).unwrap_or(0.0);
        if gold < request.cost {
            return self.rejected(ValidationError::InsufficientGold { needed: request.cost, have: gold });
        }
        if !self.players.try_spend(request.player_id, request.cost) {
            return self.rejected(ValidationError::InsufficientGold { needed: request.cost, have: gold });
        }

        let placement_id = self.next_placement_id;
        self.next_placement_id += 1;

        let placement = Placement {
            placement_id,
            grid_position: request.grid_position,
            cells: request.cells.clone(),
            team: request.team,
            player_id: request.player_id,
            unit_type: specs.first().map(|s| s.unit_type.clone()).unwrap_or_default(),
            is_under_construction: request.is_building,
            target_position: None,
            assigned_builder: None,
        };

        let entity_ids = spawn_squad(&mut self.store, &mut self.placement_grid, placement, specs, None);
        self.undo_stack.push(UndoEntry {
            placement_id,
            player_id: request.player_id,
            entity_ids: entity_ids.clone(),
            cost: request.cost,
            cells: request.cells.clone(),
        });

        SubmittedPlacementResponse {
            success: true,
            reason: None,
            placement_id,
            squad_units: entity_ids,
            next_entity_id: self.store.peek_next_id(),
            server_time: self.now,
        }
    }

    fn rejected(&self, error: ValidationError) -> SubmittedPlacementResponse {
        SubmittedPlacementResponse {
            success: false,
            reason: Some(error.to_string()),
            placement_id: -1,
            squad_units: Vec::new(),
            next_entity_id: self.store.peek_next_id(),
            server_time: self.now,
        }
    }

    /// Undoes the most recent placement submitted by `player_id`: destroys
    /// its entities, refunds gold, releases cells (§8 scenario 6).
    pub fn undo_placement(&mut self, player_id: u32) -> Result<(), ValidationError> {
        let position = self
            .undo_stack
            .iter()
            .rposition(|e| e.player_id == player_id)
            .ok_or(ValidationError::PlacementNotFound(-1))?;
        let entry = self.undo_stack.remove(position);

        for id in &entry.entity_ids {
            self.store.destroy_entity(*id);
        }
        self.placement_grid.release_cells(entry.placement_id);
        self.players.refund(entry.player_id, entry.cost);
        Ok(())
    }

    pub fn undo_stack_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// §6 READY_FOR_BATTLE. Returns the broadcast update once both players
    /// (tracked externally via `total_players`) are ready; `None` while
    /// still waiting.
    pub fn mark_ready(
        &mut self,
        player_id: u32,
        total_players: usize,
        entity_sync: impl FnOnce() -> serde_json::Value,
    ) -> ReadyForBattleUpdate {
        self.ready_players.insert(player_id);
        let all_ready = self.ready_players.len() >= total_players;

        if all_ready {
            self.phase = GamePhase::Battle;
            ReadyForBattleUpdate {
                game_state: self.phase,
                all_ready: true,
                entity_sync: Some(entity_sync()),
                server_time: Some(self.now),
                next_entity_id: Some(self.store.peek_next_id()),
            }
        } else {
            ReadyForBattleUpdate {
                game_state: self.phase,
                all_ready: false,
                entity_sync: None,
                server_time: None,
                next_entity_id: None,
            }
        }
    }

    pub fn end_battle(&mut self) {
        self.phase = GamePhase::PostBattle;
    }

    // ------------------------------------------------------------------
    // Other validated commands (§4.12): squad targeting, upgrades, leveling,
    // building cancellation. Each mutates only on success.
    // ------------------------------------------------------------------

    pub fn purchase_upgrade(&mut self, player_id: u32, upgrade_id: &str, cost: f32) -> Result<f32, ValidationError> {
        let gold = self.players.gold_of(player_id).unwrap_or(0.0);
        if !self.players.try_spend(player_id, cost) {
            return Err(ValidationError::InsufficientGold { needed: cost, have: gold });
        }
        self.players.add_upgrade(player_id, upgrade_id.to_string());
        Ok(self.players.gold_of(player_id).unwrap_or(0.0))
    }

    /// §6 LEVEL_SQUAD -> SQUAD_LEVELED: deducts gold if affordable, bumps
    /// every unit's `SquadExperience.level` and rescales health/damage from
    /// its pristine `UnitBase` (§4.11), never stacking onto an
    /// already-boosted value.
    pub fn level_squad(&mut self, player_id: u32, placement_id: i64, cost: f32) -> Result<f32, ValidationError> {
        let squad_units: Vec<u64> = self
            .store
            .entities_with::<SquadId>()
            .into_iter()
            .filter(|&id| self.store.get_component::<SquadId>(id) == Some(SquadId(placement_id)))
            .collect();
        if squad_units.is_empty() {
            return Err(ValidationError::PlacementNotFound(placement_id));
        }
        let owner = self
            .store
            .get_component::<Placement>(squad_units[0])
            .ok_or(ValidationError::PlacementNotFound(placement_id))?;
        if owner.player_id != player_id {
            return Err(ValidationError::InvalidPlacement { reason: "squad not owned by requesting player".into() });
        }

        let gold = self.players.gold_of(player_id).unwrap_or(0.0);
        if !self.players.try_spend(player_id, cost) {
            return Err(ValidationError::InsufficientGold { needed: cost, have: gold });
        }

        for &unit in &squad_units {
            let Some(mut exp) = self.store.get_component::<SquadExperience>(unit) else { continue };
            if exp.level < 10 {
                exp.level += 1;
            }
            exp.experience_to_next_level = crate::squad::experience_for_level(exp.level.saturating_add(1).min(10));
            exp.can_level_up = false;
            self.store.add_component(unit, exp);

            let Some(base) = self.store.get_component::<UnitBase>(unit) else { continue };
            let (Some(mut health), Some(mut combat)) =
                (self.store.get_component::<Health>(unit), self.store.get_component::<Combat>(unit))
            else {
                continue;
            };
            crate::squad::apply_level_bonuses(&mut health, &mut combat, base.max_health, base.damage, exp.level);
            self.store.add_component(unit, health);
            self.store.add_component(unit, combat);
        }

        Ok(self.players.gold_of(player_id).unwrap_or(0.0))
    }

    pub fn cancel_building(&mut self, player_id: u32, building_entity_id: u64, refund: f32) -> Result<f32, ValidationError> {
        let owner = self
            .store
            .get_component::<Placement>(building_entity_id)
            .ok_or(ValidationError::PlacementNotFound(-1))?;
        if owner.player_id != player_id {
            return Err(ValidationError::NotYourBuilding(building_entity_id));
        }
        if !owner.is_under_construction {
            return Err(ValidationError::NotUnderConstruction(building_entity_id));
        }
        self.store.destroy_entity(building_entity_id);
        self.placement_grid.release_cells(owner.placement_id);
        self.players.refund(player_id, refund);
        Ok(self.players.gold_of(player_id).unwrap_or(0.0))
    }
}

#[derive(Debug, Default)]
pub struct SquadTargetLog {
    pub entries: HashMap<i64, ((f32, f32), f64)>,
}

impl SquadTargetLog {
    /// §6 SET_SQUAD_TARGET -> SQUAD_TARGET_SET: stamps server time as the
    /// authoritative `issuedTime`.
    pub fn set_target(&mut self, placement_id: i64, target: (f32, f32), issued_time: f64) {
        self.entries.insert(placement_id, (target, issued_time));
    }
}
