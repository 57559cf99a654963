//! Player Stats (C14) — per-player gold/upgrades/team bookkeeping.
//!
//! The `PlayerStats` component (components.rs) holds the per-player record;
//! this module is the small resource-level registry the protocol coordinator
//! (C13) and placement validation (C3/C12) read and mutate through.

use std::collections::HashMap;

use bevy_ecs::prelude::*;

use crate::components::{PlayerStats, Team};

#[derive(Resource, Debug, Default)]
pub struct PlayerStatsRegistry {
    by_player: HashMap<u32, PlayerStats>,
}

impl PlayerStatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, player_id: u32, team: Team, starting_gold: f32) {
        self.by_player.insert(player_id, PlayerStats::new(player_id, team, starting_gold));
    }

    pub fn get(&self, player_id: u32) -> Option<&PlayerStats> {
        self.by_player.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: u32) -> Option<&mut PlayerStats> {
        self.by_player.get_mut(&player_id)
    }

    /// `true` and deducts gold if the player can afford `cost`; `false` and
    /// leaves state untouched otherwise (§7: validation errors mutate nothing).
    pub fn try_spend(&mut self, player_id: u32, cost: f32) -> bool {
        match self.by_player.get_mut(&player_id) {
            Some(stats) if stats.gold >= cost => {
                stats.gold -= cost;
                true
            }
            _ => false,
        }
    }

    pub fn refund(&mut self, player_id: u32, amount: f32) {
        if let Some(stats) = self.by_player.get_mut(&player_id) {
            stats.gold += amount;
        }
    }

    pub fn add_upgrade(&mut self, player_id: u32, upgrade_id: impl Into<String>) {
        if let Some(stats) = self.by_player.get_mut(&player_id) {
            stats.upgrades.push(upgrade_id.into());
        }
    }

    pub fn gold_of(&self, player_id: u32) -> Option<f32> {
        self.by_player.get(&player_id).map(|s| s.gold)
    }

    /// Every registered player's stats, in no particular order — used by
    /// save/restore (C15) to dump the full roster.
    pub fn all(&self) -> impl Iterator<Item = &PlayerStats> {
        self.by_player.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_fails_without_mutation_when_insufficient() {
        let mut registry = PlayerStatsRegistry::new();
        registry.register(1, Team::Left, 50.0);
        assert!(!registry.try_spend(1, 100.0));
        assert_eq!(registry.gold_of(1), Some(50.0));
    }

    #[test]
    fn spend_then_refund_round_trips() {
        let mut registry = PlayerStatsRegistry::new();
        registry.register(1, Team::Left, 100.0);
        assert!(registry.try_spend(1, 30.0));
        assert_eq!(registry.gold_of(1), Some(70.0));
        registry.refund(1, 30.0);
        assert_eq!(registry.gold_of(1), Some(100.0));
    }
}
