//! ECS components for the tactics simulation core.
//!
//! Components are pure data containers attached to entities. All game logic
//! lives in systems that query these components. Field names follow §3 of
//! the data model directly so that save/restore and the desync hash can
//! walk them mechanically.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Round a value to 6 decimal places — every quantity that crosses a peer
/// boundary (position, velocity, rotation, hash input) goes through this.
#[inline]
pub fn round6(v: f32) -> f32 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Stable, server-authoritative entity identifier. Distinct from bevy's
/// internal `Entity` (whose index may be recycled); this counter never is.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Which side of the arena an entity belongs to.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Left,
    Right,
}

impl Default for Team {
    fn default() -> Self {
        Self::Left
    }
}

impl Team {
    pub fn opposite(&self) -> Team {
        match self {
            Team::Left => Team::Right,
            Team::Right => Team::Left,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            Team::Left => 0,
            Team::Right => 1,
        }
    }
}

// ============================================================================
// SPATIAL / MOVEMENT
// ============================================================================

/// World-space transform. `y` is height (terrain-clamped unless leaping);
/// `x`/`z` are the ground plane.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation_y: f32,
}

impl Transform {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, rotation_y: 0.0 }
    }

    pub fn distance_to(&self, other: &Transform) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn distance_to_xz(&self, x: f32, z: f32) -> f32 {
        let dx = self.x - x;
        let dz = self.z - z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Velocity plus the flags that gate movement integration.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub max_speed: f32,
    pub anchored: bool,
    pub affected_by_gravity: bool,
}

impl Velocity {
    pub fn new(max_speed: f32) -> Self {
        Self {
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            max_speed,
            anchored: false,
            affected_by_gravity: true,
        }
    }

    pub fn horizontal_magnitude(&self) -> f32 {
        (self.vx * self.vx + self.vz * self.vz).sqrt()
    }
}

pub const DEFAULT_UNIT_RADIUS: f32 = 0.5;

/// Collision radius; invariant `radius >= DEFAULT_UNIT_RADIUS`.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Collision {
    pub radius: f32,
}

impl Default for Collision {
    fn default() -> Self {
        Self { radius: DEFAULT_UNIT_RADIUS }
    }
}

impl Collision {
    pub fn new(radius: f32) -> Self {
        Self { radius: radius.max(DEFAULT_UNIT_RADIUS) }
    }
}

/// Scratch state carried across ticks by the movement pipeline (C9).
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct MovementState {
    pub last_position: (f32, f32),
    pub stuck_time: f32,
    /// Committed avoidance side; `None` until an obstacle forces a choice.
    pub avoidance_direction: Option<AvoidanceSide>,
    /// Ring buffer of the last 5 desired directions, used to damp oscillation.
    pub velocity_history: VecDeque<(f32, f32)>,
    pub smoothed_direction: (f32, f32),
    pub damped_forces: (f32, f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvoidanceSide {
    Left,
    Right,
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            last_position: (0.0, 0.0),
            stuck_time: 0.0,
            avoidance_direction: None,
            velocity_history: VecDeque::with_capacity(5),
            smoothed_direction: (0.0, 0.0),
            damped_forces: (0.0, 0.0),
        }
    }
}

impl MovementState {
    pub const HISTORY_LEN: usize = 5;

    pub fn push_direction(&mut self, dir: (f32, f32)) {
        if self.velocity_history.len() >= Self::HISTORY_LEN {
            self.velocity_history.pop_front();
        }
        self.velocity_history.push_back(dir);
    }

    /// Count of direction reversals in the history at the given angular
    /// threshold — used to detect oscillation and dampen harder.
    pub fn oscillation_count(&self, threshold_rad: f32) -> u32 {
        let dirs: Vec<_> = self.velocity_history.iter().collect();
        if dirs.len() < 2 {
            return 0;
        }
        let mut count = 0;
        for pair in dirs.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dot = (a.0 * b.0 + a.1 * b.1).clamp(-1.0, 1.0);
            let angle = dot.acos();
            if angle >= threshold_rad {
                count += 1;
            }
        }
        count
    }
}

/// Path assignment scratch (C4 consumer side).
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PathFollower {
    pub path_index: usize,
    pub last_path_request: f64,
    pub last_target_x: f32,
    pub last_target_z: f32,
    pub use_direct_movement: bool,
}

/// While true, gravity/ground-clamp/bounds-clamp and normal steering are
/// suspended — the ability driving the leap owns integration.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Leaping {
    pub is_leaping: bool,
}

// ============================================================================
// HEALTH / COMBAT
// ============================================================================

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn fraction(&self) -> f32 {
        if self.max <= 0.0 { 0.0 } else { (self.current / self.max).clamp(0.0, 1.0) }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).clamp(0.0, self.max);
    }

    pub fn heal(&mut self, amount: f32) {
        self.current = (self.current + amount).clamp(0.0, self.max);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    Physical,
    Fire,
    Lightning,
    Shadow,
}

impl Default for Element {
    fn default() -> Self {
        Self::Physical
    }
}

/// Attack-cycle state; `last_attack <= now` is an invariant maintained by
/// `combat::combat_system`.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Combat {
    pub damage: f32,
    pub range: f32,
    pub attack_cooldown: f32,
    pub last_attack: f64,
    pub element: Element,
}

impl Default for Combat {
    fn default() -> Self {
        Self {
            damage: 10.0,
            range: 20.0,
            attack_cooldown: 1.0,
            last_attack: f64::NEG_INFINITY,
            element: Element::Physical,
        }
    }
}

impl Combat {
    pub fn can_attack(&self, now: f64) -> bool {
        now - self.last_attack >= self.attack_cooldown as f64
    }
}

/// Monotonic death progression: alive -> dying -> corpse.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathPhase {
    Alive,
    Dying,
    Corpse,
}

impl Default for DeathPhase {
    fn default() -> Self {
        Self::Alive
    }
}

#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeathState {
    pub phase: DeathPhase,
    pub is_dying: bool,
}

impl DeathState {
    /// Advance one step forward; refuses to move backward.
    pub fn advance_to(&mut self, phase: DeathPhase) {
        let rank = |p: DeathPhase| match p {
            DeathPhase::Alive => 0,
            DeathPhase::Dying => 1,
            DeathPhase::Corpse => 2,
        };
        if rank(phase) > rank(self.phase) {
            self.is_dying = matches!(phase, DeathPhase::Dying);
            self.phase = phase;
        }
    }
}

// ============================================================================
// UNIT TYPE / AI STATE
// ============================================================================

/// The concrete ability pattern a slot casts, plus the parameters that
/// pattern needs beyond the shared `AbilitySlot` fields (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AbilityKind {
    ShadowStrike,
    Meteor { splash_radius: f32 },
    ChainLightning { max_jumps: u32, jump_range: f32, damage_reduction: f32 },
}

/// One entry in a unit type's ability list: the Abilities selector tries
/// these in declared order and casts the first whose cooldown, range, and
/// mana all allow it (§4.7 step 2b, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilitySlot {
    pub kind: AbilityKind,
    pub cooldown: f64,
    pub range: f32,
    pub mana_cost: f32,
    pub cast_time: f64,
    pub base_damage: f32,
}

/// Resolves via static unit-type tables; never a string on the hot path.
/// `abilities` is the unit type's static ability loadout — shared by every
/// unit of this type, unlike the per-instance cooldown/mana state in
/// `AbilityState`.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitType {
    pub collection: u32,
    pub type_index: u32,
    pub abilities: Vec<AbilitySlot>,
}

/// Per-unit mutable ability bookkeeping: last-cast time and remaining mana,
/// indexed in parallel with the unit type's `abilities` list.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct AbilityState {
    pub last_cast: Vec<f64>,
    pub mana: f32,
}

impl AbilityState {
    pub const STARTING_MANA: f32 = 100.0;

    pub fn for_slots(slot_count: usize) -> Self {
        Self { last_cast: vec![f64::NEG_INFINITY; slot_count], mana: Self::STARTING_MANA }
    }

    pub fn is_ready(&self, index: usize, slot: &AbilitySlot, now: f64) -> bool {
        let last = self.last_cast.get(index).copied().unwrap_or(f64::NEG_INFINITY);
        now - last >= slot.cooldown && self.mana >= slot.mana_cost
    }

    pub fn commit_cast(&mut self, index: usize, slot: &AbilitySlot, now: f64) {
        if let Some(last) = self.last_cast.get_mut(index) {
            *last = now;
        }
        self.mana -= slot.mana_cost;
    }
}

impl Default for AbilityState {
    fn default() -> Self {
        Self::for_slots(0)
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Running,
    Success,
    Failure,
}

/// Indices into the behavior-tree collections (C8); never a trait object.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AiState {
    pub current_action_collection: i32,
    pub current_action: i32,
    pub status: ActionStatus,
}

impl Default for AiState {
    fn default() -> Self {
        Self {
            current_action_collection: -1,
            current_action: -1,
            status: ActionStatus::Failure,
        }
    }
}

impl AiState {
    pub fn has_current_action(&self) -> bool {
        self.current_action_collection >= 0 && self.current_action >= 0
    }
}

/// Per-action scratch shared across ticks while the action runs (`meta` in
/// the behavior executor), plus the desired-movement target the behavior
/// tree writes for Movement to consume.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorMeta {
    pub target_position: Option<(f32, f32)>,
    pub target_entity: Option<u64>,
    pub cast_elapsed: f32,
    pub scratch_f32: Vec<f32>,
}

/// Marker for AI-controlled units (everything except inert props).
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct AIControlled;

/// Marker for projectile/visual-effect entities — excluded from Movement's
/// "not a projectile" filter and always lifetime-bound.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Projectile;

// ============================================================================
// PLACEMENT
// ============================================================================

#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub placement_id: i64,
    pub grid_position: (i32, i32),
    pub cells: Vec<(i32, i32)>,
    pub team: Team,
    pub player_id: u32,
    pub unit_type: UnitType,
    pub is_under_construction: bool,
    pub target_position: Option<(f32, f32)>,
    pub assigned_builder: Option<u64>,
}

// ============================================================================
// LIFETIME
// ============================================================================

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lifetime {
    pub start_time: f64,
    pub duration: f64,
    pub permanent: bool,
}

impl Lifetime {
    pub fn new(start_time: f64, duration: f64) -> Self {
        Self { start_time, duration: duration.max(0.0), permanent: false }
    }

    pub fn expires_at(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn is_expired(&self, now: f64) -> bool {
        !self.permanent && now >= self.expires_at()
    }
}

// ============================================================================
// PLAYER STATS
// ============================================================================

#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: u32,
    pub team: Team,
    pub gold: f32,
    pub upgrades: Vec<String>,
}

impl PlayerStats {
    pub fn new(player_id: u32, team: Team, starting_gold: f32) -> Self {
        Self { player_id, team, gold: starting_gold.max(0.0), upgrades: Vec::new() }
    }
}

// ============================================================================
// SQUAD EXPERIENCE
// ============================================================================

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SquadExperience {
    pub level: u8,
    pub experience: f32,
    pub experience_to_next_level: f32,
    pub can_level_up: bool,
    pub squad_value: f32,
}

impl Default for SquadExperience {
    fn default() -> Self {
        Self {
            level: 1,
            experience: 0.0,
            experience_to_next_level: crate::squad::experience_for_level(2),
            can_level_up: false,
            squad_value: 0.0,
        }
    }
}

/// Identifies which squad (placement) a unit entity belongs to — used to
/// aggregate per-unit experience gains to the squad level (§4.11).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SquadId(pub i64);

/// Pristine stats a unit spawned with, before any level bonus (§4.11) is
/// applied. `apply_level_bonuses` always scales from these, never from the
/// current (possibly already-boosted) `health.max`/`combat.damage`.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UnitBase {
    pub max_health: f32,
    pub damage: f32,
}

// ============================================================================
// PERFORMANCE / LOD (ambient, carried from the teacher unchanged in spirit)
// ============================================================================

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimLod {
    #[default]
    High,
    Medium,
    Low,
}

impl SimLod {
    pub fn tick_interval(&self) -> u64 {
        match self {
            SimLod::High => 1,
            SimLod::Medium => 2,
            SimLod::Low => 4,
        }
    }

    #[inline]
    pub fn should_update(&self, tick: u64) -> bool {
        tick % self.tick_interval() == 0
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SectorId(pub i32, pub i32);

impl SectorId {
    pub fn from_position(x: f32, z: f32, sector_size: f32) -> Self {
        Self((x / sector_size).floor() as i32, (z / sector_size).floor() as i32)
    }
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct ActivityFlags {
    pub is_moving: bool,
    pub is_attacking: bool,
    pub recently_damaged: bool,
    pub last_damage_tick: u64,
}

impl ActivityFlags {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.is_moving || self.is_attacking || self.recently_damaged
    }

    pub fn update_damage_status(&mut self, current_tick: u64, damage_memory_ticks: u64) {
        self.recently_damaged = current_tick.saturating_sub(self.last_damage_tick) < damage_memory_ticks;
    }

    pub fn mark_damaged(&mut self, tick: u64) {
        self.last_damage_tick = tick;
        self.recently_damaged = true;
    }
}

// ============================================================================
// BUNDLES
// ============================================================================

/// Bundle for spawning a single battle unit entity.
#[derive(Bundle)]
pub struct UnitBundle {
    pub id: EntityId,
    pub transform: Transform,
    pub velocity: Velocity,
    pub collision: Collision,
    pub health: Health,
    pub combat: Combat,
    pub team: Team,
    pub unit_type: UnitType,
    pub ability_state: AbilityState,
    pub ai_state: AiState,
    pub behavior_meta: BehaviorMeta,
    pub death_state: DeathState,
    pub path_follower: PathFollower,
    pub movement_state: MovementState,
    pub leaping: Leaping,
    pub squad_id: SquadId,
    pub ai_controlled: AIControlled,
    pub sim_lod: SimLod,
    pub sector_id: SectorId,
    pub activity_flags: ActivityFlags,
    pub placement: Placement,
    pub squad_experience: SquadExperience,
    pub unit_base: UnitBase,
}
