//! Behavior Executor (C8).
//!
//! Trees are a registry of tagged nodes addressed by `(collection, index)` —
//! never trait objects — so `aiState` only ever stores small integers (§9
//! "dynamic dispatch -> tagged variants"). Collection `0` is composites
//! (`behaviorTrees`: Selector/Sequence plus the domain trees Abilities,
//! Combat, Universal); collection `1` is leaves (`behaviorActions`: Move,
//! AttackEnemy, Combat, Mine, Build, Idle).

use std::collections::HashMap;

use bevy_ecs::prelude::*;

use crate::components::{ActionStatus, AiState, BehaviorMeta, Combat, EntityId, Team, Transform};

pub type NodeRef = (i32, i32);

pub const TREES_COLLECTION: i32 = 0;
pub const ACTIONS_COLLECTION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Selector,
    Sequence,
}

#[derive(Debug, Clone)]
pub struct CompositeNode {
    pub name: String,
    pub kind: CompositeKind,
    pub children: Vec<NodeRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Move,
    AttackEnemy,
    Combat,
    Mine,
    Build,
    Idle,
    /// Selected only by the Abilities composite's ability gate; never
    /// reached by `evaluate_leaf`'s own recursion.
    CastAbility,
}

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub name: String,
    pub kind: LeafKind,
}

/// Loaded once at init; `aiState` stores indices into this table rather
/// than names.
#[derive(Resource, Debug, Default)]
pub struct BehaviorRegistry {
    pub trees: Vec<CompositeNode>,
    pub actions: Vec<LeafNode>,
    pub name_to_tree: HashMap<String, i32>,
    pub name_to_action: HashMap<String, i32>,
    pub root: NodeRef,
}

impl BehaviorRegistry {
    fn add_tree(&mut self, node: CompositeNode) -> i32 {
        let index = self.trees.len() as i32;
        self.name_to_tree.insert(node.name.clone(), index);
        self.trees.push(node);
        index
    }

    fn add_action(&mut self, node: LeafNode) -> i32 {
        let index = self.actions.len() as i32;
        self.name_to_action.insert(node.name.clone(), index);
        self.actions.push(node);
        index
    }

    /// Default tree layout: Universal -> Selector[Combat, Abilities, Move, Idle].
    /// Combat -> Sequence[AttackEnemy]; Abilities is handled specially by the
    /// executor (it needs the unit's ability list, not static children).
    pub fn standard() -> Self {
        let mut reg = Self::default();

        let attack_enemy = reg.add_action(LeafNode { name: "AttackEnemy".into(), kind: LeafKind::AttackEnemy });
        let move_action = reg.add_action(LeafNode { name: "Move".into(), kind: LeafKind::Move });
        let idle = reg.add_action(LeafNode { name: "Idle".into(), kind: LeafKind::Idle });
        let mine = reg.add_action(LeafNode { name: "Mine".into(), kind: LeafKind::Mine });
        let build = reg.add_action(LeafNode { name: "Build".into(), kind: LeafKind::Build });
        reg.add_action(LeafNode { name: "CastAbility".into(), kind: LeafKind::CastAbility });

        let combat_tree = reg.add_tree(CompositeNode {
            name: "Combat".into(),
            kind: CompositeKind::Sequence,
            children: vec![(ACTIONS_COLLECTION, attack_enemy)],
        });
        let abilities_tree = reg.add_tree(CompositeNode {
            name: "Abilities".into(),
            kind: CompositeKind::Selector,
            children: Vec::new(), // populated per-unit by the caller via ability gating
        });
        let move_tree = reg.add_tree(CompositeNode {
            name: "MoveTree".into(),
            kind: CompositeKind::Sequence,
            children: vec![(ACTIONS_COLLECTION, move_action)],
        });
        let gather_tree = reg.add_tree(CompositeNode {
            name: "Gather".into(),
            kind: CompositeKind::Selector,
            children: vec![(ACTIONS_COLLECTION, mine), (ACTIONS_COLLECTION, build)],
        });
        let idle_tree = reg.add_tree(CompositeNode {
            name: "IdleTree".into(),
            kind: CompositeKind::Sequence,
            children: vec![(ACTIONS_COLLECTION, idle)],
        });

        let universal = reg.add_tree(CompositeNode {
            name: "UniversalBehaviorTree".into(),
            kind: CompositeKind::Selector,
            children: vec![
                (TREES_COLLECTION, combat_tree),
                (TREES_COLLECTION, abilities_tree),
                (TREES_COLLECTION, gather_tree),
                (TREES_COLLECTION, move_tree),
                (TREES_COLLECTION, idle_tree),
            ],
        });

        reg.root = (TREES_COLLECTION, universal);
        reg
    }

    pub fn abilities_node(&self) -> Option<NodeRef> {
        self.name_to_tree.get("Abilities").map(|&i| (TREES_COLLECTION, i))
    }

    pub fn cast_ability_action(&self) -> Option<NodeRef> {
        self.name_to_action.get("CastAbility").map(|&i| (ACTIONS_COLLECTION, i))
    }
}

/// Read-only view of the world a leaf action needs to decide whether it
/// applies. `nearby_enemies` is already ascending-ID, per §4.2/§4.8.
#[derive(Debug, Clone)]
pub struct EntityContext<'a> {
    pub entity_id: u64,
    pub transform: Transform,
    pub team: Team,
    pub combat: Combat,
    pub now: f64,
    pub nearby_enemies: &'a [(u64, Transform)],
}

fn closest_enemy<'a>(ctx: &EntityContext<'a>) -> Option<(u64, Transform)> {
    ctx.nearby_enemies
        .iter()
        .min_by(|a, b| {
            let da = ctx.transform.distance_to(&a.1);
            let db = ctx.transform.distance_to(&b.1);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        })
        .copied()
}

/// Leaf evaluation. Writes the target into `meta` when it applies; a leaf
/// that does not apply returns `Failure` and leaves `meta` untouched.
fn evaluate_leaf(kind: LeafKind, ctx: &EntityContext, meta: &mut BehaviorMeta) -> ActionStatus {
    match kind {
        LeafKind::AttackEnemy => match closest_enemy(ctx) {
            Some((id, transform)) if ctx.transform.distance_to(&transform) <= ctx.combat.range => {
                meta.target_entity = Some(id);
                meta.target_position = Some((transform.x, transform.z));
                ActionStatus::Running
            }
            _ => ActionStatus::Failure,
        },
        LeafKind::Move => match closest_enemy(ctx) {
            Some((id, transform)) => {
                meta.target_entity = Some(id);
                meta.target_position = Some((transform.x, transform.z));
                ActionStatus::Running
            }
            None => ActionStatus::Failure,
        },
        LeafKind::Mine | LeafKind::Build => ActionStatus::Failure,
        LeafKind::CastAbility => ActionStatus::Failure,
        LeafKind::Idle => {
            meta.target_position = None;
            meta.target_entity = None;
            ActionStatus::Success
        }
        LeafKind::Combat => ActionStatus::Failure,
    }
}

/// Result of evaluating a composite/leaf: which leaf action ended up
/// selected (if any) and its status.
#[derive(Debug, Clone, Copy)]
pub struct EvalResult {
    pub action: NodeRef,
    pub status: ActionStatus,
}

/// `ability_gate(ability_index)` returns `Some(status)` if that ability
/// fires this tick (declared order, first non-null wins per §4.7); `None`
/// to fall through to the next ability.
pub fn evaluate_tree(
    registry: &BehaviorRegistry,
    node: NodeRef,
    ctx: &EntityContext,
    meta: &mut BehaviorMeta,
    ability_gate: &mut dyn FnMut(usize, &EntityContext) -> Option<(ActionStatus, NodeRef)>,
) -> Option<EvalResult> {
    match node.0 {
        ACTIONS_COLLECTION => {
            let leaf = registry.actions.get(node.1 as usize)?;
            let status = evaluate_leaf(leaf.kind, ctx, meta);
            if status == ActionStatus::Failure {
                None
            } else {
                Some(EvalResult { action: node, status })
            }
        }
        TREES_COLLECTION => {
            let composite = registry.trees.get(node.1 as usize)?;
            if composite.name == "Abilities" {
                for ability_index in 0.. {
                    match ability_gate(ability_index, ctx) {
                        Some((status, action_ref)) if status != ActionStatus::Failure => {
                            return Some(EvalResult { action: action_ref, status });
                        }
                        Some(_) => continue,
                        None => break,
                    }
                }
                return None;
            }
            match composite.kind {
                CompositeKind::Selector => {
                    for &child in &composite.children {
                        if let Some(result) = evaluate_tree(registry, child, ctx, meta, ability_gate) {
                            return Some(result);
                        }
                    }
                    None
                }
                CompositeKind::Sequence => {
                    let mut last = None;
                    for &child in &composite.children {
                        match evaluate_tree(registry, child, ctx, meta, ability_gate) {
                            Some(result) if result.status == ActionStatus::Failure => return None,
                            Some(result) => last = Some(result),
                            None => return None,
                        }
                    }
                    last
                }
            }
        }
        _ => None,
    }
}

/// What the executor should do this tick, given the current `AiState` and
/// the freshly evaluated candidate (§4.7 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Keep,
    Adopt(NodeRef),
    Switch { from: NodeRef, to: NodeRef },
}

pub fn decide_transition(current: &AiState, candidate: Option<EvalResult>) -> Transition {
    let candidate = match candidate {
        None => return Transition::Keep,
        Some(c) => c,
    };
    if !current.has_current_action() {
        return Transition::Adopt(candidate.action);
    }
    let current_action = (current.current_action_collection, current.current_action);
    if candidate.status == ActionStatus::Running && candidate.action == current_action {
        return Transition::Keep;
    }
    Transition::Switch { from: current_action, to: candidate.action }
}

pub fn apply_transition(ai_state: &mut AiState, transition: Transition, status: ActionStatus) {
    match transition {
        Transition::Keep => {}
        Transition::Adopt(to) | Transition::Switch { to, .. } => {
            ai_state.current_action_collection = to.0;
            ai_state.current_action = to.1;
            ai_state.status = status;
        }
    }
}

/// Runs the full per-entity tick for every AI-controlled entity, ascending
/// by id (§4.7/§5 determinism). `nearby_enemies_of` and `ability_gate`
/// isolate the spatial/ability lookups so this function stays pure and
/// independently testable.
pub fn behavior_executor_system(
    registry: &BehaviorRegistry,
    now: f64,
    entities: &[(u64, Transform, Team, Combat)],
    ai_states: &mut HashMap<u64, AiState>,
    metas: &mut HashMap<u64, BehaviorMeta>,
    nearby_enemies_of: impl Fn(u64) -> Vec<(u64, Transform)>,
    mut ability_gate: impl FnMut(u64, usize, &EntityContext) -> Option<(ActionStatus, NodeRef)>,
) {
    let mut ids: Vec<&(u64, Transform, Team, Combat)> = entities.iter().collect();
    ids.sort_by_key(|e| e.0);

    for (id, transform, team, combat) in ids {
        let enemies = nearby_enemies_of(*id);
        let ctx = EntityContext {
            entity_id: *id,
            transform: *transform,
            team: *team,
            combat: *combat,
            now,
            nearby_enemies: &enemies,
        };
        let meta = metas.entry(*id).or_default();
        let ai_state = ai_states.entry(*id).or_default();

        let result = evaluate_tree(registry, registry.root, &ctx, meta, &mut |idx, ctx| ability_gate(*id, idx, ctx));
        let transition = decide_transition(ai_state, result);
        let status = result.map(|r| r.status).unwrap_or(ActionStatus::Failure);
        apply_transition(ai_state, transition, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_context(id: u64, x: f32, z: f32, enemies: &[(u64, Transform)]) -> EntityContext {
        EntityContext {
            entity_id: id,
            transform: Transform::new(x, 0.0, z),
            team: Team::Left,
            combat: Combat { range: 10.0, ..Default::default() },
            now: 0.0,
            nearby_enemies: enemies,
        }
    }

    #[test]
    fn no_current_action_adopts_candidate() {
        let state = AiState::default();
        let candidate = EvalResult { action: (ACTIONS_COLLECTION, 2), status: ActionStatus::Running };
        assert_eq!(decide_transition(&state, Some(candidate)), Transition::Adopt((ACTIONS_COLLECTION, 2)));
    }

    #[test]
    fn running_same_action_keeps() {
        let state = AiState { current_action_collection: ACTIONS_COLLECTION, current_action: 2, status: ActionStatus::Running };
        let candidate = EvalResult { action: (ACTIONS_COLLECTION, 2), status: ActionStatus::Running };
        assert_eq!(decide_transition(&state, Some(candidate)), Transition::Keep);
    }

    #[test]
    fn different_action_switches() {
        let state = AiState { current_action_collection: ACTIONS_COLLECTION, current_action: 2, status: ActionStatus::Running };
        let candidate = EvalResult { action: (ACTIONS_COLLECTION, 5), status: ActionStatus::Success };
        assert_eq!(
            decide_transition(&state, Some(candidate)),
            Transition::Switch { from: (ACTIONS_COLLECTION, 2), to: (ACTIONS_COLLECTION, 5) }
        );
    }

    #[test]
    fn null_candidate_keeps_current() {
        let state = AiState { current_action_collection: ACTIONS_COLLECTION, current_action: 2, status: ActionStatus::Running };
        assert_eq!(decide_transition(&state, None), Transition::Keep);
    }

    #[test]
    fn attack_enemy_selected_when_in_range() {
        let registry = BehaviorRegistry::standard();
        let enemies = vec![(7u64, Transform::new(5.0, 0.0, 0.0))];
        let ctx = entity_context(1, 0.0, 0.0, &enemies);
        let mut meta = BehaviorMeta::default();
        let result = evaluate_tree(&registry, registry.root, &ctx, &mut meta, &mut |_, _| None);
        let action = result.unwrap().action;
        let leaf = &registry.actions[action.1 as usize];
        assert_eq!(leaf.kind, LeafKind::AttackEnemy);
        assert_eq!(meta.target_entity, Some(7));
    }

    #[test]
    fn abilities_selector_tries_in_declared_order_first_non_null_wins() {
        let registry = BehaviorRegistry::standard();
        let abilities_node = registry.abilities_node().unwrap();
        let mut meta = BehaviorMeta::default();
        let ctx = entity_context(1, 0.0, 0.0, &[]);
        let mut calls = Vec::new();
        let result = evaluate_tree(&registry, abilities_node, &ctx, &mut meta, &mut |idx, _ctx| {
            calls.push(idx);
            match idx {
                0 => None,
                1 => Some((ActionStatus::Running, (ACTIONS_COLLECTION, 0))),
                _ => None,
            }
        });
        assert_eq!(calls, vec![0, 1]);
        assert_eq!(result.unwrap().action, (ACTIONS_COLLECTION, 0));
    }

    #[test]
    fn idle_when_no_enemies_nearby() {
        let registry = BehaviorRegistry::standard();
        let ctx = entity_context(1, 0.0, 0.0, &[]);
        let mut meta = BehaviorMeta::default();
        let result = evaluate_tree(&registry, registry.root, &ctx, &mut meta, &mut |_, _| None);
        let action = result.unwrap().action;
        let leaf = &registry.actions[action.1 as usize];
        assert_eq!(leaf.kind, LeafKind::Idle);
    }
}
