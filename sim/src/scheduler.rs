//! Action Scheduler (C6).
//!
//! Entries are tagged `(tag, parameters)` records dispatched by name rather
//! than closures (§9 "callback scheduling -> message passing"): this keeps
//! pending actions serializable across a save boundary and avoids storing
//! un-`Clone`-able trait objects. Ability code (C10) and the behavior
//! executor (C8) push tags here; `api.rs` owns the dispatch table mapping
//! tags back to effects.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

pub type ActionId = u64;

/// Small bag of parameters a scheduled callback needs. Kept deliberately
/// shallow — richer payloads belong in a side table keyed by `ActionId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionParams {
    pub entity: Option<u64>,
    pub target: Option<u64>,
    pub position: Option<(f32, f32)>,
    pub index: Option<u32>,
    pub amount: Option<f32>,
    /// Second scalar slot — e.g. a splash radius carried alongside `amount`
    /// as a base damage, so impact handlers don't have to re-derive either
    /// from components that may have changed between cast and impact.
    pub radius: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: ActionId,
    pub tag: String,
    pub params: ActionParams,
    pub execute_time: f64,
    pub owner: Option<u64>,
    /// Insertion sequence number, used to break execute_time ties in FIFO
    /// order (§4.5, §8).
    sequence: u64,
}

/// A callback whose tag the dispatcher didn't recognize, or whose handler
/// returned an error, is logged and skipped without blocking the others
/// scheduled for the same tick (§7).
#[derive(Debug, Clone)]
pub struct FailedAction {
    pub id: ActionId,
    pub tag: String,
    pub reason: String,
}

#[derive(Resource, Debug, Default)]
pub struct ActionScheduler {
    pending: HashMap<ActionId, ScheduledAction>,
    next_id: ActionId,
    next_sequence: u64,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_action(
        &mut self,
        tag: impl Into<String>,
        params: ActionParams,
        now: f64,
        delay_seconds: f64,
        owner: Option<u64>,
    ) -> ActionId {
        let id = self.next_id;
        self.next_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.insert(
            id,
            ScheduledAction {
                id,
                tag: tag.into(),
                params,
                execute_time: now + delay_seconds,
                owner,
                sequence,
            },
        );
        id
    }

    /// Returns `true` if a pending action was removed; `false` if `id` was
    /// unknown or already fired — cancelling twice returns `false` both
    /// times (§8).
    pub fn cancel_action(&mut self, id: ActionId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Cancels every action owned by a destroyed entity.
    pub fn entity_destroyed(&mut self, entity_id: u64) {
        self.pending.retain(|_, action| action.owner != Some(entity_id));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pops every action due at or before `now`, in `(execute_time, then
    /// insertion order)` — ascending executeTime, ties broken FIFO (§4.5).
    pub fn drain_due(&mut self, now: f64) -> Vec<ScheduledAction> {
        let mut due: Vec<ScheduledAction> = self
            .pending
            .values()
            .filter(|a| now >= a.execute_time)
            .cloned()
            .collect();
        for action in &due {
            self.pending.remove(&action.id);
        }
        due.sort_by(|a, b| {
            a.execute_time
                .partial_cmp(&b.execute_time)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        due
    }
}

/// Runs every due action through `dispatch`, isolating failures so one
/// broken callback never blocks the rest of the tick (§7).
pub fn run_due_actions(
    scheduler: &mut ActionScheduler,
    now: f64,
    mut dispatch: impl FnMut(&ScheduledAction) -> Result<(), String>,
) -> Vec<FailedAction> {
    let mut failures = Vec::new();
    for action in scheduler.drain_due(now) {
        if let Err(reason) = dispatch(&action) {
            failures.push(FailedAction { id: action.id, tag: action.tag.clone(), reason });
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_ascending_time_then_insertion_order() {
        let mut sched = ActionScheduler::new();
        let a = sched.schedule_action("a", ActionParams::default(), 0.0, 5.0, None);
        let b = sched.schedule_action("b", ActionParams::default(), 0.0, 5.0, None);
        let c = sched.schedule_action("c", ActionParams::default(), 0.0, 1.0, None);

        let due = sched.drain_due(5.0);
        let order: Vec<ActionId> = due.iter().map(|a| a.id).collect();
        assert_eq!(order, vec![c, a, b]);
    }

    #[test]
    fn cancel_is_idempotent_and_reports_false_on_repeat() {
        let mut sched = ActionScheduler::new();
        let id = sched.schedule_action("x", ActionParams::default(), 0.0, 1.0, None);
        assert!(sched.cancel_action(id));
        assert!(!sched.cancel_action(id));
    }

    #[test]
    fn entity_destroyed_cancels_only_owned_actions() {
        let mut sched = ActionScheduler::new();
        let owned = sched.schedule_action("x", ActionParams::default(), 0.0, 1.0, Some(7));
        let other = sched.schedule_action("y", ActionParams::default(), 0.0, 1.0, Some(8));
        sched.entity_destroyed(7);
        assert!(!sched.cancel_action(owned));
        assert!(sched.cancel_action(other));
    }

    #[test]
    fn failing_callback_does_not_block_others() {
        let mut sched = ActionScheduler::new();
        sched.schedule_action("fail", ActionParams::default(), 0.0, 0.0, None);
        sched.schedule_action("ok", ActionParams::default(), 0.0, 0.0, None);

        let mut ran_ok = false;
        let failures = run_due_actions(&mut sched, 1.0, |action| {
            if action.tag == "fail" {
                Err("boom".to_string())
            } else {
                ran_ok = true;
                Ok(())
            }
        });

        assert!(ran_ok);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].tag, "fail");
    }

    #[test]
    fn not_yet_due_actions_stay_pending() {
        let mut sched = ActionScheduler::new();
        sched.schedule_action("later", ActionParams::default(), 0.0, 10.0, None);
        assert!(sched.drain_due(5.0).is_empty());
        assert_eq!(sched.pending_count(), 1);
    }
}
