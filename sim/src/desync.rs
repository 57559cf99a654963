//! Desync Detector (C16).
//!
//! Grounded on the teacher's `godot_bridge.rs` determinism test, which
//! already hashes and compares a flat buffer across runs — generalized here
//! into a standalone per-tick hook over every entity's public components.

use std::hash::{Hash, Hasher};

use crate::components::{round6, ActionStatus, AiState, Health, Team, Transform, Velocity};

/// One entity's contribution to the canonical hash, in the exact field
/// order the hash folds over. Kept as a struct (rather than hashing ad hoc)
/// so the traversal order is obvious and reviewable.
#[derive(Debug, Clone, Copy)]
pub struct DesyncEntry {
    pub entity_id: u64,
    pub transform: Transform,
    pub velocity: Velocity,
    pub health: Health,
    pub team: Team,
    pub ai_state: AiState,
}

fn hash_f32(hasher: &mut impl Hasher, v: f32) {
    round6(v).to_bits().hash(hasher);
}

/// Folds one entity's public state into `hasher`, in a fixed field order.
fn fold_entry(hasher: &mut impl Hasher, entry: &DesyncEntry) {
    entry.entity_id.hash(hasher);
    hash_f32(hasher, entry.transform.x);
    hash_f32(hasher, entry.transform.y);
    hash_f32(hasher, entry.transform.z);
    hash_f32(hasher, entry.transform.rotation_y);
    hash_f32(hasher, entry.velocity.vx);
    hash_f32(hasher, entry.velocity.vy);
    hash_f32(hasher, entry.velocity.vz);
    entry.health.current.to_bits().hash(hasher);
    entry.team.index().hash(hasher);
    entry.ai_state.current_action_collection.hash(hasher);
    entry.ai_state.current_action.hash(hasher);
    status_tag(entry.ai_state.status).hash(hasher);
}

fn status_tag(status: ActionStatus) -> u8 {
    match status {
        ActionStatus::Running => 0,
        ActionStatus::Success => 1,
        ActionStatus::Failure => 2,
    }
}

/// Canonical per-tick hash over every entity, ascending by id — callers
/// must pass `entries` already sorted (the entity store guarantees this).
pub fn canonical_state_hash(entries: &[DesyncEntry]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for entry in entries {
        fold_entry(&mut hasher, entry);
    }
    hasher.finish()
}

/// Tracks the last hash exchanged with the peer and reports the first tick
/// (and entity, if narrowed down) where the two diverge.
#[derive(Debug, Default)]
pub struct DesyncDetector {
    pub enabled: bool,
    last_local_hash: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesyncReport {
    pub tick: u64,
    pub local_hash: u64,
    pub peer_hash: u64,
}

impl DesyncDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_local(&mut self, hash: u64) {
        self.last_local_hash = Some(hash);
    }

    pub fn last_local_hash(&self) -> Option<u64> {
        self.last_local_hash
    }

    /// Compares the most recently recorded local hash against `peer_hash`;
    /// `None` means no mismatch (or detection is disabled).
    pub fn check_against_peer(&self, tick: u64, peer_hash: u64) -> Option<DesyncReport> {
        if !self.enabled {
            return None;
        }
        match self.last_local_hash {
            Some(local) if local != peer_hash => Some(DesyncReport { tick, local_hash: local, peer_hash }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(id: u64, x: f32) -> DesyncEntry {
        DesyncEntry {
            entity_id: id,
            transform: Transform::new(x, 0.0, 0.0),
            velocity: Velocity::new(5.0),
            health: Health::new(100.0),
            team: Team::Left,
            ai_state: AiState::default(),
        }
    }

    #[test]
    fn identical_entries_hash_identically() {
        let a = vec![sample_entry(1, 1.0), sample_entry(2, 2.0)];
        let b = vec![sample_entry(1, 1.0), sample_entry(2, 2.0)];
        assert_eq!(canonical_state_hash(&a), canonical_state_hash(&b));
    }

    #[test]
    fn differing_position_changes_hash() {
        let a = vec![sample_entry(1, 1.0)];
        let b = vec![sample_entry(1, 1.000001)];
        // sub-rounding-precision differences must NOT change the hash.
        assert_eq!(canonical_state_hash(&a), canonical_state_hash(&b));
        let c = vec![sample_entry(1, 2.0)];
        assert_ne!(canonical_state_hash(&a), canonical_state_hash(&c));
    }

    #[test]
    fn disabled_detector_never_reports() {
        let mut detector = DesyncDetector::new();
        detector.record_local(123);
        assert!(detector.check_against_peer(1, 456).is_none());
    }

    #[test]
    fn mismatched_hash_is_reported_once_enabled() {
        let mut detector = DesyncDetector::new();
        detector.enabled = true;
        detector.record_local(123);
        let report = detector.check_against_peer(5, 456).unwrap();
        assert_eq!(report.tick, 5);
        assert_eq!(report.local_hash, 123);
        assert_eq!(report.peer_hash, 456);
    }
}
