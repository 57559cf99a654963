//! Animation (C11) — pure reader, never writes simulation state.
//!
//! Two presentation styles share one state machine: clip-based (3D
//! vertex-animation-texture units) and sprite-based (8-direction billboards).
//! Grounded on the teacher's read-mostly system style (`cover.rs`'s
//! `cover_detection_system`: reads combat/position state, writes exactly one
//! derived component) — the teacher has no animation layer of its own.

use crate::components::{round6, ActionStatus};

pub const STATE_CHANGE_COOLDOWN: f32 = 0.1;
/// Single-play clips must reach this fraction of their duration before an
/// interrupt is honored (§4.10).
pub const SINGLE_PLAY_MIN_FRACTION: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    Idle,
    Move,
    Attack,
    Cast,
    Death,
}

impl ClipKind {
    pub fn is_single_play(&self) -> bool {
        matches!(self, ClipKind::Attack | ClipKind::Cast | ClipKind::Death)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClipState {
    pub current_clip: ClipKind,
    pub animation_time: f32,
    pub min_animation_time: f32,
    pub pending_clip: Option<ClipKind>,
    pub is_celebrating: bool,
    pub time_since_state_change: f32,
}

impl Default for ClipState {
    fn default() -> Self {
        Self {
            current_clip: ClipKind::Idle,
            animation_time: 0.0,
            min_animation_time: 0.0,
            pending_clip: None,
            is_celebrating: false,
            time_since_state_change: STATE_CHANGE_COOLDOWN,
        }
    }
}

/// Derives the clip the entity *wants* to play from velocity/combat/AI
/// state. Death always wins; otherwise attack/cast beats movement beats idle.
pub fn desired_clip(is_dead: bool, ai_status: ActionStatus, is_casting: bool, is_attacking: bool, speed: f32) -> ClipKind {
    if is_dead {
        ClipKind::Death
    } else if is_casting {
        ClipKind::Cast
    } else if is_attacking {
        ClipKind::Attack
    } else if speed > 0.1 {
        ClipKind::Move
    } else {
        let _ = ai_status;
        ClipKind::Idle
    }
}

/// Advances the clip-state machine by `dt`. A single-play clip (attack,
/// cast, death) must reach `SINGLE_PLAY_MIN_FRACTION` of `clip_duration`
/// before it can be interrupted by a different desired clip; death never
/// reverts once entered. State changes are also throttled by
/// `STATE_CHANGE_COOLDOWN`.
pub fn advance_clip(state: &mut ClipState, desired: ClipKind, clip_duration: f32, dt: f32) {
    state.animation_time += dt;
    state.time_since_state_change += dt;

    if state.current_clip == ClipKind::Death {
        return;
    }

    if desired == state.current_clip {
        state.pending_clip = None;
        return;
    }

    if state.current_clip.is_single_play() {
        let min_time = clip_duration * SINGLE_PLAY_MIN_FRACTION;
        if state.animation_time < min_time {
            state.pending_clip = Some(desired);
            return;
        }
    }

    if state.time_since_state_change < STATE_CHANGE_COOLDOWN {
        state.pending_clip = Some(desired);
        return;
    }

    state.current_clip = desired;
    state.animation_time = 0.0;
    state.time_since_state_change = 0.0;
    state.pending_clip = None;
}

// ============================================================================
// SPRITE BILLBOARD (8-direction)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraProjection {
    Perspective,
    Orthographic,
}

/// 8-direction sprite index from entity rotation relative to the camera.
/// Perspective snaps the camera angle to the nearest 45 degrees first;
/// orthographic uses the camera's forward vector directly (§4.10).
pub fn sprite_direction_index(entity_rotation_y: f32, camera_angle: f32, projection: CameraProjection) -> u8 {
    let camera = match projection {
        CameraProjection::Perspective => {
            let step = std::f32::consts::FRAC_PI_4;
            (camera_angle / step).round() * step
        }
        CameraProjection::Orthographic => camera_angle,
    };
    let relative = round6(entity_rotation_y - camera);
    let turns = std::f32::consts::TAU;
    let normalized = ((relative % turns) + turns) % turns;
    ((normalized / turns) * 8.0).round() as u8 % 8
}

/// Fallback table: a clip name resolves through a chain of synonyms until
/// one is found in the available set, finally collapsing to idle.
pub fn resolve_clip_name<'a>(requested: &str, available: &[&'a str]) -> &'a str {
    const FALLBACKS: &[&[&str]] = &[
        &["attack", "combat", "fight", "swing", "strike"],
        &["idle", "stand", "default"],
    ];
    for chain in FALLBACKS {
        if chain.contains(&requested) {
            for candidate in *chain {
                if let Some(found) = available.iter().find(|a| *a == candidate) {
                    return found;
                }
            }
        }
    }
    available.iter().find(|a| **a == "idle").copied().unwrap_or("idle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_play_clip_resists_interrupt_before_ninety_percent() {
        let mut state = ClipState { current_clip: ClipKind::Attack, animation_time: 0.0, time_since_state_change: 1.0, ..Default::default() };
        advance_clip(&mut state, ClipKind::Move, 1.0, 0.5);
        assert_eq!(state.current_clip, ClipKind::Attack);
        assert_eq!(state.pending_clip, Some(ClipKind::Move));
    }

    #[test]
    fn single_play_clip_interrupts_after_ninety_percent() {
        let mut state = ClipState { current_clip: ClipKind::Attack, animation_time: 0.0, time_since_state_change: 1.0, ..Default::default() };
        advance_clip(&mut state, ClipKind::Move, 1.0, 0.95);
        assert_eq!(state.current_clip, ClipKind::Move);
    }

    #[test]
    fn death_never_reverts() {
        let mut state = ClipState { current_clip: ClipKind::Death, animation_time: 0.0, time_since_state_change: 1.0, ..Default::default() };
        advance_clip(&mut state, ClipKind::Idle, 1.0, 10.0);
        assert_eq!(state.current_clip, ClipKind::Death);
    }

    #[test]
    fn state_change_cooldown_throttles_rapid_switches() {
        let mut state = ClipState { current_clip: ClipKind::Idle, time_since_state_change: 0.01, ..Default::default() };
        advance_clip(&mut state, ClipKind::Move, 1.0, 0.01);
        assert_eq!(state.current_clip, ClipKind::Idle);
    }

    #[test]
    fn clip_fallback_chain_resolves_to_known_synonym() {
        let available = ["idle", "swing"];
        assert_eq!(resolve_clip_name("attack", &available), "swing");
    }

    #[test]
    fn clip_fallback_defaults_to_idle_when_nothing_matches() {
        let available = ["idle"];
        assert_eq!(resolve_clip_name("attack", &available), "idle");
    }
}
