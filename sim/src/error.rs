//! Error taxonomy for the simulation core.
//!
//! Validation and protocol failures are represented here and returned to
//! callers; they never unwind across an entity's per-tick update (see
//! `behavior::BehaviorExecutor::tick` and `protocol::ProtocolCoordinator`).
//! Transient results (no path yet, missing transform this tick) are not
//! errors — they surface as `Option::None` and the caller retries next tick.

use thiserror::Error;

/// Validation error returned to the sender of a rejected command.
/// Never mutates state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("insufficient gold: need {needed}, have {have}")]
    InsufficientGold { needed: f32, have: f32 },
    #[error("invalid placement: {reason}")]
    InvalidPlacement { reason: String },
    #[error("wrong phase: expected {expected}, got {actual}")]
    WrongPhase { expected: String, actual: String },
    #[error("unknown unit type {collection}:{type_index}")]
    UnknownUnitType { collection: u32, type_index: u32 },
    #[error("placement {0} not found")]
    PlacementNotFound(i64),
    #[error("building {0} is not owned by the requesting player")]
    NotYourBuilding(u64),
    #[error("building {0} is not under construction")]
    NotUnderConstruction(u64),
}

/// Protocol-level error: unknown room/player, or a message from a peer the
/// server no longer considers connected. The server drops these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("unknown room {0}")]
    UnknownRoom(String),
    #[error("unknown player {0}")]
    UnknownPlayer(u32),
    #[error("message from disconnected peer {0}")]
    DisconnectedPeer(u32),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Save/restore failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SaveError {
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u32),
    #[error("corrupt save data: {0}")]
    Corrupt(String),
}

/// Internal invariant violations: logged and the offending unit of work
/// (one action callback, one entity's tick) is skipped, never the whole tick.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvariantError {
    #[error("unknown component {0}")]
    UnknownComponent(String),
    #[error("duplicate placementId {0}")]
    DuplicatePlacementId(i64),
    #[error("action callback {tag} panicked or returned an error: {detail}")]
    ActionCallbackFailed { tag: String, detail: String },
}

pub type Result<T, E = ValidationError> = std::result::Result<T, E>;
