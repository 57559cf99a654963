//! Tactics Core - GDExtension bindings
//!
//! Exposes the Rust simulation core to Godot 4 via GDExtension.

use godot::prelude::*;

mod sim_bridge;

/// GDExtension entry point.
struct TacticsExtension;

#[gdextension]
unsafe impl ExtensionLibrary for TacticsExtension {}
