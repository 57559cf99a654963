//! Basic demonstration of the tactics simulation core.
//!
//! Run with: cargo run --example basic_demo

use tactics_core::protocol::SubmitPlacementRequest;
use tactics_core::squad::UnitSpec;
use tactics_core::{SimWorld, Team, UnitType};

fn rifle_specs(count: usize) -> Vec<UnitSpec> {
    vec![
        UnitSpec {
            unit_type: UnitType::default(),
            max_health: 100.0,
            damage: 12.0,
            range: 40.0,
            attack_cooldown: 0.8,
            max_speed: 4.5,
            radius: 0.5,
        };
        count
    ]
}

fn main() {
    println!("=== Tactics Core - Simulation Demo ===\n");

    let mut sim = SimWorld::new();
    sim.coordinator.players.register(1, Team::Left, 200.0);
    sim.coordinator.players.register(2, Team::Right, 200.0);
    sim.coordinator.start_placement_phase();

    println!("--- Placing squads ---\n");
    let left = sim.coordinator.submit_placement(
        &SubmitPlacementRequest {
            player_id: 1,
            team: Team::Left,
            grid_position: (20, 20),
            cells: vec![(20, 20)],
            cost: 60.0,
            round_placed: 1,
            is_building: false,
        },
        &rifle_specs(6),
    );
    println!("Left squad placed: {:?}", left.squad_units);

    let right = sim.coordinator.submit_placement(
        &SubmitPlacementRequest {
            player_id: 2,
            team: Team::Right,
            grid_position: (180, 20),
            cells: vec![(180, 20)],
            cost: 60.0,
            round_placed: 1,
            is_building: false,
        },
        &rifle_specs(6),
    );
    println!("Right squad placed: {:?}\n", right.squad_units);

    let snapshot_json = sim.snapshot_json();
    sim.coordinator.mark_ready(1, 2, || serde_json::Value::Null);
    sim.coordinator.mark_ready(2, 2, || serde_json::from_str(&snapshot_json).unwrap());

    println!("--- Running battle for 200 ticks (10s at 20 ticks/sec) ---\n");
    for tick in 0..200 {
        sim.step(0.05);
        if (tick + 1) % 20 == 0 {
            println!("--- Tick {} (t={:.1}s) ---", sim.tick(), sim.current_time());
            print_snapshot(&mut sim);
        }
    }

    println!("\n--- Spawning artillery crater at (100, 100) ---\n");
    sim.apply_crater(100.0, 100.0, 10.0, 2.0);

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot_json());
}

fn print_snapshot(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();
    println!("  Left:");
    for unit in snapshot.units.iter().filter(|u| u.team == Team::Left) {
        println!(
            "    unit {}: pos=({:.1}, {:.1}) hp={:.0}/{:.0}",
            unit.id, unit.x, unit.z, unit.health, unit.health_max
        );
    }
    println!("  Right:");
    for unit in snapshot.units.iter().filter(|u| u.team == Team::Right) {
        println!(
            "    unit {}: pos=({:.1}, {:.1}) hp={:.0}/{:.0}",
            unit.id, unit.x, unit.z, unit.health, unit.health_max
        );
    }
}
