//! NPC update timings without criterion.
use std::time::Instant;

use shipsim2d::math::Vector;
use shipsim2d::ship::RectangularGrid;
use shipsim2d::{SimulationParameters, World};

fn time_it<F: FnMut()>(name: &str, iterations: usize, mut f: F) {
    // Warmup
    for _ in 0..5 {
        f();
    }

    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    let elapsed = start.elapsed();

    let avg_ms = elapsed.as_secs_f64() * 1000.0 / iterations as f64;
    println!("{}: {:.3}ms avg ({} iterations)", name, avg_ms, iterations);
}

/// A pinned two-deck hull crowded with `count` humans.
fn crowded_world(count: usize, params: &SimulationParameters) -> World {
    let mut world = World::new(params);
    let iron = world.materials().structural_id("Iron").unwrap_or_default();
    let hull = RectangularGrid::new(Vector::new(-100.0, 0.0), 100, 4, 2.0, iron)
        .with_deck(0)
        .with_deck(2);
    let mut builder = hull.into_builder();
    for point in 0..builder.point_count() {
        builder.pin(point);
    }
    world.add_ship(builder, params).expect("benchmark hull is valid");

    let sailor = world
        .npcs()
        .database()
        .human_id("Sailor")
        .expect("built-in sub kind");
    for ordinal in 0..count {
        let x = -95.0 + (ordinal % 95) as f32 * 2.0;
        let y = if ordinal % 2 == 0 { 0.05 } else { 4.05 };
        let placement = world
            .begin_place_new_human_npc(sailor, Vector::new(x, y), false, params)
            .expect("placement");
        if let Some(picked) = placement.picked() {
            world.complete_new_npc(picked.id, params).expect("completion");
        }
    }
    world
}

fn main() {
    println!("\n=== NPC Benchmarks ===\n");

    println!("--- Humans ---");
    for &count in &[10, 50, 100, 190] {
        let params = SimulationParameters::default().with_max_npcs(count);
        let mut world = crowded_world(count, &params);

        time_it(
            &format!("world update ({} humans)", world.npcs().npc_count()),
            100,
            || world.update(&params),
        );
    }

    println!("\n--- Picking ---");
    let params = SimulationParameters::default().with_max_npcs(190);
    let world = crowded_world(190, &params);
    time_it("probe_npc_at (190 humans)", 1000, || {
        std::hint::black_box(world.probe_npc_at(Vector::new(3.0, 1.0), 0.5, &params));
    });

    println!("\n=== Benchmarks Complete ===\n");
}
