//! Ship update timings without criterion.
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

fn hull_world(columns: usize, rows: usize, params: &SimulationParameters) -> World {
    let mut world = World::new(params);
    let iron = world.materials().structural_id("Iron").unwrap_or_default();
    let hull = RectangularGrid::new(Vector::new(-(columns as f32), -2.0), columns, rows, 2.0, iron);
    world
        .add_ship(hull.into_builder(), params)
        .expect("benchmark hull is valid");
    world
}

fn main() {
    println!("\n=== Spring Relaxation Benchmarks ===\n");

    println!("--- Hull size ---");
    for &(columns, rows) in &[(20, 5), (50, 10), (100, 20), (200, 20)] {
        let params = SimulationParameters::default();
        let mut world = hull_world(columns, rows, &params);
        let springs = world.ships().map(|ship| ship.springs().len()).sum::<usize>();

        time_it(
            &format!("world update ({}x{}, {} springs)", columns, rows, springs),
            50,
            || world.update(&params),
        );
    }

    println!("\n--- Iterations ---");
    for &iterations in &[10, 30, 60] {
        let params = SimulationParameters::default().with_iterations(iterations);
        let mut world = hull_world(100, 20, &params);

        time_it(&format!("world update (N={})", iterations), 50, || {
            world.update(&params)
        });
    }

    println!("\n--- Parallelism ---");
    for &partitions in &[1, 2, 4, 8] {
        let params = SimulationParameters::default().with_parallelism(partitions);
        let mut world = hull_world(200, 20, &params);

        time_it(&format!("world update ({} partitions)", partitions), 50, || {
            world.update(&params)
        });
    }

    println!("\n=== Benchmarks Complete ===\n");
}
