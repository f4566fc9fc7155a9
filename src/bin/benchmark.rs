//! Headless throughput benchmark for the wave solver.
//!
//! Run with: cargo run --bin benchmark --release

use std::time::Instant;

use tracing_subscriber::EnvFilter;

use soundfield::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("soundfield solver benchmark");
    println!();

    // ------------------------------------------------------------------
    // Part 1: sub-step throughput across grid sizes
    // ------------------------------------------------------------------
    println!("{:<12} {:>10} {:>12} {:>12} {:>16}", "Grid", "Cells", "Steps", "Total (ms)", "Cell-steps/sec");
    println!("{}", "-".repeat(66));

    // Short frames keep the per-size run around a thousand sub-steps.
    let frame = 1.0 / 60.0 * 0.02;
    for &(width, height) in &[(100usize, 50usize), (200, 100), (400, 200), (581, 291)] {
        let mut solver = WaveSolver::new(width, height);
        solver.add_impulse(width as i32 / 2, height as i32 / 2, 10.0, 2).unwrap();
        solver.set_listener((width * 3 / 4) as i32, (height / 2) as i32);
        solver.set_listener_enabled(true);

        let frames = 50;
        let start = Instant::now();
        let mut steps = 0usize;
        for _ in 0..frames {
            solver.update(frame);
            steps += solver.substeps_last_frame();
            solver.drain_listener();
        }
        let elapsed = start.elapsed();

        let cell_steps = (width * height * steps) as f64 / elapsed.as_secs_f64();
        println!(
            "{:<12} {:>10} {:>12} {:>12.1} {:>16.0}",
            format!("{}x{}", width, height),
            width * height,
            steps,
            elapsed.as_secs_f64() * 1000.0,
            cell_steps
        );
    }
    println!();

    // ------------------------------------------------------------------
    // Part 2: full engine tick at a playable time scale
    // ------------------------------------------------------------------
    let mut solver = WaveSolver::new(581, 291);
    solver.set_listener(400, 145);
    solver.set_listener_enabled(true);
    let kick = SamplePresets::kick(DEFAULT_SAMPLE_RATE).into_shared();
    let id = solver.add_source(AudioSource::new(kick, 150, 145, 0.0, true));

    let ring = std::sync::Arc::new(AudioOutputRing::new(48_000));
    let mut engine = SimulationEngine::new(solver, ring.clone());
    engine.set_time_scale(0.05);
    engine
        .solver_mut()
        .source_mut(id)
        .expect("source registered above")
        .play();

    let frames = 120;
    let start = Instant::now();
    for _ in 0..frames {
        engine.tick(1.0 / 60.0);
    }
    let elapsed = start.elapsed();
    let stats = engine.stats();

    println!("Engine: {} frames on {}x{} in {:.1} ms ({:.1} FPS equivalent)",
        frames,
        stats.width,
        stats.height,
        elapsed.as_secs_f64() * 1000.0,
        frames as f64 / elapsed.as_secs_f64()
    );
    println!(
        "  substeps/frame: {}  max |p|: {:.3} Pa  ring samples queued: {}",
        stats.substeps_last_frame,
        stats.max_pressure,
        ring.available()
    );
}
