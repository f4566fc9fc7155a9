//! End-to-end scenarios: whole frames through the public API.
//!
//! Grid sizes and frame counts are chosen so each scenario runs in seconds
//! in debug builds while still exercising the property at full sub-step
//! resolution (a 1/60 s frame at the default scale is ~1.1k sub-steps).

use std::sync::Arc;

use soundfield::audio::AudioOutputRing;
use soundfield::engine::SimulationEngine;
use soundfield::simulation::{DampingPreset, PresetKind, WaveSolver};

const FRAME_60: f32 = 1.0 / 60.0;

fn sum_abs(solver: &WaveSolver) -> f32 {
    solver.pressure_view().iter().map(|p| p.abs()).sum()
}

/// Total squared pressure split into (interior, boundary ring) where the
/// ring is every cell within `ring` cells of a wall.
fn energy_split(solver: &WaveSolver, ring: usize) -> (f32, f32) {
    let (width, height) = (solver.width(), solver.height());
    let pressure = solver.pressure_view();
    let mut interior = 0.0f32;
    let mut boundary = 0.0f32;
    for y in 0..height {
        for x in 0..width {
            let e = pressure[y * width + x].powi(2);
            let near_wall =
                x < ring || y < ring || x >= width - ring || y >= height - ring;
            if near_wall {
                boundary += e;
            } else {
                interior += e;
            }
        }
    }
    (interior, boundary)
}

#[test]
fn silence_produces_empty_samples() {
    let mut solver = WaveSolver::new(100, 50);
    solver.set_listener(50, 25);
    solver.set_listener_enabled(true);

    solver.update(FRAME_60);

    let (expected_substeps, _) = solver.params().substeps_for(FRAME_60);
    let samples = solver.drain_listener();
    assert_eq!(samples.len(), expected_substeps);
    assert!(samples.iter().all(|&s| s == 0.0));
    assert_eq!(sum_abs(&solver), 0.0);
}

#[test]
fn center_impulse_propagates_locally() {
    let mut solver = WaveSolver::new(200, 100);
    solver.add_impulse(100, 50, 10.0, 2).unwrap();
    assert!(solver.pressure_at(100, 50).unwrap() > 0.0);

    // A short frame (~14 sub-steps): the wavefront cannot cover the 40
    // cells to the probe, which must remain exactly zero.
    solver.update(2e-4);

    assert_eq!(solver.pressure_at(140, 50), Some(0.0));
    let total = sum_abs(&solver);
    assert!(total.is_finite() && total > 0.0);
    assert!(solver.pressure_view().iter().all(|p| p.is_finite()));
}

#[test]
fn constructive_superposition_doubles_pressure() {
    let mut solver = WaveSolver::new(200, 100);
    solver.add_impulse(100, 50, 10.0, 2).unwrap();
    let single = solver.pressure_at(100, 50).unwrap();

    solver.add_impulse(100, 50, 10.0, 2).unwrap();
    let double = solver.pressure_at(100, 50).unwrap();

    assert!(
        (double - 2.0 * single).abs() <= 2.0 * single * 0.01,
        "expected ~2x: single {single}, double {double}"
    );
}

#[test]
fn destructive_superposition_cancels() {
    let mut solver = WaveSolver::new(200, 100);
    solver.add_impulse(100, 50, 10.0, 2).unwrap();
    solver.add_impulse(100, 50, -10.0, 2).unwrap();
    assert!(solver.pressure_at(100, 50).unwrap().abs() < 0.1);
}

#[test]
fn anechoic_walls_swallow_the_wavefront() {
    let mut solver = WaveSolver::new(100, 50);
    solver.apply_preset(&DampingPreset::from_kind(PresetKind::Anechoic));
    solver.add_impulse(50, 25, 100.0, 2).unwrap();

    solver.update(FRAME_60);
    let (interior_after_first, _) = energy_split(&solver, 3);
    assert!(interior_after_first > 0.0);

    for _ in 0..4 {
        solver.update(FRAME_60);
    }
    let (_, boundary_ring) = energy_split(&solver, 3);
    assert!(
        boundary_ring <= 0.05 * interior_after_first,
        "boundary ring holds {boundary_ring}, first-frame interior was {interior_after_first}"
    );
}

#[test]
fn reflective_walls_retain_energy_anechoic_walls_do_not() {
    // Unit damping isolates wall behaviour from air absorption.
    let run = |wall_reflection: f32| {
        let mut solver = WaveSolver::new(100, 50);
        let preset = DampingPreset::custom(1.0, wall_reflection, "walls").unwrap();
        solver.apply_preset(&preset);
        solver.add_impulse(50, 25, 100.0, 2).unwrap();
        let initial = solver.total_energy();
        solver.update(1.0 / 120.0);
        solver.update(1.0 / 120.0);
        (initial, solver.total_energy())
    };

    let (initial, absorbing_left) = run(0.0);
    let (_, reflective_left) = run(0.98);

    assert!(
        absorbing_left <= 0.05 * initial,
        "absorbing walls kept {absorbing_left} of {initial}"
    );
    assert!(
        reflective_left > 10.0 * absorbing_left,
        "reflective {reflective_left} should dwarf absorbing {absorbing_left}"
    );
}

#[test]
fn obstacle_casts_an_audible_shadow() {
    let peak_at_listener = |with_obstacle: bool| {
        let mut solver = WaveSolver::new(100, 60);
        solver.apply_preset(&DampingPreset::from_kind(PresetKind::Anechoic));
        if with_obstacle {
            solver.add_obstacle_disk(60, 30, 10);
        }
        solver.set_listener(80, 30);
        solver.set_listener_enabled(true);
        solver.add_impulse(25, 30, 50.0, 2).unwrap();

        let mut peak = 0.0f32;
        for _ in 0..2 {
            solver.update(1.0 / 240.0);
            for s in solver.drain_listener() {
                peak = peak.max(s.abs());
            }
        }
        peak
    };

    let clear = peak_at_listener(false);
    let shadowed = peak_at_listener(true);

    assert!(clear > 0.0, "wave must reach the unobstructed listener");
    assert!(
        shadowed < 0.8 * clear,
        "shadowed peak {shadowed} should be well below clear peak {clear}"
    );
}

#[test]
fn engine_keeps_ring_in_steady_state() {
    let solver = WaveSolver::new(100, 50);
    let ring = Arc::new(AudioOutputRing::new(48_000));
    let mut engine = SimulationEngine::new(solver, ring.clone());
    engine.set_time_scale(0.01);
    engine.solver_mut().set_listener_enabled(true);
    engine.solver_mut().add_impulse(50, 25, 10.0, 2).unwrap();

    // One simulated second: exactly the device rate enters the ring.
    for _ in 0..60 {
        engine.tick(FRAME_60);
    }
    assert_eq!(ring.available(), 48_000);

    // A device callback drains without blocking or allocation surprises.
    let mut out = vec![0.0f32; 1024];
    ring.fill(&mut out);
    assert_eq!(ring.available(), 48_000 - 1024);
    assert!(out.iter().all(|s| s.is_finite()));
}

#[test]
fn obstacle_edit_roundtrip_leaves_clean_mask() {
    let mut solver = WaveSolver::new(100, 50);
    solver.add_obstacle_disk(40, 25, 6);
    assert!(solver.is_obstacle(40, 25));
    solver.remove_obstacle_disk(40, 25, 6);
    assert!(solver.obstacle_view().iter().all(|&c| c == 0));
}
