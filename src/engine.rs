//! Per-frame orchestration of solver and audio output.
//!
//! The engine owns the solver, holds a shared handle to the output ring and
//! runs the three-step tick: advance the simulation by the scaled frame
//! time, drain the listener trace, submit it to the ring. When a frame ran
//! over its time budget, the next simulation update is skipped once; audio
//! submission still happens so the ring keeps its cadence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::audio::output::AudioOutputRing;
use crate::simulation::solver::{SolverStats, WaveSolver};

/// Slowest supported time scale (1000x slower than real time).
pub const MIN_TIME_SCALE: f32 = 0.001;

/// Simulation driver for a host render/update loop.
pub struct SimulationEngine {
    solver: WaveSolver,
    ring: Arc<AudioOutputRing>,
    time_scale: f32,
    frame_budget: Duration,
    over_budget: bool,
}

impl SimulationEngine {
    /// Create an engine around a solver and a shared output ring.
    pub fn new(solver: WaveSolver, ring: Arc<AudioOutputRing>) -> Self {
        Self {
            solver,
            ring,
            time_scale: 1.0,
            // Leave headroom below a 60 FPS frame for rendering and input.
            frame_budget: Duration::from_millis(12),
            over_budget: false,
        }
    }

    /// Run one tick: update, drain, submit.
    ///
    /// `dt_frame` is the wall-clock frame duration in seconds; the solver
    /// advances by `dt_frame * time_scale`.
    pub fn tick(&mut self, dt_frame: f32) {
        if self.over_budget {
            // Skip one simulation update to catch up; the ring interpolates
            // over the missing frame so audio stays continuous.
            debug!("skipping simulation update after over-budget frame");
            self.over_budget = false;
            self.ring.submit_samples(&[], self.time_scale);
            return;
        }

        let started = Instant::now();
        self.solver.update(dt_frame * self.time_scale);
        let samples = self.solver.drain_listener();
        self.ring.submit_samples(&samples, self.time_scale);
        self.over_budget = started.elapsed() > self.frame_budget;
    }

    /// Simulation speed relative to real time, clamped to `[0.001, 1]`.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.clamp(MIN_TIME_SCALE, 1.0);
    }

    /// Current time scale.
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Per-frame simulation budget used for the skip heuristic.
    pub fn set_frame_budget(&mut self, budget: Duration) {
        self.frame_budget = budget;
    }

    /// The solver, for queries and interaction.
    pub fn solver(&self) -> &WaveSolver {
        &self.solver
    }

    /// Mutable solver access (impulses, obstacles, sources, listener).
    pub fn solver_mut(&mut self) -> &mut WaveSolver {
        &mut self.solver
    }

    /// The output ring this engine feeds.
    pub fn ring(&self) -> &Arc<AudioOutputRing> {
        &self.ring
    }

    /// Current solver statistics.
    pub fn stats(&self) -> SolverStats {
        self.solver.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(width: usize, height: usize) -> SimulationEngine {
        let solver = WaveSolver::new(width, height);
        let ring = Arc::new(AudioOutputRing::new(48_000));
        SimulationEngine::new(solver, ring)
    }

    #[test]
    fn test_tick_feeds_ring() {
        let mut engine = engine(64, 48);
        engine.solver_mut().set_listener_enabled(true);
        engine.solver_mut().add_impulse(32, 24, 10.0, 2).unwrap();
        engine.set_time_scale(0.01);

        engine.tick(1.0 / 60.0);
        // One frame's worth of audio entered the ring.
        assert_eq!(engine.ring().available(), engine.ring().samples_per_frame());
        // The listener buffer was drained into the ring.
        assert!(engine.solver_mut().drain_listener().is_empty());
    }

    #[test]
    fn test_time_scale_clamps() {
        let mut engine = engine(16, 16);
        engine.set_time_scale(5.0);
        assert_eq!(engine.time_scale(), 1.0);
        engine.set_time_scale(0.0);
        assert_eq!(engine.time_scale(), MIN_TIME_SCALE);
    }

    #[test]
    fn test_over_budget_frame_skips_once() {
        let mut engine = engine(64, 48);
        engine.set_time_scale(0.01);
        // Force the skip path.
        engine.set_frame_budget(Duration::ZERO);
        engine.tick(1.0 / 60.0);
        let substeps_first = engine.solver().substeps_last_frame();
        assert!(substeps_first > 0);

        // Second tick skips the solver but still submits to the ring.
        engine.tick(1.0 / 60.0);
        assert_eq!(
            engine.ring().available(),
            2 * engine.ring().samples_per_frame()
        );
    }
}
