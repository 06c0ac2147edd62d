//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which owns a [`Simulation`] on
//! a background thread and steps it at the configured fixed timestep. Each
//! step pulls a collider snapshot from the scene collector. Every
//! `snapshot_interval` steps the runner downloads the particles and publishes
//! a [`FrameSnapshot`] for readers on other threads.

use crate::scene::SceneCollector;
use fluid_kernel::{FluidParams, SimError, Simulation, StepReport};
use glam::Vec3;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Runner state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (stopping condition reached or stop requested)
    Finished,
    /// A step failed; see [`SimulationRunner::error_message`]
    Error,
}

/// Stopping conditions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunLimits {
    /// Stop after this many steps
    pub max_steps: Option<u64>,
    /// Stop once simulated time reaches this value (seconds)
    pub max_time: Option<f64>,
}

impl RunLimits {
    fn reached(&self, report: &StepReport) -> bool {
        self.max_steps.is_some_and(|m| report.step >= m)
            || self.max_time.is_some_and(|t| report.sim_time >= t)
    }
}

/// Particle state published between steps
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    /// Steps completed when the snapshot was taken
    pub step: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
    /// Particle positions
    pub positions: Vec<Vec3>,
    /// Particle densities, for diagnostic coloring
    pub densities: Vec<f32>,
}

/// Point-in-time view of the runner's counters
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerStatus {
    /// Current state
    pub state: RunnerState,
    /// Steps completed
    pub step: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
    /// Number of particles
    pub particle_count: usize,
    /// Backend executing the kernels
    pub backend: &'static str,
    /// Non-finite force evaluations zeroed so far
    pub unstable_total: u64,
    /// Colliders discarded for exceeding capacity so far
    pub colliders_dropped_total: u64,
    /// Error message when `state` is `Error`
    pub error_message: Option<String>,
}

/// Shared state between the runner thread and control interface
struct SharedState {
    state: RunnerState,
    sim_time: f64,
    step: u64,
    unstable_total: u64,
    colliders_dropped_total: u64,
    error_message: Option<String>,
    latest: Option<Arc<FrameSnapshot>>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    shared: Arc<Mutex<SharedState>>,
    thread_handle: Option<thread::JoinHandle<()>>,
    params: FluidParams,
    backend: &'static str,
}

impl SimulationRunner {
    /// Move an initialized simulation onto a background thread.
    ///
    /// The thread waits in `Created` until [`start`](Self::start). A
    /// snapshot of the initial particle state is published immediately.
    ///
    /// # Arguments
    /// * `simulation` - Simulation with particles loaded
    /// * `scene` - Collider producer, queried once per step
    /// * `limits` - Stopping conditions
    /// * `snapshot_interval` - Publish particles every this many steps (0 is treated as 1)
    pub fn new(
        mut simulation: Simulation,
        scene: Box<dyn SceneCollector>,
        limits: RunLimits,
        snapshot_interval: u64,
    ) -> Self {
        let params = simulation.params().clone();
        let backend = simulation.backend_name();

        let (state, latest, error_message) = match capture(&mut simulation) {
            Ok(frame) => (RunnerState::Created, Some(Arc::new(frame)), None),
            Err(e) => (RunnerState::Error, None, Some(e.to_string())),
        };

        let shared = Arc::new(Mutex::new(SharedState {
            state,
            sim_time: simulation.sim_time(),
            step: simulation.step_count(),
            unstable_total: 0,
            colliders_dropped_total: 0,
            error_message,
            latest,
        }));

        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::spawn(move || {
            run_simulation_loop(
                simulation,
                scene,
                shared_clone,
                limits,
                snapshot_interval.max(1),
            );
        });

        Self {
            shared,
            thread_handle: Some(thread_handle),
            params,
            backend,
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Get number of completed steps
    pub fn step_count(&self) -> u64 {
        lock(&self.shared).step
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Number of particles in the simulation
    pub fn particle_count(&self) -> usize {
        self.params.particle_count()
    }

    /// Parameters the simulation was built with
    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    /// Name of the backend executing the kernels
    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    /// All counters in one lock
    pub fn status(&self) -> RunnerStatus {
        let guard = lock(&self.shared);
        RunnerStatus {
            state: guard.state,
            step: guard.step,
            sim_time: guard.sim_time,
            particle_count: self.particle_count(),
            backend: self.backend,
            unstable_total: guard.unstable_total,
            colliders_dropped_total: guard.colliders_dropped_total,
            error_message: guard.error_message.clone(),
        }
    }

    /// Most recently published particle snapshot
    pub fn snapshot(&self) -> Option<Arc<FrameSnapshot>> {
        lock(&self.shared).latest.clone()
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Ask the thread to finish after the step in flight
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if matches!(
            state.state,
            RunnerState::Created | RunnerState::Running | RunnerState::Paused
        ) {
            state.state = RunnerState::Finished;
        }
    }

    /// Wait for the simulation thread to complete
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| "Thread panicked".to_string())?;
        }
        Ok(())
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit; it disposes the simulation on the way out
        self.stop();
    }
}

fn capture(simulation: &mut Simulation) -> Result<FrameSnapshot, SimError> {
    let step = simulation.step_count();
    let sim_time = simulation.sim_time();
    let particles = simulation.particles()?;
    Ok(FrameSnapshot {
        step,
        sim_time,
        positions: particles.position.clone(),
        densities: particles.density.clone(),
    })
}

fn fail(shared: &Mutex<SharedState>, step: u64, err: &SimError) {
    tracing::error!("Simulation failed after step {}: {}", step, err);
    let mut guard = lock(shared);
    guard.state = RunnerState::Error;
    guard.error_message = Some(err.to_string());
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    mut simulation: Simulation,
    mut scene: Box<dyn SceneCollector>,
    shared: Arc<Mutex<SharedState>>,
    limits: RunLimits,
    snapshot_interval: u64,
) {
    // Wait for start signal
    loop {
        let state = lock(&shared).state;
        match state {
            RunnerState::Created => thread::sleep(Duration::from_millis(10)),
            RunnerState::Running => break,
            _ => {
                simulation.dispose();
                return;
            }
        }
    }

    let start_wall_time = Instant::now();

    loop {
        let current_state = lock(&shared).state;

        match current_state {
            RunnerState::Running => {
                let colliders = scene.collect(simulation.sim_time());
                let report = match simulation.step(&colliders) {
                    Ok(report) => report,
                    Err(e) => {
                        fail(&shared, simulation.step_count(), &e);
                        break;
                    }
                };

                let finished = limits.reached(&report);
                let frame = if finished || report.step % snapshot_interval == 0 {
                    match capture(&mut simulation) {
                        Ok(frame) => Some(Arc::new(frame)),
                        Err(e) => {
                            fail(&shared, report.step, &e);
                            break;
                        }
                    }
                } else {
                    None
                };

                {
                    let mut guard = lock(&shared);
                    guard.sim_time = report.sim_time;
                    guard.step = report.step;
                    guard.unstable_total += u64::from(report.unstable_particles);
                    guard.colliders_dropped_total += report.colliders_dropped as u64;
                    if frame.is_some() {
                        guard.latest = frame;
                    }
                    if finished && guard.state == RunnerState::Running {
                        guard.state = RunnerState::Finished;
                    }
                }

                if finished {
                    tracing::info!(
                        "Simulation finished: step {}, sim_time = {:.3}s",
                        report.step,
                        report.sim_time
                    );
                    break;
                }

                // Log progress periodically
                if report.step % 100 == 0 {
                    tracing::debug!(
                        "Step {}: sim_time={:.4}s, wall_time={:.2}s",
                        report.step,
                        report.sim_time,
                        start_wall_time.elapsed().as_secs_f64(),
                    );
                }
            }
            RunnerState::Paused => {
                thread::sleep(Duration::from_millis(50));
            }
            RunnerState::Finished | RunnerState::Error | RunnerState::Created => break,
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} steps, {:.4}s simulated",
        simulation.step_count(),
        simulation.sim_time()
    );
    simulation.dispose();
}
