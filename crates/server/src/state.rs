//! Shared application state

use orchestrator::SimulationRunner;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Active simulations keyed by id
pub type Simulations = HashMap<String, SimulationRunner>;

/// Shared application state
pub struct AppState {
    /// Active simulations (ID -> Runner)
    pub simulations: Mutex<Simulations>,
    /// Path to configs directory
    pub configs_dir: PathBuf,
    /// Server port
    pub port: u16,
}

impl AppState {
    /// Create new application state
    pub fn new(configs_dir: PathBuf, port: u16) -> Self {
        Self {
            simulations: Mutex::new(HashMap::new()),
            configs_dir,
            port,
        }
    }

    /// Lock the simulation table. A panic while the lock was held does not
    /// invalidate the runners, so poisoning is ignored.
    pub fn simulations(&self) -> MutexGuard<'_, Simulations> {
        self.simulations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the named configuration, with path separators and `..` stripped
    pub fn config_path(&self, name: &str) -> PathBuf {
        let safe_name = name.replace("..", "").replace(['/', '\\'], "");
        self.configs_dir.join(format!("{}.json", safe_name))
    }
}
