use std::path::Path;

use rand::rngs::StdRng;

use crate::{
    algo::{Agent, Training},
    env::{Action, GridWorld, Pos},
    error::{ConfigError, TableError},
};

use super::make_rng;

/// A baseline agent that ignores the state and picks uniformly random actions
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: make_rng(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn name(&self) -> &'static str {
        "RandomAgent"
    }

    /// Nothing to learn; reports a zero error for every episode on any grid
    fn train(&mut self, _env: &mut GridWorld, episodes: u32) -> Result<Training, ConfigError> {
        log::info!("Random agent: nothing to train");
        Ok(Training {
            policy: None,
            errors: vec![0.0; episodes as usize],
        })
    }

    fn choose_action(&mut self, _state: Pos) -> Action {
        Action::random(&mut self.rng)
    }

    fn save_tables(&self, _dir: &Path) -> Result<(), TableError> {
        log::debug!("Random agent has no tables to save");
        Ok(())
    }

    fn load_tables(&mut self, _dir: &Path) -> Result<(), TableError> {
        log::debug!("Random agent has no tables to load");
        Ok(())
    }
}
