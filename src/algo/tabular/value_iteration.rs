use std::path::Path;

use crate::{
    algo::{Agent, Training},
    ensure_interval,
    env::{Action, DiscreteStateSpace, GridWorld, Pos},
    error::{ConfigError, TableError},
    table::{PolicyTable, ValueTable},
    util::argmax,
};

use super::{action_values, check_grid};

const POLICY_FILE: &str = "policy_vi.json";
const VALUE_FILE: &str = "v_vi.json";

/// Configuration for the [`ValueIterationAgent`]
#[derive(Debug, Clone)]
pub struct ValueIterationAgentConfig {
    /// Discount factor, in `[0, 1]`
    pub gamma: f64,
    /// Sweeps stop once no value changes by more than this
    pub theta: f64,
}

impl Default for ValueIterationAgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            theta: 1e-6,
        }
    }
}

/// A value iteration agent
///
/// Repeatedly applies the Bellman optimality update
///
/// V(s) = max<sub>a</sub> [ r(s,a) + γV(s') ]
///
/// in place to every non-terminal cell, using the environment's model rather than
/// live episodes, then acts greedily with respect to the converged values.
/// Goal cells are terminal and keep a value of zero.
pub struct ValueIterationAgent {
    values: ValueTable,
    policy: PolicyTable,
    gamma: f64,
    theta: f64,
    errors: Vec<f64>,
    trained: bool,
}

impl ValueIterationAgent {
    /// Initialize a new `ValueIterationAgent` for the given environment
    pub fn new(env: &GridWorld, config: ValueIterationAgentConfig) -> Result<Self, ConfigError> {
        ensure_interval!(config.gamma, 0.0, 1.0);
        ensure_interval!(config.theta, 0.0, f64::MAX);
        Ok(Self {
            values: ValueTable::filled(env.size(), 0.0),
            policy: PolicyTable::filled(env.size(), Action::Up),
            gamma: config.gamma,
            theta: config.theta,
            errors: Vec::new(),
            trained: false,
        })
    }

    /// One in-place sweep over the grid, returning the largest value change
    fn sweep(&mut self, env: &GridWorld) -> f64 {
        let mut delta: f64 = 0.0;
        for state in env.states() {
            if !env.is_updatable(state) {
                continue;
            }
            let best = action_values(env, &self.values, self.gamma, state)
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max);
            delta = delta.max((best - self.values[state]).abs());
            self.values[state] = best;
        }
        delta
    }

    /// Greedy policy with respect to the current values
    fn extract_policy(&mut self, env: &GridWorld) {
        for state in env.states() {
            if !env.is_updatable(state) {
                continue;
            }
            let q = action_values(env, &self.values, self.gamma, state);
            self.policy[state] = Action::from_index(argmax(&q));
        }
    }

    /// Get the agent's state value function
    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    /// Get the agent's policy
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }
}

impl Agent for ValueIterationAgent {
    fn name(&self) -> &'static str {
        "ValueIterationAgent"
    }

    /// Run up to `episodes` sweeps, stopping early on convergence
    ///
    /// Training is done once; later calls return the first result.
    fn train(&mut self, env: &mut GridWorld, episodes: u32) -> Result<Training, ConfigError> {
        check_grid(self.values.size(), env)?;
        if self.trained {
            log::debug!("Value iteration already trained, reusing policy");
            return Ok(Training {
                policy: Some(self.policy.clone()),
                errors: self.errors.clone(),
            });
        }

        log::info!("Value iteration: starting for up to {episodes} iterations");
        self.errors.clear();
        for i in 0..episodes {
            let delta = self.sweep(env);
            self.errors.push(delta);
            log::debug!("Value iteration {i}: delta = {delta:.6}");

            if delta < self.theta {
                log::info!("Value iteration converged after {} iterations", i + 1);
                break;
            }
        }

        self.extract_policy(env);
        self.trained = true;

        Ok(Training {
            policy: Some(self.policy.clone()),
            errors: self.errors.clone(),
        })
    }

    fn choose_action(&mut self, state: Pos) -> Action {
        self.policy[state]
    }

    fn save_tables(&self, dir: &Path) -> Result<(), TableError> {
        self.policy.save(dir.join(POLICY_FILE))?;
        self.values.save(dir.join(VALUE_FILE))
    }

    fn load_tables(&mut self, dir: &Path) -> Result<(), TableError> {
        let size = self.values.size();
        let policy = PolicyTable::load(dir.join(POLICY_FILE), size)?;
        let values = ValueTable::load(dir.join(VALUE_FILE), size)?;
        self.policy = policy;
        self.values = values;
        self.trained = true;
        Ok(())
    }
}
