use std::path::Path;

use rand::rngs::StdRng;

use crate::{
    algo::{Agent, Training},
    ensure_interval,
    env::{Action, DiscreteStateSpace, GridWorld, Pos},
    error::{ConfigError, TableError},
    table::{PolicyTable, ValueTable},
    util::argmax,
};

use super::{action_values, backup, check_grid, make_rng};

const POLICY_FILE: &str = "policy_pi.json";
const VALUE_FILE: &str = "v_pi.json";

/// Configuration for the [`PolicyIterationAgent`]
#[derive(Debug, Clone)]
pub struct PolicyIterationAgentConfig {
    /// Discount factor, in `[0, 1]`
    pub gamma: f64,
    /// Policy evaluation stops once no value changes by more than this
    pub theta: f64,
    /// Hard ceiling on evaluation sweeps per iteration
    ///
    /// Evaluation of a policy that never reaches a goal does not converge when
    /// `gamma` is `1.0`; this bounds it regardless.
    pub max_evaluation_sweeps: u32,
    /// Seed for the initial random policy
    pub seed: Option<u64>,
}

impl Default for PolicyIterationAgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            theta: 1e-6,
            max_evaluation_sweeps: 1000,
            seed: None,
        }
    }
}

/// A policy iteration agent
///
/// Alternates full policy evaluation, in-place sweeps of
/// V(s) = r(s,π(s)) + γV(s') until convergence, with greedy policy improvement,
/// until the policy stops changing. Like value iteration it plans against the
/// environment's model and never steps the live episode.
pub struct PolicyIterationAgent {
    values: ValueTable,
    policy: PolicyTable,
    gamma: f64,
    theta: f64,
    max_evaluation_sweeps: u32,
}

impl PolicyIterationAgent {
    /// Initialize a new `PolicyIterationAgent` with an independently random action in every cell
    pub fn new(env: &GridWorld, config: PolicyIterationAgentConfig) -> Result<Self, ConfigError> {
        ensure_interval!(config.gamma, 0.0, 1.0);
        ensure_interval!(config.theta, 0.0, f64::MAX);

        let mut rng: StdRng = make_rng(config.seed);
        Ok(Self {
            values: ValueTable::filled(env.size(), 0.0),
            policy: PolicyTable::from_fn(env.size(), |_| Action::random(&mut rng)),
            gamma: config.gamma,
            theta: config.theta,
            max_evaluation_sweeps: config.max_evaluation_sweeps.max(1),
        })
    }

    /// Evaluate the current policy
    ///
    /// **Returns** the largest change of any cell's value over the whole evaluation
    fn evaluate(&mut self, env: &GridWorld) -> f64 {
        let before = self.values.clone();

        let mut converged = false;
        let mut sweeps = 0;
        while sweeps < self.max_evaluation_sweeps {
            sweeps += 1;
            let mut delta: f64 = 0.0;
            for state in env.states() {
                if !env.is_updatable(state) {
                    continue;
                }
                let value = backup(env, &self.values, self.gamma, state, self.policy[state]);
                delta = delta.max((value - self.values[state]).abs());
                self.values[state] = value;
            }

            if delta < self.theta {
                converged = true;
                break;
            }
        }

        if converged {
            log::trace!("Policy evaluation converged after {sweeps} sweeps");
        } else {
            log::warn!(
                "Policy evaluation stopped at the {sweeps} sweep ceiling without converging"
            );
        }

        before
            .as_slice()
            .iter()
            .zip(self.values.as_slice())
            .map(|(old, new)| (new - old).abs())
            .fold(0.0, f64::max)
    }

    /// Make the policy greedy with respect to the current values
    ///
    /// An action is only replaced by a strictly better one, so ties never flip back and forth.
    ///
    /// **Returns** whether the policy is stable
    fn improve(&mut self, env: &GridWorld) -> bool {
        let mut stable = true;
        for state in env.states() {
            if !env.is_updatable(state) {
                continue;
            }
            let q = action_values(env, &self.values, self.gamma, state);
            let best = argmax(&q);
            let current = self.policy[state];
            if q[best] > q[current.index()] {
                self.policy[state] = Action::from_index(best);
                stable = false;
            }
        }
        stable
    }

    /// Get the agent's policy
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Get the agent's state value function
    pub fn values(&self) -> &ValueTable {
        &self.values
    }
}

impl Agent for PolicyIterationAgent {
    fn name(&self) -> &'static str {
        "PolicyIterationAgent"
    }

    /// Run up to `episodes` evaluation/improvement rounds, stopping once the policy is stable
    fn train(&mut self, env: &mut GridWorld, episodes: u32) -> Result<Training, ConfigError> {
        check_grid(self.values.size(), env)?;
        log::info!("Policy iteration: starting for up to {episodes} iterations");
        let mut errors = Vec::new();

        for i in 0..episodes {
            let change = self.evaluate(env);
            errors.push(change);
            let stable = self.improve(env);
            log::debug!("Policy iteration {i}: value change = {change:.6}, stable = {stable}");

            if stable {
                log::info!("Policy iteration converged after {} iterations", i + 1);
                break;
            }
        }

        Ok(Training {
            policy: Some(self.policy.clone()),
            errors,
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
        Ok(())
    }
}
