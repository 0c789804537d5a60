use std::path::Path;

use rand::rngs::StdRng;

use crate::{
    algo::{Agent, Training},
    ensure_interval,
    env::{Action, Environment, GridWorld, Pos},
    error::{ConfigError, TableError},
    memory::{Episode, Exp},
    table::{policy_change, ActionTable, PolicyTable, QTable},
};

use super::{check_grid, make_rng};

const Q_FILE: &str = "q_montecarlo.json";

/// Configuration for the [`MonteCarloAgent`]
#[derive(Debug, Clone)]
pub struct MonteCarloAgentConfig {
    /// Discount factor, in `[0, 1]`
    pub gamma: f64,
    /// Rollouts are cut off after this many steps
    pub max_episode_steps: usize,
    pub seed: Option<u64>,
}

impl Default for MonteCarloAgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            max_episode_steps: 100,
            seed: None,
        }
    }
}

/// A first-visit Monte Carlo control agent
///
/// Generates whole episodes with a uniformly random behavior policy and estimates
/// each state-action value as the average return observed after its first visit in
/// an episode:
///
/// Q(s,a) = Σ G<sub>first visit</sub> / N(s,a)
///
/// At inference time it acts greedily, picking at random in cells it knows nothing about.
pub struct MonteCarloAgent {
    q_table: QTable,
    returns_sum: QTable,
    returns_count: ActionTable<u32>,
    greedy: PolicyTable,
    gamma: f64,
    max_episode_steps: usize,
    rng: StdRng,
}

impl MonteCarloAgent {
    /// Initialize a new `MonteCarloAgent` for the given environment
    pub fn new(env: &GridWorld, config: MonteCarloAgentConfig) -> Result<Self, ConfigError> {
        ensure_interval!(config.gamma, 0.0, 1.0);
        let size = env.size();
        Ok(Self {
            q_table: QTable::filled(size, 0.0),
            returns_sum: QTable::filled(size, 0.0),
            returns_count: ActionTable::filled(size, 0),
            greedy: PolicyTable::filled(size, Action::Up),
            gamma: config.gamma,
            max_episode_steps: config.max_episode_steps.max(1),
            rng: make_rng(config.seed),
        })
    }

    /// Roll out one episode in the live environment with uniformly random actions
    pub fn generate_episode(&mut self, env: &mut GridWorld) -> Episode {
        let mut episode = Episode::new();
        let mut state = env.reset();

        loop {
            let action = env.random_action(&mut self.rng);
            let outcome = env.step(action);
            episode.push(Exp {
                state,
                action,
                reward: outcome.reward,
            });
            state = outcome.next_state;

            if outcome.done() || episode.len() >= self.max_episode_steps {
                break;
            }
        }

        episode
    }

    /// Fold an episode's returns into the estimates, first visits only
    pub fn learn(&mut self, episode: &Episode) {
        let first_visits = episode.first_visits();
        let mut ret = 0.0;

        for (exp, first) in episode.steps().iter().zip(first_visits).rev() {
            ret = self.gamma * ret + exp.reward;
            if !first {
                continue;
            }

            let key = (exp.state, exp.action);
            self.returns_sum[key] += ret;
            self.returns_count[key] += 1;
            self.q_table[key] = self.returns_sum[key] / self.returns_count[key] as f64;
        }
    }

    pub fn get_q_table(&self) -> &QTable {
        &self.q_table
    }

    /// Number of first visits recorded for a state-action pair
    pub fn visits(&self, state: Pos, action: Action) -> u32 {
        self.returns_count[(state, action)]
    }
}

impl Agent for MonteCarloAgent {
    fn name(&self) -> &'static str {
        "MonteCarloAgent"
    }

    /// Learn from `episodes` random rollouts
    ///
    /// The error for each episode is the fraction of cells whose greedy action changed.
    fn train(&mut self, env: &mut GridWorld, episodes: u32) -> Result<Training, ConfigError> {
        check_grid(self.q_table.size(), env)?;
        log::info!("Monte Carlo: starting for {episodes} episodes");
        let mut errors = Vec::with_capacity(episodes as usize);

        for i in 0..episodes {
            let episode = self.generate_episode(env);
            self.learn(&episode);

            let current = self.q_table.greedy_policy();
            let change = policy_change(&self.greedy, &current, |pos| env.is_updatable(pos));
            self.greedy = current;
            errors.push(change);
            log::trace!(
                "Monte Carlo episode {i}: {} steps, return {:.2}, policy change {change:.3}",
                episode.len(),
                episode.total_reward()
            );
        }

        Ok(Training {
            policy: Some(self.greedy.clone()),
            errors,
        })
    }

    fn choose_action(&mut self, state: Pos) -> Action {
        if self.q_table.row(state).iter().all(|&q| q == 0.0) {
            Action::random(&mut self.rng)
        } else {
            self.q_table.greedy(state)
        }
    }

    fn save_tables(&self, dir: &Path) -> Result<(), TableError> {
        self.q_table.save(dir.join(Q_FILE))
    }

    /// Restore the Q-table; each non-zero entry counts as one prior sample when learning resumes
    fn load_tables(&mut self, dir: &Path) -> Result<(), TableError> {
        let q_table = QTable::load(dir.join(Q_FILE), self.q_table.size())?;
        let size = q_table.size();

        self.returns_sum = q_table.clone();
        self.returns_count = ActionTable::filled(size, 0);
        let counts = self.returns_count.as_mut_slice();
        for (count, &q) in counts.iter_mut().zip(q_table.as_slice()) {
            *count = u32::from(q != 0.0);
        }

        self.greedy = q_table.greedy_policy();
        self.q_table = q_table;
        Ok(())
    }
}
