use std::path::Path;

use rand::rngs::StdRng;

use crate::{
    algo::{Agent, Training},
    decay::{self, Decay},
    ensure_interval,
    env::{Action, Environment, GridWorld, Outcome, Pos},
    error::{ConfigError, TableError},
    exploration::{Choice, EpsilonGreedy},
    table::{policy_change, PolicyTable, QTable},
};

use super::{check_grid, make_rng};

const Q_FILE: &str = "q_qlearning.json";

/// Configuration for the [`QLearningAgent`]
pub struct QLearningAgentConfig<D: Decay> {
    pub exploration: EpsilonGreedy<D>,
    /// Learning rate, in `[0, 1]`
    pub alpha: f64,
    /// Discount factor, in `[0, 1]`
    pub gamma: f64,
    /// Step cap per training episode, the environment's own limit if `None`
    pub max_episode_steps: Option<u32>,
    pub seed: Option<u64>,
}

impl Default for QLearningAgentConfig<decay::Constant> {
    fn default() -> Self {
        Self {
            exploration: EpsilonGreedy::new(decay::Constant::new(0.1)),
            alpha: 0.1,
            gamma: 0.9,
            max_episode_steps: None,
            seed: None,
        }
    }
}

/// A Q-learning agent backed by a dense Q-table
///
/// Acts ε-greedily and applies the one-step temporal difference update after every transition:
///
/// Q(s,a) ← Q(s,a) + α [ r + γ max<sub>a'</sub> Q(s',a') - Q(s,a) ]
///
/// Transitions into a goal do not bootstrap.
pub struct QLearningAgent<D: Decay> {
    q_table: QTable,
    greedy: PolicyTable,
    exploration: EpsilonGreedy<D>,
    alpha: f64,
    gamma: f64,
    max_episode_steps: Option<u32>,
    episode: u32,
    rng: StdRng,
}

impl<D: Decay> QLearningAgent<D> {
    /// Initialize a new `QLearningAgent` for the given environment
    ///
    /// Fails if `alpha` or `gamma` is not in the interval `[0,1]`
    pub fn new(env: &GridWorld, config: QLearningAgentConfig<D>) -> Result<Self, ConfigError> {
        ensure_interval!(config.alpha, 0.0, 1.0);
        ensure_interval!(config.gamma, 0.0, 1.0);
        let size = env.size();
        Ok(Self {
            q_table: QTable::filled(size, 0.0),
            greedy: PolicyTable::filled(size, Action::Up),
            exploration: config.exploration,
            alpha: config.alpha,
            gamma: config.gamma,
            max_episode_steps: config.max_episode_steps,
            episode: 0,
            rng: make_rng(config.seed),
        })
    }

    /// Choose an action based on the current state and exploration policy
    fn act(&mut self, state: Pos) -> Action {
        match self.exploration.choose(self.episode, &mut self.rng) {
            Choice::Explore => Action::random(&mut self.rng),
            Choice::Exploit => self.q_table.greedy(state),
        }
    }

    /// Apply the TD update for one transition
    ///
    /// **Returns** the absolute TD error before the update
    fn learn(&mut self, state: Pos, action: Action, outcome: &Outcome<Pos>) -> f64 {
        let q_value = self.q_table[(state, action)];
        let target = if outcome.terminated {
            outcome.reward
        } else {
            outcome.reward + self.gamma * self.q_table.max(outcome.next_state)
        };
        let td_error = target - q_value;
        self.q_table[(state, action)] = q_value + self.alpha * td_error;
        td_error.abs()
    }

    /// Run one training episode in the live environment
    ///
    /// **Returns** the number of steps taken
    pub fn go(&mut self, env: &mut GridWorld) -> u32 {
        let cap = self.max_episode_steps.unwrap_or(env.max_steps()).max(1);
        let mut state = env.reset();
        let mut steps = 0;

        loop {
            let action = self.act(state);
            let outcome = env.step(action);
            let td = self.learn(state, action, &outcome);
            log::trace!("{state:?} {action:?} -> {:?}, |td| = {td:.4}", outcome.next_state);

            state = outcome.next_state;
            steps += 1;
            if outcome.done() || steps >= cap {
                break;
            }
        }

        self.episode += 1;
        steps
    }

    pub fn get_q_table(&self) -> &QTable {
        &self.q_table
    }
}

impl<D: Decay> Agent for QLearningAgent<D> {
    fn name(&self) -> &'static str {
        "QLearningAgent"
    }

    /// Learn from `episodes` ε-greedy rollouts
    ///
    /// The error for each episode is the fraction of cells whose greedy action changed.
    fn train(&mut self, env: &mut GridWorld, episodes: u32) -> Result<Training, ConfigError> {
        check_grid(self.q_table.size(), env)?;
        log::info!("Q-learning: starting for {episodes} episodes");
        let mut errors = Vec::with_capacity(episodes as usize);

        for i in 0..episodes {
            let steps = self.go(env);

            let current = self.q_table.greedy_policy();
            let change = policy_change(&self.greedy, &current, |pos| env.is_updatable(pos));
            self.greedy = current;
            errors.push(change);
            log::trace!("Q-learning episode {i}: {steps} steps, policy change {change:.3}");
        }

        Ok(Training {
            policy: Some(self.greedy.clone()),
            errors,
        })
    }

    fn choose_action(&mut self, state: Pos) -> Action {
        self.act(state)
    }

    fn save_tables(&self, dir: &Path) -> Result<(), TableError> {
        self.q_table.save(dir.join(Q_FILE))
    }

    fn load_tables(&mut self, dir: &Path) -> Result<(), TableError> {
        self.q_table = QTable::load(dir.join(Q_FILE), self.q_table.size())?;
        self.greedy = self.q_table.greedy_policy();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::env::{GridConfig, Model};

    use super::*;

    fn greedy_config(alpha: f64) -> QLearningAgentConfig<decay::Constant> {
        QLearningAgentConfig {
            exploration: EpsilonGreedy::new(decay::Constant::new(0.0)),
            alpha,
            seed: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn one_step_goal_is_learned_exactly() {
        let mut env = GridWorld::new(GridConfig {
            size: 2,
            start: (0, 0),
            goals: vec![(1, 0)],
            obstacles: vec![],
            max_steps: 20,
        })
        .unwrap();
        let mut agent = QLearningAgent::new(&env, greedy_config(1.0)).unwrap();

        agent.train(&mut env, 4).unwrap();

        assert_eq!(agent.get_q_table()[((0, 0), Action::Right)], 10.0);
        assert_eq!(agent.choose_action((0, 0)), Action::Right);
    }

    #[test]
    fn td_update_moves_toward_target() {
        let env = GridWorld::new(GridConfig::default()).unwrap();
        let mut agent = QLearningAgent::new(&env, greedy_config(0.5)).unwrap();
        agent.q_table[((0, 1), Action::Right)] = 2.0;

        let outcome = Outcome {
            next_state: (0, 1),
            reward: -0.1,
            terminated: false,
            truncated: false,
        };
        let td = agent.learn((0, 0), Action::Up, &outcome);

        let target: f64 = -0.1 + 0.9 * 2.0;
        assert_eq!(td, target.abs());
        assert_eq!(agent.get_q_table()[((0, 0), Action::Up)], 0.5 * target);
    }

    #[test]
    fn learns_default_grid() {
        let mut env = GridWorld::new(GridConfig::default()).unwrap();
        let config = QLearningAgentConfig {
            alpha: 0.5,
            seed: Some(21),
            ..Default::default()
        };
        let mut agent = QLearningAgent::new(&env, config).unwrap();
        let Training { policy, errors } = agent.train(&mut env, 1000).unwrap();

        assert_eq!(errors.len(), 1000);
        let policy = policy.unwrap();

        let mut state = env.start();
        let reached = (0..env.max_steps()).any(|_| {
            let outcome = env.simulate_step(state, policy[state]);
            state = outcome.next_state;
            outcome.terminated
        });
        assert!(reached, "Greedy policy leads from the start to a goal");
    }

    #[test]
    fn rejects_bad_learning_rate() {
        let env = GridWorld::new(GridConfig::default()).unwrap();
        let config = QLearningAgentConfig {
            alpha: -0.1,
            ..Default::default()
        };
        assert!(QLearningAgent::new(&env, config).is_err());
    }
}
