use std::path::Path;

use serde::Deserialize;
use strum::{Display, EnumIter, EnumString};

use crate::{
    decay::{self, Decay},
    env::{Action, GridWorld, Pos},
    error::{ConfigError, TableError},
    exploration::EpsilonGreedy,
    table::PolicyTable,
};

/// Tabular planning and learning methods
pub mod tabular;

pub use tabular::{
    monte_carlo::{MonteCarloAgent, MonteCarloAgentConfig},
    policy_iteration::{PolicyIterationAgent, PolicyIterationAgentConfig},
    q_learning::{QLearningAgent, QLearningAgentConfig},
    random::RandomAgent,
    value_iteration::{ValueIterationAgent, ValueIterationAgentConfig},
};

/// Result of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct Training {
    /// The learned policy, if the agent has one
    pub policy: Option<PolicyTable>,
    /// One convergence diagnostic per iteration or episode
    pub errors: Vec<f64>,
}

/// The interface shared by every agent in this crate
///
/// Agents own their tables. The environment is borrowed for the duration of a
/// call: planners only query its model, learners roll out live episodes in it.
pub trait Agent {
    /// Human-readable agent name
    fn name(&self) -> &'static str;

    /// Run `episodes` training iterations
    ///
    /// Fails with [`ConfigError::GridMismatch`] if `env` is not the size the agent was built for.
    fn train(&mut self, env: &mut GridWorld, episodes: u32) -> Result<Training, ConfigError>;

    /// Pick an action for `state` using what has been learned so far
    fn choose_action(&mut self, state: Pos) -> Action;

    /// Write the agent's tables into `dir`, one file per table
    fn save_tables(&self, dir: &Path) -> Result<(), TableError>;

    /// Restore tables written by [`Agent::save_tables`]
    fn load_tables(&mut self, dir: &Path) -> Result<(), TableError>;
}

/// Every available agent
#[derive(EnumIter, EnumString, Display, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[strum(ascii_case_insensitive)]
pub enum AgentKind {
    #[strum(to_string = "random", serialize = "RandomAgent")]
    Random,
    #[strum(to_string = "monte-carlo", serialize = "MonteCarloAgent")]
    MonteCarlo,
    #[strum(to_string = "q-learning", serialize = "QLearningAgent")]
    QLearning,
    #[strum(to_string = "policy-iteration", serialize = "PolicyIterationAgent")]
    PolicyIteration,
    #[strum(to_string = "value-iteration", serialize = "ValueIterationAgent")]
    ValueIteration,
}

/// Hyperparameters shared by the agent factory
///
/// Each agent reads only the fields it uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Discount factor
    pub gamma: f64,
    /// Learning rate (Q-learning)
    pub alpha: f64,
    /// Exploration rate (Q-learning)
    pub epsilon: f64,
    /// How the exploration rate changes over episodes (Q-learning)
    pub epsilon_schedule: EpsilonSchedule,
    /// Convergence threshold (planning)
    pub theta: f64,
    /// Seed for the agent's random number generator, entropy if `None`
    pub seed: Option<u64>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            alpha: 0.1,
            epsilon: 0.1,
            epsilon_schedule: EpsilonSchedule::Constant,
            theta: 1e-6,
            seed: None,
        }
    }
}

/// Decay of ε from its initial value toward a floor, per training episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpsilonSchedule {
    #[default]
    Constant,
    Exponential { rate: f64, min: f64 },
    Linear { rate: f64, min: f64 },
}

fn q_learning_agent<D: Decay + Send + 'static>(
    env: &GridWorld,
    decay: D,
    alpha: f64,
    gamma: f64,
    seed: Option<u64>,
) -> Result<Box<dyn Agent + Send>, ConfigError> {
    let config = QLearningAgentConfig {
        exploration: EpsilonGreedy::new(decay),
        alpha,
        gamma,
        max_episode_steps: None,
        seed,
    };
    Ok(Box::new(QLearningAgent::new(env, config)?))
}

impl AgentKind {
    /// Construct an agent of this kind for `env`
    pub fn build(
        self,
        env: &GridWorld,
        params: &Hyperparameters,
    ) -> Result<Box<dyn Agent + Send>, ConfigError> {
        let Hyperparameters {
            gamma,
            alpha,
            epsilon,
            epsilon_schedule,
            theta,
            seed,
        } = *params;

        let agent: Box<dyn Agent + Send> = match self {
            AgentKind::Random => Box::new(RandomAgent::new(seed)),
            AgentKind::MonteCarlo => Box::new(MonteCarloAgent::new(
                env,
                MonteCarloAgentConfig {
                    gamma,
                    seed,
                    ..Default::default()
                },
            )?),
            AgentKind::QLearning => {
                crate::ensure_interval!(epsilon, 0.0, 1.0);
                match epsilon_schedule {
                    EpsilonSchedule::Constant => {
                        q_learning_agent(env, decay::Constant::new(epsilon), alpha, gamma, seed)?
                    }
                    EpsilonSchedule::Exponential { rate, min } => q_learning_agent(
                        env,
                        decay::Exponential::new(rate, epsilon, min)?,
                        alpha,
                        gamma,
                        seed,
                    )?,
                    EpsilonSchedule::Linear { rate, min } => q_learning_agent(
                        env,
                        decay::Linear::new(rate, epsilon, min)?,
                        alpha,
                        gamma,
                        seed,
                    )?,
                }
            }
            AgentKind::PolicyIteration => Box::new(PolicyIterationAgent::new(
                env,
                PolicyIterationAgentConfig {
                    gamma,
                    theta,
                    seed,
                    ..Default::default()
                },
            )?),
            AgentKind::ValueIteration => Box::new(ValueIterationAgent::new(
                env,
                ValueIterationAgentConfig { gamma, theta },
            )?),
        };
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use crate::env::GridConfig;

    use super::*;

    #[test]
    fn agent_kind_names() {
        for kind in AgentKind::iter() {
            assert_eq!(kind.to_string().parse::<AgentKind>().unwrap(), kind);
        }
        assert_eq!(
            "QLearningAgent".parse::<AgentKind>().unwrap(),
            AgentKind::QLearning
        );
        assert_eq!(
            "Value-Iteration".parse::<AgentKind>().unwrap(),
            AgentKind::ValueIteration
        );
        assert!("sarsa".parse::<AgentKind>().is_err());
    }

    #[test]
    fn factory_builds_every_agent() {
        let env = GridWorld::new(GridConfig::default()).unwrap();
        let params = Hyperparameters {
            seed: Some(3),
            ..Default::default()
        };
        for kind in AgentKind::iter() {
            let agent = kind.build(&env, &params).unwrap();
            assert!(!agent.name().is_empty());
        }
    }

    #[test]
    fn factory_rejects_bad_hyperparameters() {
        let env = GridWorld::new(GridConfig::default()).unwrap();
        let params = Hyperparameters {
            epsilon: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            AgentKind::QLearning.build(&env, &params),
            Err(ConfigError::OutOfInterval { name: "epsilon", .. })
        ));

        let params = Hyperparameters {
            gamma: -0.5,
            ..Default::default()
        };
        for kind in [AgentKind::MonteCarlo, AgentKind::ValueIteration] {
            assert!(kind.build(&env, &params).is_err());
        }

        let params = Hyperparameters {
            epsilon: 0.05,
            epsilon_schedule: EpsilonSchedule::Linear {
                rate: 0.001,
                min: 0.1,
            },
            ..Default::default()
        };
        assert!(matches!(
            AgentKind::QLearning.build(&env, &params),
            Err(ConfigError::Decay(_))
        ));
    }

    #[test]
    fn hyperparameters_from_json() {
        let params: Hyperparameters = serde_json::from_str(
            r#"{
                "gamma": 0.95,
                "epsilon": 0.5,
                "epsilon_schedule": {"kind": "exponential", "rate": 0.01, "min": 0.05}
            }"#,
        )
        .unwrap();
        assert_eq!(params.gamma, 0.95);
        assert_eq!(params.alpha, 0.1, "Missing fields keep their defaults");
        assert_eq!(
            params.epsilon_schedule,
            EpsilonSchedule::Exponential {
                rate: 0.01,
                min: 0.05
            }
        );

        let env = GridWorld::new(GridConfig::default()).unwrap();
        assert!(AgentKind::QLearning.build(&env, &params).is_ok());
    }
}
