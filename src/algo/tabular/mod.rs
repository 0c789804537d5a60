use rand::{rngs::StdRng, SeedableRng};

use crate::{
    env::{Action, DiscreteActionSpace, GridWorld, Model, Pos},
    error::ConfigError,
    table::ValueTable,
};

pub mod monte_carlo;
pub mod policy_iteration;
pub mod q_learning;
pub mod random;
pub mod value_iteration;

/// Seeded generator for reproducible runs, or one seeded from entropy
fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Tables are sized at construction; training on a grid of another size is rejected
fn check_grid(size: usize, env: &GridWorld) -> Result<(), ConfigError> {
    if env.size() == size {
        Ok(())
    } else {
        Err(ConfigError::GridMismatch {
            expected: size,
            found: env.size(),
        })
    }
}

/// One-step lookahead: r + γ·V(s'), without bootstrapping past a terminal transition
fn backup(env: &GridWorld, values: &ValueTable, gamma: f64, state: Pos, action: Action) -> f64 {
    let outcome = env.simulate_step(state, action);
    if outcome.terminated {
        outcome.reward
    } else {
        outcome.reward + gamma * values[outcome.next_state]
    }
}

/// [`backup`] for every action, in action index order
fn action_values(
    env: &GridWorld,
    values: &ValueTable,
    gamma: f64,
    state: Pos,
) -> [f64; Action::COUNT] {
    let mut q = [0.0; Action::COUNT];
    for (q, action) in q.iter_mut().zip(env.actions()) {
        *q = backup(env, values, gamma, state, action);
    }
    q
}
