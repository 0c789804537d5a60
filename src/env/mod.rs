mod grid;

pub use grid::{parse_position, parse_positions, Action, GridConfig, GridWorld, Pos};

/// The result of applying an action to a state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome<S> {
    /// The state after the action resolved
    pub next_state: S,
    /// The reward for the transition
    pub reward: f64,
    /// A terminal state was reached
    pub terminated: bool,
    /// The episode was cut off by a step limit before reaching a terminal state
    pub truncated: bool,
}

impl<S> Outcome<S> {
    /// Whether the episode is over, for either reason
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Represents a Markov decision process, defining the dynamics of an environment
/// in which an agent can operate.
///
/// This base trait represents the common case of a discrete-time MDP with one agent
/// and a finite state space and action space.
pub trait Environment {
    /// A representation of the state of the environment to be passed to an agent
    type State: Copy;

    /// A representation of an action that an agent can take to affect the environment
    type Action: Copy;

    /// Update the environment in response to an action taken by an agent
    fn step(&mut self, action: Self::Action) -> Outcome<Self::State>;

    /// Reset the environment to an initial state
    ///
    /// **Returns** the state
    fn reset(&mut self) -> Self::State;

    /// Sample a uniformly random action
    fn random_action<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Self::Action;
}

/// An environment with a finite set of actions
pub trait DiscreteActionSpace: Environment {
    /// Get the available actions
    ///
    /// The returned vector should never be empty
    fn actions(&self) -> Vec<Self::Action>;
}

/// An environment with a finite, enumerable set of states
pub trait DiscreteStateSpace: Environment {
    fn states(&self) -> Vec<Self::State>;
}

/// An environment whose dynamics can be queried without being mutated,
/// as required by dynamic programming methods
pub trait Model: Environment {
    /// Compute the outcome of taking `action` in `state` without touching the live episode
    fn simulate_step(&self, state: Self::State, action: Self::Action) -> Outcome<Self::State>;
}
