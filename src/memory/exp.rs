use std::collections::HashSet;

use crate::env::{Action, Pos};

/// A single step of an episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exp {
    /// The state of the environment before taking the action
    pub state: Pos,
    /// The action taken in the given state
    pub action: Action,
    /// The reward received after taking the action
    pub reward: f64,
}

/// An ordered rollout from reset to a terminal or step-capped state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Episode {
    steps: Vec<Exp>,
}

impl Episode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, exp: Exp) {
        self.steps.push(exp);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Exp] {
        &self.steps
    }

    /// Undiscounted sum of rewards
    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|e| e.reward).sum()
    }

    /// Flags, per step, whether it is the first occurrence of its state-action pair
    pub fn first_visits(&self) -> Vec<bool> {
        let mut seen = HashSet::with_capacity(self.steps.len());
        self.steps
            .iter()
            .map(|e| seen.insert((e.state, e.action)))
            .collect()
    }
}

impl FromIterator<Exp> for Episode {
    fn from_iter<I: IntoIterator<Item = Exp>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
