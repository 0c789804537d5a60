use rand::Rng;

use crate::decay::{self, Decay};

use super::Choice;

/// Epsilon greedy exploration policy with time-decaying epsilon threshold
#[derive(Debug, Clone)]
pub struct EpsilonGreedy<D: Decay> {
    epsilon: D,
}

impl<D: Decay> EpsilonGreedy<D> {
    /// Initialize epsilon greedy policy with a decay strategy
    pub fn new(decay: D) -> Self {
        Self { epsilon: decay }
    }

    /// Epsilon threshold for the given episode
    pub fn epsilon(&self, episode: u32) -> f64 {
        self.epsilon.evaluate(episode as f64)
    }

    /// Invoke epsilon greedy policy for current episode
    ///
    /// Explores with probability epsilon, so an epsilon of `0.0` always exploits
    pub fn choose<R: Rng + ?Sized>(&self, episode: u32, rng: &mut R) -> Choice {
        if rng.gen::<f64>() < self.epsilon(episode) {
            Choice::Explore
        } else {
            Choice::Exploit
        }
    }
}

impl Default for EpsilonGreedy<decay::Constant> {
    fn default() -> Self {
        Self::new(decay::Constant::new(0.1))
    }
}
