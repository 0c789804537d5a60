//! Exploration schedules
//!
//! A schedule maps a training episode number to an exploration rate ε. Rates only
//! shrink here: each schedule starts at some ε and settles on a floor as episodes go by.

use crate::error::ConfigError;

/// An exploration rate that may shrink as training goes on
pub trait Decay {
    /// Exploration rate for episode `t`, counted from 0
    fn evaluate(&self, t: f64) -> f64;
}

/// Where a shrinking schedule starts and where it settles
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bounds {
    rate: f64,
    start: f64,
    floor: f64,
}

impl Bounds {
    fn new(rate: f64, start: f64, floor: f64) -> Result<Self, ConfigError> {
        if rate.is_nan() || rate < 0.0 {
            return Err(ConfigError::Decay("rate must be non-negative"));
        }
        if !(0.0..=1.0).contains(&floor) || !(0.0..=1.0).contains(&start) {
            return Err(ConfigError::Decay("start and floor must lie in [0, 1]"));
        }
        if floor > start {
            return Err(ConfigError::Decay("floor must not exceed the starting rate"));
        }
        Ok(Self { rate, start, floor })
    }
}

/// The same rate every episode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constant {
    epsilon: f64,
}

impl Constant {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl Decay for Constant {
    fn evaluate(&self, _t: f64) -> f64 {
        self.epsilon
    }
}

/// ε(t) = floor + (start - floor) * e<sup>-rate·t</sup>
///
/// Approaches the floor without reaching it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exponential(Bounds);

impl Exponential {
    pub fn new(rate: f64, start: f64, floor: f64) -> Result<Self, ConfigError> {
        Bounds::new(rate, start, floor).map(Self)
    }
}

impl Decay for Exponential {
    fn evaluate(&self, t: f64) -> f64 {
        let Bounds { rate, start, floor } = self.0;
        floor + (start - floor) * (-rate * t).exp()
    }
}

/// ε(t) = max(start - rate·t, floor)
///
/// Reaches the floor after `(start - floor) / rate` episodes and stays there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Linear(Bounds);

impl Linear {
    pub fn new(rate: f64, start: f64, floor: f64) -> Result<Self, ConfigError> {
        Bounds::new(rate, start, floor).map(Self)
    }
}

impl Decay for Linear {
    fn evaluate(&self, t: f64) -> f64 {
        let Bounds { rate, start, floor } = self.0;
        (start - rate * t).max(floor)
    }
}
