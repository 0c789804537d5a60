use std::{io, path::PathBuf};

use crate::env::Pos;

/// Rejected configuration, reported before any training starts
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("grid size must be at least 1")]
    EmptyGrid,
    #[error("grid size {size} exceeds the maximum of {max}")]
    GridTooLarge { size: usize, max: usize },
    #[error("agent was built for a {expected}x{expected} grid, not {found}x{found}")]
    GridMismatch { expected: usize, found: usize },
    #[error("`max_steps` must be at least 1")]
    NoStepBudget,
    #[error("at least one goal position is required")]
    NoGoals,
    #[error("{what} position {pos:?} is out of bounds for a {size}x{size} grid")]
    OutOfBounds {
        what: &'static str,
        pos: Pos,
        size: usize,
    },
    #[error("cell {0:?} is both a goal and an obstacle")]
    GoalOnObstacle(Pos),
    #[error("start position {0:?} is an obstacle")]
    StartOnObstacle(Pos),
    #[error("invalid value for `{name}`: {value} is not in the interval [{min}, {max}]")]
    OutOfInterval {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid decay parameters: {0}")]
    Decay(&'static str),
    #[error("cannot parse position {0:?}, expected `x-y`")]
    BadPosition(String),
    #[error("unknown agent {0:?}")]
    UnknownAgent(String),
}

/// Failure while persisting or restoring a table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed table file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("shape mismatch in {}: expected {expected:?}, found {found:?}", .path.display())]
    ShapeMismatch {
        path: PathBuf,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error(
        "corrupt table {}: shape {shape:?} needs {expected} values, found {found}",
        .path.display()
    )]
    Corrupt {
        path: PathBuf,
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },
    #[error("invalid action index {0} in policy table")]
    InvalidAction(u8),
}

/// Rejected training session request
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("training already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
