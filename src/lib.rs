/// Implemented RL algorithms
pub mod algo;

/// Implementations of strategies for time-decaying hyperparameters
pub mod decay;

/// Environment
pub mod env;

/// Error types
pub mod error;

/// Exploration policies
pub mod exploration;

/// Episode memory
pub mod memory;

/// Background training jobs
pub mod session;

/// Tabular value, policy and Q storage
pub mod table;

/// Training and evaluation drivers
pub mod trainer;

mod util;
