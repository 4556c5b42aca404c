//! Error types for SetuGraph.
//!
//! Configuration validation is the only recoverable failure in this crate.
//! Contract violations (unregistered ids, re-entrant optimization triggers,
//! dropping the graph while work is queued) panic instead: the store is not
//! designed to limp along after caller misuse.

use thiserror::Error;

/// Configuration validation error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("global_sampling_ratio must be within [0, 1], got {0}")]
    SamplingRatioOutOfRange(f64),

    #[error("lower_covariance_eigenvalue_bound must be positive, got {0}")]
    EigenvalueBoundNotPositive(f64),

    #[error("max_num_iterations must be at least 1")]
    ZeroIterations,

    #[error("max_num_final_iterations must be at least 1")]
    ZeroFinalIterations,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
