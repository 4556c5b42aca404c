//! Pose graph configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Configuration for the pose graph backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoseGraphConfig {
    /// Run a loop-closure optimization pass once more than this many scans
    /// have been constraint-computed since the last pass (0 = never).
    #[serde(default = "default_optimize_every_n_scans")]
    pub optimize_every_n_scans: usize,

    /// Long-run fraction of cross-trajectory constraint candidates that get
    /// a global (prior-free) search instead of being skipped.
    #[serde(default = "default_global_sampling_ratio")]
    pub global_sampling_ratio: f64,

    /// Floor for covariance eigenvalues when computing constraint weights.
    /// Eigenvalues below this are clamped, keeping the solver well
    /// conditioned on degenerate covariances.
    #[serde(default = "default_lower_covariance_eigenvalue_bound")]
    pub lower_covariance_eigenvalue_bound: f64,

    /// Solver iteration cap for ordinary background passes.
    #[serde(default = "default_max_num_iterations")]
    pub max_num_iterations: u32,

    /// Solver iteration cap for the one-shot final pass.
    #[serde(default = "default_max_num_final_iterations")]
    pub max_num_final_iterations: u32,
}

fn default_optimize_every_n_scans() -> usize {
    90
}

fn default_global_sampling_ratio() -> f64 {
    0.003
}

fn default_lower_covariance_eigenvalue_bound() -> f64 {
    1e-11
}

fn default_max_num_iterations() -> u32 {
    50
}

fn default_max_num_final_iterations() -> u32 {
    200
}

impl Default for PoseGraphConfig {
    fn default() -> Self {
        Self {
            optimize_every_n_scans: default_optimize_every_n_scans(),
            global_sampling_ratio: default_global_sampling_ratio(),
            lower_covariance_eigenvalue_bound: default_lower_covariance_eigenvalue_bound(),
            max_num_iterations: default_max_num_iterations(),
            max_num_final_iterations: default_max_num_final_iterations(),
        }
    }
}

impl PoseGraphConfig {
    /// Check value ranges. Hosts should call this once after loading.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.global_sampling_ratio) {
            return Err(ConfigError::SamplingRatioOutOfRange(
                self.global_sampling_ratio,
            ));
        }
        if self.lower_covariance_eigenvalue_bound <= 0.0 {
            return Err(ConfigError::EigenvalueBoundNotPositive(
                self.lower_covariance_eigenvalue_bound,
            ));
        }
        if self.max_num_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.max_num_final_iterations == 0 {
            return Err(ConfigError::ZeroFinalIterations);
        }
        Ok(())
    }
}
