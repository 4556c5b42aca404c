//! Foundation types: identifiers, matrix utilities, sampling.

pub mod ids;
pub mod math;
pub mod sampler;

pub use ids::{NodeId, SubmapId, TrajectoryHandle};
pub use math::spd_matrix_sqrt_inverse;
pub use sampler::FixedRatioSampler;
