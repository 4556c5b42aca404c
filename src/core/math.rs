//! Matrix utilities for constraint weighting.

use nalgebra::Matrix6;

/// Inverse square root of a symmetric positive-definite covariance matrix.
///
/// Eigenvalues below `lower_eigenvalue_bound` are clamped to it before
/// inversion, so near-degenerate covariances produce a large-but-finite
/// weight instead of blowing up the solver.
pub fn spd_matrix_sqrt_inverse(
    covariance: &Matrix6<f64>,
    lower_eigenvalue_bound: f64,
) -> Matrix6<f64> {
    let eigen = match covariance.try_symmetric_eigen(f64::EPSILON, 0) {
        Some(eigen) => eigen,
        None => {
            log::warn!("covariance eigendecomposition failed, using identity weight");
            return Matrix6::identity();
        }
    };
    let inverse_sqrt_eigenvalues = eigen
        .eigenvalues
        .map(|lambda| 1.0 / lambda.max(lower_eigenvalue_bound).sqrt());
    eigen.eigenvectors
        * Matrix6::from_diagonal(&inverse_sqrt_eigenvalues)
        * eigen.eigenvectors.transpose()
}
