//! Multivariate-normal sampling.
//!
//! Covariance matrices produced by the variability model are symmetric positive
//! semi-definite but frequently singular (e.g. more electrodes than generators,
//! or no variability at all), so a Cholesky factor does not always exist.
//! We factor through a symmetric eigendecomposition instead and clip the tiny
//! negative eigenvalues that rounding produces.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::ModelError;

/// Square-root factor `A` with `A Aᵀ = cov` (up to clipping of negative eigenvalues).
pub fn covariance_factor(cov: &DMatrix<f64>) -> Result<DMatrix<f64>, ModelError> {
    if !cov.is_square() {
        return Err(ModelError::DimensionMismatch(format!(
            "covariance must be square, got {}x{}",
            cov.nrows(),
            cov.ncols()
        )));
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidArgument(
            "covariance contains non-finite values".to_string(),
        ));
    }

    let eigen = SymmetricEigen::new(cov.clone());
    let mut factor = eigen.eigenvectors;
    for (j, lambda) in eigen.eigenvalues.iter().enumerate() {
        let scale = lambda.max(0.0).sqrt();
        factor.column_mut(j).scale_mut(scale);
    }
    Ok(factor)
}

/// Draw `n_samples` rows from `N(mean, cov)`.
///
/// Returns an `n_samples × mean.len()` matrix.
pub fn sample_multivariate_normal<R: Rng + ?Sized>(
    mean: &DVector<f64>,
    cov: &DMatrix<f64>,
    n_samples: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>, ModelError> {
    let dim = mean.len();
    if cov.nrows() != dim || cov.ncols() != dim {
        return Err(ModelError::DimensionMismatch(format!(
            "mean has length {dim} but covariance is {}x{}",
            cov.nrows(),
            cov.ncols()
        )));
    }

    let factor = covariance_factor(cov)?;
    let mut out = DMatrix::<f64>::zeros(n_samples, dim);
    let mut z = DVector::<f64>::zeros(dim);
    for row in 0..n_samples {
        for v in z.iter_mut() {
            *v = rng.sample(StandardNormal);
        }
        let draw = mean + &factor * &z;
        out.row_mut(row).copy_from(&draw.transpose());
    }
    Ok(out)
}
