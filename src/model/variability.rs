//! Variance and covariance values of the variability model.
//!
//! Each field carries its shape in its variant, so there is never any
//! "is this a scalar or a list" inspection at run time. The active variant of a
//! field always agrees with the model's variability selector.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionKind, Range, VariabilityKind};
use crate::error::ModelError;
use crate::model::placement::{uniform, uniform_scaled};

/// Electrode or generator variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    None,
    Constant(f64),
    Individual(Vec<f64>),
}

impl Variance {
    /// All-zero value of the given kind for `n` entities.
    pub fn zeros(kind: VariabilityKind, n: usize) -> Self {
        match kind {
            VariabilityKind::None => Variance::None,
            VariabilityKind::Constant => Variance::Constant(0.0),
            VariabilityKind::Individual => Variance::Individual(vec![0.0; n]),
        }
    }

    /// Draw a random value of the given kind, uniform in `range`.
    pub fn random<R: Rng + ?Sized>(kind: VariabilityKind, n: usize, range: Range, rng: &mut R) -> Self {
        match kind {
            VariabilityKind::None => Variance::None,
            VariabilityKind::Constant => Variance::Constant(uniform(rng, range.0, range.1)),
            VariabilityKind::Individual => {
                Variance::Individual((0..n).map(|_| uniform(rng, range.0, range.1)).collect())
            }
        }
    }

    pub fn kind(&self) -> VariabilityKind {
        match self {
            Variance::None => VariabilityKind::None,
            Variance::Constant(_) => VariabilityKind::Constant,
            Variance::Individual(_) => VariabilityKind::Individual,
        }
    }

    /// Variance of entity `i`.
    pub fn value_at(&self, i: usize) -> f64 {
        match self {
            Variance::None => 0.0,
            Variance::Constant(v) => *v,
            Variance::Individual(values) => values.get(i).copied().unwrap_or(0.0),
        }
    }

    /// Per-entity variances as a vector of length `n`.
    pub fn diagonal(&self, n: usize) -> DVector<f64> {
        DVector::from_fn(n, |i, _| self.value_at(i))
    }

    /// Reject values whose variant or length disagrees with `kind` / `n`.
    pub fn check(&self, kind: VariabilityKind, n: usize, what: &str) -> Result<(), ModelError> {
        if self.kind() != kind {
            return Err(ModelError::VariabilityMismatch(format!(
                "{what} variability is '{kind}' but a '{}' value was given",
                self.kind()
            )));
        }
        if let Variance::Individual(values) = self {
            if values.len() != n {
                return Err(ModelError::DimensionMismatch(format!(
                    "{what} variance needs {n} values, got {}",
                    values.len()
                )));
            }
        }
        Ok(())
    }

    /// Resize a per-entity value to `n` entries (new entries are zero).
    pub fn resize(&mut self, n: usize) {
        if let Variance::Individual(values) = self {
            values.resize(n, 0.0);
        }
    }
}

/// Inter-generator covariance.
///
/// The matrix is kept symmetric; its diagonal is unused (the generator
/// covariance diagonal comes from the generator variance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Covariance {
    None,
    Individual(DMatrix<f64>),
}

impl Covariance {
    pub fn zeros(kind: ConnectionKind, n: usize) -> Self {
        match kind {
            ConnectionKind::None => Covariance::None,
            ConnectionKind::Individual => Covariance::Individual(DMatrix::zeros(n, n)),
        }
    }

    /// Draw off-diagonal entries uniformly in `[0, sqrt(var_i * var_j))`.
    ///
    /// This keeps each pairwise correlation at most 1 but does not make the whole
    /// generator covariance positive semi-definite for more than two generators.
    pub fn random<R: Rng + ?Sized>(
        kind: ConnectionKind,
        generator_variance: &Variance,
        n: usize,
        rng: &mut R,
    ) -> Self {
        match kind {
            ConnectionKind::None => Covariance::None,
            ConnectionKind::Individual => {
                let mut m = DMatrix::zeros(n, n);
                for row in 0..n {
                    for col in (row + 1)..n {
                        let limit =
                            (generator_variance.value_at(row) * generator_variance.value_at(col)).sqrt();
                        let c = uniform_scaled(rng, limit);
                        m[(row, col)] = c;
                        m[(col, row)] = c;
                    }
                }
                Covariance::Individual(m)
            }
        }
    }

    /// Build an individual covariance from a matrix whose upper triangle is
    /// authoritative. The lower triangle is overwritten with the upper one.
    pub fn from_upper(matrix: DMatrix<f64>) -> Result<Self, ModelError> {
        if !matrix.is_square() {
            return Err(ModelError::DimensionMismatch(format!(
                "generator covariance must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        let mut m = matrix;
        let n = m.nrows();
        for row in 0..n {
            for col in (row + 1)..n {
                m[(col, row)] = m[(row, col)];
            }
        }
        Ok(Covariance::Individual(m))
    }

    pub fn kind(&self) -> ConnectionKind {
        match self {
            Covariance::None => ConnectionKind::None,
            Covariance::Individual(_) => ConnectionKind::Individual,
        }
    }

    /// Covariance between generators `i` and `j` (`i != j`).
    pub fn value_at(&self, i: usize, j: usize) -> f64 {
        match self {
            Covariance::None => 0.0,
            Covariance::Individual(m) => {
                if i < m.nrows() && j < m.ncols() {
                    m[(i, j)]
                } else {
                    0.0
                }
            }
        }
    }

    /// Write one off-diagonal pair, keeping the matrix symmetric.
    pub fn set_pair(&mut self, i: usize, j: usize, value: f64) {
        if let Covariance::Individual(m) = self {
            m[(i, j)] = value;
            m[(j, i)] = value;
        }
    }

    pub fn check(&self, kind: ConnectionKind, n: usize) -> Result<(), ModelError> {
        if self.kind() != kind {
            return Err(ModelError::VariabilityMismatch(format!(
                "connection variability is '{kind}' but a '{}' value was given",
                self.kind()
            )));
        }
        if let Covariance::Individual(m) = self {
            if m.nrows() != n || m.ncols() != n {
                return Err(ModelError::DimensionMismatch(format!(
                    "generator covariance must be {n}x{n}, got {}x{}",
                    m.nrows(),
                    m.ncols()
                )));
            }
        }
        Ok(())
    }

    /// Resize to `n × n`, keeping the overlapping block.
    pub fn resize(&mut self, n: usize) {
        if let Covariance::Individual(m) = self {
            let old = std::mem::replace(m, DMatrix::zeros(n, n));
            let keep = old.nrows().min(n);
            m.view_mut((0, 0), (keep, keep))
                .copy_from(&old.view((0, 0), (keep, keep)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zeros_follow_kind() {
        assert_eq!(Variance::zeros(VariabilityKind::None, 3), Variance::None);
        assert_eq!(Variance::zeros(VariabilityKind::Constant, 3), Variance::Constant(0.0));
        assert_eq!(
            Variance::zeros(VariabilityKind::Individual, 3),
            Variance::Individual(vec![0.0; 3])
        );
        assert_eq!(Covariance::zeros(ConnectionKind::None, 3), Covariance::None);
    }

    #[test]
    fn random_variance_respects_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let v = Variance::random(VariabilityKind::Individual, 50, (2.0, 5.0), &mut rng);
        let Variance::Individual(values) = v else {
            panic!("expected individual variance");
        };
        assert!(values.iter().all(|x| (2.0..5.0).contains(x)));
    }

    #[test]
    fn random_covariance_is_bounded_and_symmetric() {
        let mut rng = StdRng::seed_from_u64(5);
        let var = Variance::Individual(vec![4.0, 9.0, 16.0]);
        let cov = Covariance::random(ConnectionKind::Individual, &var, 3, &mut rng);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(cov.value_at(i, j), cov.value_at(j, i));
                if i != j {
                    let limit = (var.value_at(i) * var.value_at(j)).sqrt();
                    assert!(cov.value_at(i, j) >= 0.0 && cov.value_at(i, j) < limit);
                } else {
                    assert_eq!(cov.value_at(i, i), 0.0);
                }
            }
        }
    }

    #[test]
    fn from_upper_mirrors_upper_triangle() {
        let m = DMatrix::from_row_slice(2, 2, &[0.0, 0.5, 9.0, 0.0]);
        let cov = Covariance::from_upper(m).unwrap();
        assert_eq!(cov.value_at(1, 0), 0.5);
    }

    #[test]
    fn check_rejects_wrong_variant_and_length() {
        assert!(Variance::Constant(1.0).check(VariabilityKind::Individual, 2, "generator").is_err());
        assert!(
            Variance::Individual(vec![1.0])
                .check(VariabilityKind::Individual, 2, "generator")
                .is_err()
        );
        assert!(Variance::None.check(VariabilityKind::None, 2, "generator").is_ok());
    }

    #[test]
    fn resize_keeps_overlap() {
        let mut cov = Covariance::Individual(DMatrix::from_element(3, 3, 1.0));
        cov.resize(2);
        assert_eq!(cov.value_at(0, 1), 1.0);
        cov.resize(4);
        assert_eq!(cov.value_at(3, 0), 0.0);
        assert_eq!(cov.value_at(1, 0), 1.0);
    }
}
